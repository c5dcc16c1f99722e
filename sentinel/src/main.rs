use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use sentinel::{
    api::{self, AppState},
    chain::{EthersChainClient, EthersGuardian, Guardian},
    verification::ExplorerSourceProvider,
    AnalysisClient, AnalysisOrchestrator, ChainPoller, Config, ContractRegistry, ContractResolver,
    GuardianExecutor, GuardianPipeline, HttpAnalysisClient, SystemStatus,
};
use sentinel_network::EventBroadcaster;

/// Số lệnh đăng ký tối đa chờ giữa hai tick
const COMMAND_BUFFER: usize = 64;

fn init_logging(log_dir: &str) -> Result<WorkerGuard> {
    let dir = Path::new(log_dir);
    if !dir.exists() {
        std::fs::create_dir_all(dir).with_context(|| format!("không thể tạo thư mục log {}", log_dir))?;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "sentinel.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(
            fmt::Layer::new()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE),
        )
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("không thể tải cấu hình")?;
    let _guard = init_logging(&config.log_dir)?;

    info!(
        chain_id = config.chain_id,
        guardian = ?config.guardian_address,
        contracts = config.monitored_contracts.len(),
        "Khởi động Sentinel..."
    );

    // Blockchain
    let chain = EthersChainClient::from_url(&config.rpc_url)?;
    let provider = chain.provider();
    let guardian: Arc<dyn Guardian> = match config.private_key.as_deref() {
        Some(key) => Arc::new(EthersGuardian::with_signer(
            Arc::clone(&provider),
            config.guardian_address,
            key,
            config.chain_id,
        )?),
        None => {
            warn!("PRIVATE_KEY chưa cấu hình, mọi lệnh pause sẽ thất bại");
            Arc::new(EthersGuardian::read_only(Arc::clone(&provider), config.guardian_address))
        }
    };

    // Collaborators
    let sources = Arc::new(ExplorerSourceProvider::new(
        config.verification_api_url.clone(),
        config.verification_api_key.clone(),
    ));
    let resolver = ContractResolver::new(config.chain_id, Arc::clone(&guardian), sources);
    let analysis_client = config
        .analysis_url
        .as_ref()
        .map(|url| Arc::new(HttpAnalysisClient::new(url.clone())) as Arc<dyn AnalysisClient>);
    if analysis_client.is_none() {
        warn!("ANALYSIS_URL chưa cấu hình, chỉ dùng phân tích heuristic cục bộ");
    }

    // Pipeline
    let broadcaster = EventBroadcaster::default();
    let status = Arc::new(SystemStatus::new());
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let mut pipeline = GuardianPipeline::new(
        &config,
        ContractRegistry::new(resolver.clone()),
        AnalysisOrchestrator::new(analysis_client, config.analysis_timeout),
        GuardianExecutor::new(guardian),
        broadcaster.clone(),
        Arc::clone(&status),
        command_rx,
    );
    for address in &config.monitored_contracts {
        pipeline.register(*address).await;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // API server
    let addr: SocketAddr = format!("{}:{}", config.api_host, config.api_port)
        .parse()
        .with_context(|| format!("địa chỉ API không hợp lệ: {}:{}", config.api_host, config.api_port))?;
    let app_state = AppState {
        broadcaster,
        status,
        commands: command_tx,
        resolver,
    };
    let mut api_shutdown = shutdown_rx.clone();
    let api_handle = tokio::spawn(async move {
        let signal = async move {
            let _ = api_shutdown.changed().await;
        };
        if let Err(e) = api::serve(addr, app_state, signal).await {
            error!(error = %e, "API server lỗi");
        }
    });

    // Poller
    let mut poller = ChainPoller::new(Arc::new(chain), config.poll_interval, config.max_blocks_per_tick);
    let poller_handle = tokio::spawn(async move {
        poller.run(&mut pipeline, shutdown_rx).await;
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Đã nhận tín hiệu tắt, đang dừng các dịch vụ..."),
        Err(e) => error!(error = %e, "Không thể bắt tín hiệu CTRL+C"),
    }
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(poller_handle, api_handle);
    info!("Sentinel đã tắt");
    Ok(())
}
