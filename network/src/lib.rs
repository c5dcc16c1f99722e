//! Fan-out event tới observer và endpoint WebSocket.

// Module exports
pub mod broadcaster;
pub mod events;
pub mod websocket;

// Re-exports
pub use broadcaster::{EventBroadcaster, DEFAULT_EVENT_CAPACITY};
pub use events::{EventPayload, EventType, GuardianEvent};
pub use websocket::serve_observer;
