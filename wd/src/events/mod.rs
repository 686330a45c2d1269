//! Event system: bus, topic vocabulary and the WebSocket bridge
//!
//! ```text
//!  queue core ─┐                         ┌─> WebSocket bridge ─> clients
//!  processor ──┼─> EventBus (per-topic) ─┼─> test subscribers
//!  step engine─┤      middleware chain   └─> loggers
//!  analysis ───┘
//! ```

mod bridge;
mod bus;
mod types;

pub use bridge::{ClientSink, WebSocketBridge, mock::RecordingSink};
pub use bus::{EventBus, EventEmitter, Handler, Middleware, SubscriptionId, create_event_bus};
pub use types::{Event, topics};
