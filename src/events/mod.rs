//! Inter-module event bus.
//!
//! # Data Flow
//! ```text
//! Service (users, jobs)
//!     → publish(event, priority, correlation_id)
//!         → stamp metadata
//!         → middleware chain
//!         → bounded event log (replay)
//!         → handlers run concurrently under a global timeout
//!             → per-handler linear retry
//!             → dead letter on exhaustion
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    handler_fn, DeadLetter, EventBus, EventBusHealth, EventBusStats, EventHandler,
    EventMiddleware, HandlerId, PublishOutcome,
};
pub use types::{DomainEvent, EventPriority, EventType};
