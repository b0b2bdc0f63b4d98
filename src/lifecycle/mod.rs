//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → Build state → Spawn
//!     background tasks (cache sweeper, scheduler, workers) → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received (signals.rs) → broadcast → server drains,
//!     scheduler and workers exit their loops
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
