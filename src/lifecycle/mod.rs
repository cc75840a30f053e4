//! Process lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! SIGINT/SIGTERM
//!     → shutdown.rs (broadcast to all long-running tasks)
//!     → HTTP server drains in-flight requests
//!     → watch sessions close (in-flight proxy requests unaffected)
//! ```

pub mod shutdown;

pub use shutdown::{wait_for_signal, Shutdown};
