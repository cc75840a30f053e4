//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Watch stream loss:
//!     → backoff.rs (jittered exponential delay before reconnect)
//!
//! Upstream attempt failure:
//!     → retries.rs (check method idempotency + retry budget)
//!     → backoff.rs (delay between attempts)
//! ```
//!
//! # Design Decisions
//! - Backoff ceiling is deterministic; jitter is applied on top, so the
//!   schedule itself stays testable
//! - Retries only for idempotent requests, and only as a decorator;
//!   the forwarding core never retries on its own

pub mod backoff;
pub mod retries;

pub use backoff::{backoff_ceiling, full_jitter};
pub use retries::{is_idempotent, is_retryable, RetryBudget};
