//! Retry delay policies.
//!
//! Controls **how long** the polling source waits before fetching again after a
//! transient transport failure.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! Config { retry: BackoffPolicy, .. }
//!      └─► source::Poller uses retry.delay(failures) after each failed fetch
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
