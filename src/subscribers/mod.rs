//! # Event subscribers for the seedvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! built-in [`LogWriter`] for observing runtime events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Dispatcher / Executor / Sources ── publish(Event) ──► Bus
//!                                                        │
//!                                           subscriber_listener (Runtime)
//!                                                        │
//!                                                  SubscriberSet
//!                                        ┌───────────────┼──────────────┐
//!                                        ▼               ▼              ▼
//!                                    LogWriter        Metrics        Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
