//! Runtime core: assembly and lifecycle.
//!
//! The public API from this module is [`Runtime`], built through [`RuntimeBuilder`] from
//! a [`Config`].
//!
//! Internal modules:
//! - [`builder`]: validates the dispatch mode and wires source, dispatcher and bus;
//! - [`runtime`]: drives the source, handles shutdown signals, waits for delegates;
//! - [`config`]: polling, ordering and bus settings;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod config;
mod runtime;
mod shutdown;

pub use builder::RuntimeBuilder;
pub use config::{Config, OrderingMode, SourceKind};
pub use runtime::Runtime;
pub use shutdown::Signal;
