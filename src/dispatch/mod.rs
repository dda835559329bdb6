//! # Dispatch: turning one update into handler calls or delegate resolutions.
//!
//! - [`flavor`] the [`Flavor`] label and the [`Classify`] seam;
//! - [`handler`] direct-call [`Handler`]s and the [`HandlerFn`] adapter;
//! - [`routing`] the flavor-keyed [`RoutingTable`];
//! - [`dispatcher`] the per-runtime [`Dispatcher`] and its [`Mode`].

pub mod dispatcher;
pub mod flavor;
pub mod handler;
pub mod routing;

pub use dispatcher::{Dispatcher, Mode};
pub use flavor::{Classify, Flavor};
pub use handler::{Handler, HandlerFn, HandlerRef};
pub use routing::RoutingTable;
