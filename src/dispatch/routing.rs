//! # Routing table: flavor → handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dispatch::flavor::Flavor;
use crate::dispatch::handler::{Handler, HandlerRef};
use crate::update::Update;

/// Explicit mapping from [`Flavor`] to [`Handler`].
///
/// Lookups of unrouted flavors are configuration errors at dispatch time, or at build
/// time when the runtime demands exhaustive routes.
pub struct RoutingTable<U: Update> {
    routes: HashMap<Flavor, HandlerRef<U>>,
}

impl<U: Update> Default for RoutingTable<U> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

impl<U: Update> RoutingTable<U> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `flavor` to `handler`, replacing any previous route.
    pub fn route(mut self, flavor: Flavor, handler: impl Handler<U>) -> Self {
        self.routes.insert(flavor, Arc::new(handler));
        self
    }

    /// Routes `flavor` to an already shared handler.
    pub fn route_ref(mut self, flavor: Flavor, handler: HandlerRef<U>) -> Self {
        self.routes.insert(flavor, handler);
        self
    }

    /// Handler for `flavor`, if routed.
    pub fn get(&self, flavor: Flavor) -> Option<&HandlerRef<U>> {
        self.routes.get(&flavor)
    }

    /// Flavors without a route, in [`Flavor::ALL`] order.
    pub fn missing(&self) -> Vec<Flavor> {
        Flavor::ALL
            .into_iter()
            .filter(|f| !self.routes.contains_key(f))
            .collect()
    }

    /// Number of routed flavors.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True if nothing is routed.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<U: Update> fmt::Debug for RoutingTable<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flavors: Vec<_> = self.routes.keys().collect();
        flavors.sort();
        f.debug_struct("RoutingTable").field("routes", &flavors).finish()
    }
}
