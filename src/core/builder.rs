use std::sync::Arc;

use tokio::sync::{broadcast::error::RecvError, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::runtime::{Runtime, Source};
use crate::core::config::{Config, SourceKind};
use crate::delegation::{DelegationPattern, Executor, SeederChain, TokioExecutor};
use crate::dispatch::{Classify, Dispatcher, Handler, HandlerRef, Mode, RoutingTable};
use crate::error::ConfigurationError;
use crate::events::Bus;
use crate::source::{OrderingBuffer, Poller, SourceState, Transport, feed_channel};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::update::Update;

/// Builder for a [`Runtime`].
///
/// Exactly one dispatch mode must be configured: a single handler, a routing table, or
/// one or more delegation patterns.
pub struct RuntimeBuilder<U: Update> {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    handler: Option<HandlerRef<U>>,
    routing: Option<(Arc<dyn Classify<U>>, RoutingTable<U>)>,
    exhaustive: bool,
    patterns: Vec<DelegationPattern<U>>,
    transport: Option<Arc<dyn Transport<U>>>,
    executor: Option<Arc<dyn Executor>>,
}

impl<U: Update> RuntimeBuilder<U> {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            handler: None,
            routing: None,
            exhaustive: false,
            patterns: Vec::new(),
            transport: None,
            executor: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (delegate spawns, fetch failures, ordering
    /// decisions) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Direct-call mode: every update goes to `handler`.
    pub fn handler(mut self, handler: impl Handler<U>) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Direct-call mode with an already shared handler.
    pub fn handler_ref(mut self, handler: HandlerRef<U>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Routing-table mode: `classify` picks the flavor, `table` the handler.
    pub fn routing(mut self, classify: impl Classify<U>, table: RoutingTable<U>) -> Self {
        self.routing = Some((Arc::new(classify), table));
        self
    }

    /// Fails the build if the routing table leaves any flavor unrouted.
    pub fn require_exhaustive_routes(mut self) -> Self {
        self.exhaustive = true;
        self
    }

    /// Delegation mode: appends `pattern` to the seeder chain.
    ///
    /// Patterns are evaluated in the order they were added.
    pub fn delegate(mut self, pattern: DelegationPattern<U>) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Transport for the polling source.
    pub fn with_transport(mut self, transport: impl Transport<U>) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Runs delegates on `executor` instead of the default tokio executor.
    ///
    /// [`Runtime::wait_delegates`] cannot wait for delegates of a custom executor.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Validates the configuration and assembles the runtime.
    ///
    /// Must be called from within a tokio runtime when subscribers are configured.
    pub fn build(self) -> Result<Runtime<U>, ConfigurationError> {
        let mode = select_mode(self.handler, self.routing, self.patterns, self.exhaustive)?;
        let bus = Bus::new(self.cfg.bus_capacity_clamped());

        let (executor, tokio_executor): (Arc<dyn Executor>, _) = match self.executor {
            Some(custom) => (custom, None),
            None => {
                let exec = TokioExecutor::new(bus.clone());
                (Arc::new(exec.clone()), Some(exec))
            }
        };

        let (state_tx, state) = watch::channel(SourceState::Idle);
        let (source, feed) = match self.cfg.source {
            SourceKind::Poll => {
                let transport = self.transport.ok_or(ConfigurationError::MissingTransport)?;
                let poller = Poller::new(transport, &self.cfg, bus.clone(), state_tx);
                (Source::Poll(poller), None)
            }
            SourceKind::Push => {
                if self.transport.is_some() {
                    tracing::warn!("transport is ignored by a push-fed runtime");
                }
                let buffer = self
                    .cfg
                    .is_ordered()
                    .then(|| OrderingBuffer::new(self.cfg.hold_limit()));
                let (feed, driver) = feed_channel(buffer, bus.clone(), state_tx);
                (Source::Push(driver), Some(feed))
            }
        };

        tracing::debug!(mode = mode.as_str(), source = ?self.cfg.source, "runtime built");
        let mut dispatcher = Dispatcher::new(mode, executor, bus.clone());
        if let Some(exec) = &tokio_executor {
            dispatcher = dispatcher.with_tracker(exec.tracker());
        }
        let listener = subscriber_listener(&bus, self.subscribers);

        Ok(Runtime::new_internal(
            self.cfg,
            bus,
            dispatcher,
            source,
            feed,
            state,
            tokio_executor,
            listener,
        ))
    }
}

fn select_mode<U: Update>(
    handler: Option<HandlerRef<U>>,
    routing: Option<(Arc<dyn Classify<U>>, RoutingTable<U>)>,
    patterns: Vec<DelegationPattern<U>>,
    exhaustive: bool,
) -> Result<Mode<U>, ConfigurationError> {
    match (handler, routing, patterns.is_empty()) {
        (None, None, true) => Err(ConfigurationError::NoDispatchMode),
        (Some(handler), None, true) => Ok(Mode::Direct(handler)),
        (None, Some((classify, table)), true) => {
            let missing = table.missing();
            if exhaustive && !missing.is_empty() {
                return Err(ConfigurationError::MissingRoutes(missing));
            }
            Ok(Mode::Routed { classify, table })
        }
        (None, None, false) => Ok(Mode::Delegation(SeederChain::new(patterns))),
        (Some(_), Some(_), true) => Err(ConfigurationError::ConflictingModes(
            "handler and routing table",
        )),
        (Some(_), None, false) => Err(ConfigurationError::ConflictingModes(
            "handler and delegation",
        )),
        (None, Some(_), false) => Err(ConfigurationError::ConflictingModes(
            "routing table and delegation",
        )),
        (Some(_), Some(_), false) => Err(ConfigurationError::ConflictingModes(
            "handler, routing table and delegation",
        )),
    }
}

/// Forwards bus events to the subscriber set until the returned guard is dropped.
fn subscriber_listener(bus: &Bus, subscribers: Vec<Arc<dyn Subscribe>>) -> Option<DropGuard> {
    if subscribers.is_empty() {
        return None;
    }
    let set = SubscriberSet::new(subscribers, bus.clone());
    let mut rx = bus.subscribe();
    let token = CancellationToken::new();
    let stop = token.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        set.shutdown().await;
    });
    Some(token.drop_guard())
}
