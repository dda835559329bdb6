//! Error types used by the seedvisor runtime, its sources and its delegates.
//!
//! - [`RuntimeError`]: errors surfaced by the runtime itself (fatal for the caller).
//! - [`ConfigurationError`]: programming/configuration mistakes; never retried.
//! - [`TransportError`]: fetch failures of the polling source; always retried.
//! - [`DelegateError`]: failures inside a delegate; isolated to that delegate.
//! - [`HandlerError`]: failures of a direct/routed handler; reported, not propagated.
//! - [`ListenError`], [`FeedError`], [`ScheduleError`]: listener waits, push-feed
//!   submissions and timed events.
//!
//! Every enum provides `as_label()` (a short stable snake_case label for logs/metrics).

use std::time::Duration;
use thiserror::Error;

use crate::dispatch::Flavor;

/// # Errors produced by the seedvisor runtime.
///
/// Either a configuration mistake (surfaced at build time or at first use),
/// a grace period overrun while waiting for delegates, or a signal registration failure.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The runtime was misconfigured or met a value it cannot work with.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Delegates were still running when the grace period ran out.
    #[error("grace period {grace:?} exceeded; {running} delegate(s) still running")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Number of delegates that had not finished.
        running: usize,
    },

    /// OS signal handlers could not be installed.
    #[error("signal registration failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use seedvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), running: 2 };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Configuration(e) => e.as_label(),
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }

    /// True if the error is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RuntimeError::Configuration(_))
    }
}

/// # Configuration errors.
///
/// Fatal: surfaced immediately at the point of first use and never retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// An update was classified to a flavor with no routing-table entry.
    #[error("no handler routed for flavor {0}")]
    UnhandledFlavor(Flavor),

    /// Exhaustive routing was requested but some flavors have no handler.
    #[error("routing table misses flavors: {0:?}")]
    MissingRoutes(Vec<Flavor>),

    /// Neither a handler, a routing table nor delegation patterns were configured.
    #[error("no dispatch mode configured (handler, routing table or delegation)")]
    NoDispatchMode,

    /// More than one dispatch mode was configured.
    #[error("dispatch modes are mutually exclusive: {0}")]
    ConflictingModes(&'static str),

    /// The polling source was selected without a transport.
    #[error("polling source requires a transport")]
    MissingTransport,

    /// A push feed was requested from a runtime configured for polling.
    #[error("push feed is not available for a polling runtime")]
    FeedUnavailable,
}

impl ConfigurationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigurationError::UnhandledFlavor(_) => "config_unhandled_flavor",
            ConfigurationError::MissingRoutes(_) => "config_missing_routes",
            ConfigurationError::NoDispatchMode => "config_no_dispatch_mode",
            ConfigurationError::ConflictingModes(_) => "config_conflicting_modes",
            ConfigurationError::MissingTransport => "config_missing_transport",
            ConfigurationError::FeedUnavailable => "config_feed_unavailable",
        }
    }
}

/// # Errors produced by a [`Transport`](crate::Transport) fetch.
///
/// All variants are transient from the poller's point of view: the poller reports them,
/// waits, and retries from the same cursor.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The fetch did not complete within its deadline.
    #[error("fetch timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The remote side is temporarily unavailable (e.g. a bad gateway).
    #[error("remote unavailable (status {status})")]
    Unavailable {
        /// Status code reported by the remote side.
        status: u16,
    },

    /// The remote side answered with an error response.
    #[error("http error {status}: {message}")]
    Http {
        /// Status code of the response.
        status: u16,
        /// Description from the response.
        message: String,
    },

    /// Connection-level failure.
    #[error("io error: {0}")]
    Io(String),
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Timeout { .. } => "transport_timeout",
            TransportError::Unavailable { .. } => "transport_unavailable",
            TransportError::Http { .. } => "transport_http",
            TransportError::Io(_) => "transport_io",
        }
    }

    /// True if the remote side asked us to back off for longer than usual.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TransportError::Unavailable { .. })
    }
}

/// # Errors produced by delegate execution.
///
/// Isolated to the failing delegate: reported through the event bus and never
/// propagated back into the dispatch path.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelegateError {
    /// The delegate's work returned an error.
    #[error("delegate failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// `start()` was called on a delegate that had already been started.
    #[error("delegate already started")]
    AlreadyStarted,

    /// The delegate's work panicked.
    #[error("delegate panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl DelegateError {
    /// Convenience constructor for [`DelegateError::Failed`].
    pub fn failed(error: impl Into<String>) -> Self {
        DelegateError::Failed {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DelegateError::Failed { .. } => "delegate_failed",
            DelegateError::AlreadyStarted => "delegate_already_started",
            DelegateError::Panicked { .. } => "delegate_panicked",
        }
    }
}

/// Failure of a direct or routed handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler failed: {error}")]
pub struct HandlerError {
    /// The underlying error message.
    pub error: String,
}

impl HandlerError {
    /// Creates a handler error from any message.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// # Errors produced while a [`Listener`](crate::Listener) waits for updates.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenError {
    /// `wait()` was called before any capture pattern was registered.
    #[error("listener has nothing to capture")]
    NothingToCapture,

    /// No matching update arrived within the idle timeout.
    #[error("idle for {timeout:?}")]
    Idle {
        /// The idle timeout that elapsed.
        timeout: Duration,
    },

    /// The runtime's microphone was dropped; no further updates will arrive.
    #[error("update stream closed")]
    Closed,
}

impl ListenError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ListenError::NothingToCapture => "listen_nothing_to_capture",
            ListenError::Idle { .. } => "listen_idle",
            ListenError::Closed => "listen_closed",
        }
    }
}

/// Error returned by [`Feed::feed`](crate::Feed::feed).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedError {
    /// The feed driver has stopped; the update was not accepted.
    #[error("feed closed")]
    Closed,
}

/// Error returned by the [`Scheduler`](crate::Scheduler) once its runtime has stopped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// The timer driver is gone; the event was not scheduled.
    #[error("scheduler closed")]
    Closed,
}
