//! Session and result state for a dev session.

/// Lifecycle of a dev session.
///
/// `Starting -> Bundling -> Watching -> Stopping -> Stopped`. Only a
/// session in one of the first three phases may publish a manifest or
/// allocate worker directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Extensions are being registered and started
    Starting,
    /// The initial bundling pass is running
    Bundling,
    /// Rebuilding on change
    Watching,
    /// `stop()` has been called and teardown is in progress
    Stopping,
    Stopped,
}

impl SessionPhase {
    pub fn is_live(self) -> bool {
        !matches!(self, SessionPhase::Stopping | SessionPhase::Stopped)
    }
}

/// Which bundling result the end-of-pass plugin expects next.
///
/// The initial result is handled by the session itself once
/// `Bundler::build` returns, so the plugin must let exactly that one
/// through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultPhase {
    AwaitingFirstResult,
    SteadyState,
}

impl ResultPhase {
    /// Move to `SteadyState`, returning whether this was the first result.
    pub fn advance(&mut self) -> bool {
        let first = *self == ResultPhase::AwaitingFirstResult;
        *self = ResultPhase::SteadyState;
        first
    }
}
