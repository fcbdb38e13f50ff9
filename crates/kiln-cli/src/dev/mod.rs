//! Watch-mode dev sessions.
//!
//! A [`DevSession`] keeps one [`kiln_bundler::BuildManifest`] current while
//! the project's sources change. See [`start_dev_session`].

mod plugins;
mod session;
mod state;

use std::time::Duration;

use kiln_bundler::{Bundler, Placement, SharedExtension, WatchSource};
use kiln_config::ResolvedConfig;

pub use session::{DevSession, ManifestReceiver, start_dev_session};
pub use state::{ResultPhase, SessionPhase};

/// Everything needed to start a [`DevSession`].
pub struct DevSessionOptions {
    pub config: ResolvedConfig,
    /// Registered after the built-in externals extension, in order
    pub extensions: Vec<(SharedExtension, Placement)>,
    pub bundler: Bundler,
    pub watch: WatchSource,
    /// Overrides `dev.debounce_ms` from the config
    pub debounce: Option<Duration>,
}

impl DevSessionOptions {
    /// Watch the project on disk with the default engine.
    pub fn new(config: ResolvedConfig) -> Self {
        Self {
            config,
            extensions: Vec::new(),
            bundler: Bundler::default(),
            watch: WatchSource::Filesystem,
            debounce: None,
        }
    }

    pub fn extension(mut self, extension: SharedExtension) -> Self {
        self.extensions.push((extension, Placement::Append));
        self
    }

    pub fn prepend_extension(mut self, extension: SharedExtension) -> Self {
        self.extensions.push((extension, Placement::Prepend));
        self
    }

    pub fn bundler(mut self, bundler: Bundler) -> Self {
        self.bundler = bundler;
        self
    }

    pub fn watch(mut self, source: WatchSource) -> Self {
        self.watch = source;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }
}
