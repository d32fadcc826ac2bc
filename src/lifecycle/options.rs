//! Host options loaded once from configuration

use crate::config::ConfigService;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// Configuration key holding the shutdown timeout in whole seconds
pub const SHUTDOWN_TIMEOUT_KEY: &str = "shutdownTimeoutSeconds";

/// Configuration key holding the [`BackgroundServiceExceptionBehavior`]
pub const BACKGROUND_EXCEPTION_BEHAVIOR_KEY: &str = "backgroundServiceExceptionBehavior";

/// Default time allowed for the stop sequence
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// What the host does when a background service ends unexpectedly
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum BackgroundServiceExceptionBehavior {
    /// Log the failure and keep running
    Ignore,
    /// Log the failure and stop the host
    #[default]
    StopHost,
}

/// Options shared by every component of a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostOptions {
    /// Upper bound for [`Host::stop`](crate::lifecycle::Host::stop)
    pub shutdown_timeout: Duration,
    pub background_service_exception_behavior: BackgroundServiceExceptionBehavior,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            background_service_exception_behavior: BackgroundServiceExceptionBehavior::default(),
        }
    }
}

impl HostOptions {
    /// Load options from configuration, keeping defaults for absent or
    /// unparsable keys.
    pub fn from_config(config: &ConfigService) -> Self {
        let mut options = Self::default();
        options.apply_config(config);
        options
    }

    pub fn apply_config(&mut self, config: &ConfigService) {
        match config.get_parsed::<u64>(SHUTDOWN_TIMEOUT_KEY) {
            Some(seconds) => self.shutdown_timeout = Duration::from_secs(seconds),
            None if config.contains(SHUTDOWN_TIMEOUT_KEY) => {
                tracing::debug!(
                    "Ignoring unparsable {}, keeping {:?}",
                    SHUTDOWN_TIMEOUT_KEY,
                    self.shutdown_timeout
                );
            }
            None => {}
        }

        if let Some(behavior) = config.get_parsed(BACKGROUND_EXCEPTION_BEHAVIOR_KEY) {
            self.background_service_exception_behavior = behavior;
        }
    }
}
