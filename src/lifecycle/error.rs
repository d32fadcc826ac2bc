//! Host-specific error types

use crate::error::ContainerError;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while building, starting, stopping or disposing a host
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HostError {
    /// The host could not be assembled from the container
    #[error("Host construction failed: {message}")]
    Construction {
        message: String,
        #[source]
        source: Option<ContainerError>,
    },

    /// `build()` was called on a builder that already produced a host
    #[error("Build can only be called once")]
    AlreadyBuilt,

    /// `start()` was called on a host that has already been started
    #[error("Host has already been started")]
    AlreadyStarted,

    /// A hosted service failed to start; later services were not started
    #[error("Hosted service {service} failed to start")]
    ServiceStart {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    /// A hosted service failed to stop
    #[error("Hosted service {service} failed to stop")]
    ServiceStop {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    /// The host lifetime failed while stopping
    #[error("Host lifetime failed to stop")]
    HostLifetime {
        #[source]
        source: anyhow::Error,
    },

    /// The foreground application loop failed or refused to exit
    #[error("Application {action} failed")]
    Application {
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// One or more failures collected during the stop sequence
    #[error(transparent)]
    AggregateStop(AggregateError),

    /// A deadline was exceeded or the operation was cancelled
    #[error("Operation cancelled during {phase}")]
    Cancelled { phase: String },
}

impl HostError {
    /// Create a construction error with no underlying container error
    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction {
            message: message.into(),
            source: None,
        }
    }

    /// Create a construction error caused by a failed resolution
    pub fn missing_dependency(message: impl Into<String>, source: ContainerError) -> Self {
        Self::Construction {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn service_start(service: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ServiceStart {
            service: service.into(),
            source,
        }
    }

    pub fn service_stop(service: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ServiceStop {
            service: service.into(),
            source,
        }
    }

    pub fn cancelled(phase: impl Into<String>) -> Self {
        Self::Cancelled {
            phase: phase.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            HostError::Construction { .. } => "host_construction",
            HostError::AlreadyBuilt => "host_already_built",
            HostError::AlreadyStarted => "host_already_started",
            HostError::ServiceStart { .. } => "service_start_failed",
            HostError::ServiceStop { .. } => "service_stop_failed",
            HostError::HostLifetime { .. } => "host_lifetime_failed",
            HostError::Application { .. } => "application_failed",
            HostError::AggregateStop(_) => "host_stop_aggregate",
            HostError::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, HostError::Cancelled { .. })
    }

    /// The collected failures when this is an aggregate stop error.
    pub fn as_aggregate(&self) -> Option<&AggregateError> {
        match self {
            HostError::AggregateStop(aggregate) => Some(aggregate),
            _ => None,
        }
    }
}

/// Several independent failures raised by a single logical operation
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<HostError>,
}

impl AggregateError {
    pub fn new(errors: Vec<HostError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[HostError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<HostError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred while stopping the host", self.errors.len())?;
        for (index, error) in self.errors.iter().enumerate() {
            write!(f, "\n  [{}] {}", index, error)?;
            if let Some(source) = std::error::Error::source(error) {
                write!(f, ": {:#}", source)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// A specialized Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;

/// Marker error a background service returns when it stopped because its
/// token was cancelled rather than because it failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation was cancelled")]
pub struct Cancelled;
