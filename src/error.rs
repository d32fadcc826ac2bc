use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContainerError>;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Dependency not found: {type_name}")]
    DependencyNotFound { type_name: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ContainerError {
    /// Returns a short stable label for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            ContainerError::DependencyNotFound { .. } => "dependency_not_found",
            ContainerError::DowncastFailed { .. } => "downcast_failed",
            ContainerError::Internal(_) => "container_internal",
        }
    }
}
