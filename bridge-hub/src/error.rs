use crate::{config::ConfigError, roles::RoleSetError};

/// Top-level error returned by [`crate::facade::ManagerFacade::start`].
/// Setup failures abort before any payload exchange, tag problems abort
/// the offending loop, transform failures propagate with no retry.
#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error("setup failure: {0}")]
    SetupFailure(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Roles(#[from] RoleSetError),

    #[error(transparent)]
    Buffer(#[from] bridge_buffer::BufferError),

    #[error(transparent)]
    Proto(#[from] bridge_proto::ProtoError),

    #[error(transparent)]
    Transform(#[from] bridge_transform::TransformError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FacadeError {
    /// Every failure exits non-zero; only a clean termination tag exits
    /// the process successfully.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
