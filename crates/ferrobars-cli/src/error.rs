use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ferrobars_core::ConfigError),

    #[error(transparent)]
    Validation(#[from] ferrobars_core::ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] ferrobars_core::WarehouseError),

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Writing command output failed, e.g. a closed stdout pipe.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Validation(_) => 2,
            Self::Storage(_) => 3,
            Self::Server(_) => 4,
            Self::Serialization(_) => 5,
            Self::Io(_) => 10,
        }
    }
}
