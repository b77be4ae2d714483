use thiserror::Error;

/// Invalid deduplication settings. Raised before any comparison work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("unknown field `{0}` (not present in the record schema)")]
    UnknownField(String),

    #[error("invalid method `{0}` (expected `exact` or `fuzzy:<algorithm>`)")]
    InvalidMethod(String),

    #[error("threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f64),

    #[error("match_by must name at least one field")]
    EmptyMatchBy,

    #[error("invalid blocking strategy: {0}")]
    InvalidBlocking(String),

    #[error("invalid representative policy `{0}`")]
    InvalidRepresentative(String),
}

/// All errors that can occur in revkit-core.
#[derive(Debug, Error)]
pub enum RevkitError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Exit codes used by the `revkit` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidArgs = 3,
    FileSystemError = 4,
}

impl RevkitError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Configuration(_) | Self::Schema(_) => ExitCode::InvalidArgs,
            Self::Io(_) => ExitCode::FileSystemError,
            Self::TomlParse(_) | Self::TomlSerialize(_) => ExitCode::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, RevkitError>;
