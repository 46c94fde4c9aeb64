use thiserror::Error;

pub type Result<T> = std::result::Result<T, PrepError>;

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("data inconsistency in {context}: {message}")]
    DataInconsistency {
        context: &'static str,
        message: String,
    },
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("WAV error while {context}: {source}")]
    Wav {
        context: String,
        #[source]
        source: hound::Error,
    },
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl PrepError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn inconsistent(context: &'static str, message: impl Into<String>) -> Self {
        Self::DataInconsistency {
            context,
            message: message.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn wav(context: impl Into<String>, source: hound::Error) -> Self {
        Self::Wav {
            context: context.into(),
            source,
        }
    }
}
