//! Error types for vpx-trajectory

use thiserror::Error;

/// Result type alias for decoder and index operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Index record (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Truncated or malformed coded data
    #[error("Bitstream error: {0}")]
    Bitstream(String),

    /// Frame parameters the session cannot accept, e.g. a size change
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Caller or index contract violation
    #[error("Logic error: {0}")]
    LogicError(String),

    /// Index already holds this frame id or (source, target) identity
    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(String),

    /// No indexed frame can be decoded from the given state
    #[error("No decodable frame: {0}")]
    NoDecodableFrame(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a bitstream error
    pub fn bitstream<S: Into<String>>(msg: S) -> Self {
        Error::Bitstream(msg.into())
    }

    /// Create an unsupported configuration error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::UnsupportedConfiguration(msg.into())
    }

    /// Create a logic error
    pub fn logic<S: Into<String>>(msg: S) -> Self {
        Error::LogicError(msg.into())
    }

    /// Create a duplicate identity error
    pub fn duplicate<S: Into<String>>(msg: S) -> Self {
        Error::DuplicateIdentity(msg.into())
    }

    /// Create a no-decodable-frame error
    pub fn no_decodable<S: Into<String>>(msg: S) -> Self {
        Error::NoDecodableFrame(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unsupported("frame is 32x32, session is 16x16");
        assert_eq!(
            err.to_string(),
            "Unsupported configuration: frame is 32x32, session is 16x16"
        );
        assert!(matches!(Error::logic("x"), Error::LogicError(_)));
    }

    #[test]
    fn test_constructors_cover_message_variants() {
        let built = [
            Error::bitstream("a"),
            Error::unsupported("b"),
            Error::logic("c"),
            Error::duplicate("d"),
            Error::no_decodable("e"),
            Error::invalid_input("f"),
        ];
        for err in built {
            // Exhaustive on purpose: a variant without a constructor fails here
            let message = match &err {
                Error::Io(_) | Error::Serialization(_) => unreachable!(),
                Error::Bitstream(m)
                | Error::UnsupportedConfiguration(m)
                | Error::LogicError(m)
                | Error::DuplicateIdentity(m)
                | Error::NoDecodableFrame(m)
                | Error::InvalidInput(m) => m,
            };
            assert!(err.to_string().ends_with(message.as_str()));
        }
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
