// error.rs - Error types for onig2es.
//
// One variant per error class: lexical, semantic, unsupported-feature and
// policy errors come from the pipeline itself; invalid-argument covers
// misused options and engine covers native-engine compile failures.

use std::fmt;

/// Error type for transpilation and emulated matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed pattern text: unterminated group/class, invalid escape,
    /// out-of-range code point.
    Lexical { message: String, pos: usize },
    /// Structurally valid pattern with inconsistent meaning: bad
    /// backreference or subroutine target, duplicate-name misuse,
    /// reversed class range, unknown POSIX class.
    Semantic { message: String },
    /// A construct this transpiler deliberately does not implement.
    Unsupported { message: String },
    /// A valid construct whose emulation is rejected by the configured
    /// accuracy or subclass policy, or needs a newer target.
    Policy { message: String },
    /// Invalid option value or argument.
    InvalidArgument { message: String },
    /// The native engine rejected a generated pattern.
    Engine { message: String },
}

impl Error {
    pub(crate) fn lexical(pos: usize, message: impl Into<String>) -> Error {
        Error::Lexical { message: message.into(), pos }
    }

    pub(crate) fn semantic(message: impl Into<String>) -> Error {
        Error::Semantic { message: message.into() }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Error {
        Error::Unsupported { message: message.into() }
    }

    pub(crate) fn policy(message: impl Into<String>) -> Error {
        Error::Policy { message: message.into() }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
        Error::InvalidArgument { message: message.into() }
    }

    /// The human-readable message without the class prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Lexical { message, .. }
            | Error::Semantic { message }
            | Error::Unsupported { message }
            | Error::Policy { message }
            | Error::InvalidArgument { message }
            | Error::Engine { message } => message,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lexical { message, pos } => {
                write!(f, "syntax error at {}: {}", pos, message)
            }
            Error::Semantic { message } => write!(f, "invalid pattern: {}", message),
            Error::Unsupported { message } => write!(f, "unsupported: {}", message),
            Error::Policy { message } => write!(f, "cannot emulate: {}", message),
            Error::InvalidArgument { message } => write!(f, "invalid argument: {}", message),
            Error::Engine { message } => write!(f, "engine error: {}", message),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
