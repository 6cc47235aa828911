//! Error types for shardmeta using snafu.
//!
//! Only two kinds of failure are ever raised by the metadata core:
//! - Contract errors: a caller passed an argument that can never be valid.
//! - Internal invariant violations: a value reached a place it must not be.
//!
//! Transient distributed-state conditions (stale topology, unknown role,
//! unreachable node) are represented as ordinary data and never appear here.
//!
//! Each error variant maps to an [`ErrorCode`] with a unique numeric identifier
//! and a suggested recovery action.

use core::fmt;

use snafu::{Location, Snafu};

use crate::{codec::CodecError, config::ConfigError};

/// Unified result type for metadata operations.
pub type Result<T, E = MetadataError> = std::result::Result<T, E>;

/// Machine-readable error codes for programmatic error handling.
///
/// | Range     | Domain   | Examples                                 |
/// |-----------|----------|------------------------------------------|
/// | 1000–1099 | Contract | Invalid argument, malformed change       |
/// | 1100–1199 | Invariant| Internal invariant violation             |
/// | 1200–1299 | Support  | Serialization, configuration             |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// Invalid argument passed to a constructor or operation.
    InvalidArgument = 1000,
    /// Internal invariant violated.
    Internal = 1100,
    /// Serialization or deserialization error.
    Serialization = 1200,
    /// Configuration error.
    Config = 1201,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::InvalidArgument),
            1100 => Some(Self::Internal),
            1200 => Some(Self::Serialization),
            1201 => Some(Self::Config),
            _ => None,
        }
    }

    /// Returns `true` if repeating the failed call could succeed.
    ///
    /// Always `false`: every code describes a caller bug, an invariant
    /// violation, or bad input, and retrying belongs to the dispatch layer.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        match self {
            Self::InvalidArgument | Self::Internal | Self::Serialization | Self::Config => false,
        }
    }

    /// Suggested recovery action for this error code.
    #[must_use]
    pub const fn suggested_action(self) -> &'static str {
        match self {
            Self::InvalidArgument => "Fix the caller. The argument can never be valid.",
            Self::Internal => {
                "Unexpected state or invariant violation. Collect the reported values and report as an issue."
            },
            Self::Serialization => {
                "Codec bug, version skew, or data corruption. Fall back to a full topology snapshot."
            },
            Self::Config => "Fix the configuration value and restart.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Top-level error type for metadata operations.
///
/// None of these errors is retryable: they describe programming mistakes or
/// corrupted input, and retrying the same call reproduces them.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetadataError {
    /// A caller violated an operation's contract.
    #[snafu(display("Invalid argument at {location}: {message}"))]
    InvalidArgument {
        /// Description of the violated contract.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// An internal invariant was violated.
    #[snafu(display("Internal invariant violated at {location}: {message}"))]
    Internal {
        /// Description naming the offending values.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Wire encoding or decoding failed.
    #[snafu(display("Codec error: {source}"))]
    Codec {
        /// Underlying codec error.
        source: CodecError,
    },

    /// Configuration failed validation.
    #[snafu(display("Configuration error: {source}"))]
    Config {
        /// Underlying configuration error.
        source: ConfigError,
    },
}

impl MetadataError {
    /// Returns the machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Internal { .. } => ErrorCode::Internal,
            Self::Codec { .. } => ErrorCode::Serialization,
            Self::Config { .. } => ErrorCode::Config,
        }
    }

    /// Whether this error is retryable.
    ///
    /// Delegates to [`ErrorCode::is_retryable`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Suggested recovery action for this error.
    #[must_use]
    pub const fn suggested_action(&self) -> &'static str {
        self.code().suggested_action()
    }
}

impl From<CodecError> for MetadataError {
    fn from(source: CodecError) -> Self {
        Self::Codec { source }
    }
}

impl From<ConfigError> for MetadataError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}
