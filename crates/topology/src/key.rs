//! Binary key layout.
//!
//! A key is a major path followed by an optional minor path. Records that
//! share a major path are placed on the same partition, so only the major
//! prefix of the encoded key participates in hashing.
//!
//! ```text
//! major[0] 0x00 major[1] ... 0xFF minor[0] 0x00 minor[1] ...
//! ```
//!
//! Components are UTF-8 and therefore never contain `0xFF`; they must not
//! contain `0x00`.

use std::fmt;

use shardmeta_types::{Result, error::InvalidArgumentSnafu};
use snafu::ensure;

/// Separator between path components.
pub const COMPONENT_DELIMITER: u8 = 0x00;

/// Separator between the major and minor paths.
pub const MAJOR_MINOR_DELIMITER: u8 = 0xFF;

/// Returns the length of the major-path prefix of an encoded key.
///
/// Bytes without a major/minor delimiter are entirely major path.
#[inline]
pub fn major_key_len(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == MAJOR_MINOR_DELIMITER).unwrap_or(bytes.len())
}

/// A structured key with major and minor paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    major: Vec<String>,
    minor: Vec<String>,
}

impl Key {
    /// Creates a key.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `major` is empty or any component
    /// contains a NUL byte.
    pub fn new(major: Vec<String>, minor: Vec<String>) -> Result<Self> {
        ensure!(!major.is_empty(), InvalidArgumentSnafu { message: "key major path must not be empty" });
        if let Some(bad) = major.iter().chain(minor.iter()).find(|c| c.as_bytes().contains(&0)) {
            return InvalidArgumentSnafu {
                message: format!("key component {bad:?} contains a NUL byte"),
            }
            .fail();
        }
        Ok(Self { major, minor })
    }

    /// Creates a key from string slices.
    ///
    /// # Errors
    ///
    /// Same as [`Key::new`].
    pub fn from_parts(major: &[&str], minor: &[&str]) -> Result<Self> {
        Self::new(
            major.iter().map(|s| (*s).to_string()).collect(),
            minor.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    /// Decodes a key from its binary layout.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if a component is not valid UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let split = major_key_len(bytes);
        let major = split_components(&bytes[..split])?;
        let minor = if split < bytes.len() { split_components(&bytes[split + 1..])? } else { Vec::new() };
        Ok(Self { major, minor })
    }

    /// Major path components.
    pub fn major(&self) -> &[String] {
        &self.major
    }

    /// Minor path components.
    pub fn minor(&self) -> &[String] {
        &self.minor
    }

    /// Encodes only the major path.
    pub fn major_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        join_components(&mut out, &self.major);
        out
    }

    /// Encodes the full key.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.major_bytes();
        if !self.minor.is_empty() {
            out.push(MAJOR_MINOR_DELIMITER);
            join_components(&mut out, &self.minor);
        }
        out
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in &self.major {
            write!(f, "/{component}")?;
        }
        if !self.minor.is_empty() {
            f.write_str("/-")?;
            for component in &self.minor {
                write!(f, "/{component}")?;
            }
        }
        Ok(())
    }
}

fn join_components(out: &mut Vec<u8>, components: &[String]) {
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            out.push(COMPONENT_DELIMITER);
        }
        out.extend_from_slice(component.as_bytes());
    }
}

fn split_components(bytes: &[u8]) -> Result<Vec<String>> {
    bytes
        .split(|&b| b == COMPONENT_DELIMITER)
        .map(|part| {
            String::from_utf8(part.to_vec()).map_err(|e| {
                InvalidArgumentSnafu { message: format!("key component is not UTF-8: {e}") }.build()
            })
        })
        .collect()
}
