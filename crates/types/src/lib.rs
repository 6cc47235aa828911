//! Core types, errors, and codecs for shardmeta.
//!
//! This crate provides the foundational types used throughout the routing core:
//! - Identifier newtypes (PartitionId, ShardId, NodeId, ResourceId)
//! - Record-address encoding for the log-structured storage engine
//! - Partition digests with a reusable hasher slot
//! - Error types using snafu
//! - Validated configuration

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod error;
pub mod hash;
pub mod record_address;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ErrorCode, MetadataError, Result};
pub use hash::{DigestSlot, Hash, sha256, shared_digest_slot};
pub use record_address::{RecordAddress, SegmentOrder, TRANSIENT_SEGMENT};
pub use types::*;
