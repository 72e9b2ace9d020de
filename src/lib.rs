//! # S1G RAW engine
//!
//! Restricted Access Window (RAW) scheduling and RAW Parameter Set (RPS)
//! element generation for 802.11ah (S1G) access points.
//!
//! ## Architecture
//!
//! The implementation is organized into several modules:
//! - `aid`: Station membership bitmap and sorted AID lists
//! - `slot`: RAW slot definition encoding
//! - `window`: RAW configuration data model
//! - `store`: Configuration store and active assignment lists
//! - `command`: TLV command parsing
//! - `spread`: Beacon spreading of AID ranges
//! - `periodic`: Periodic RAW (PRAW) countdown state machine
//! - `rps`: RPS element sizing, serialization and parsing
//! - `wire`: Low-level cursor buffer used by the element writer
//! - `ratelimit`: Rate limiting of repeated warnings
//! - `context`: Per-interface RAW context and regeneration pass
//! - `ocs`: Internal assignment used during off-channel scans
//! - `daemon`: Serialized update worker and engine configuration

pub mod aid;
pub mod command;
pub mod context;
pub mod ocs;
pub mod periodic;
pub mod ratelimit;
pub mod rps;
pub mod slot;
pub mod spread;
pub mod store;
pub mod window;
pub mod wire;

pub mod daemon;

// Re-export commonly used types
pub use crate::{
    aid::{AidBitmap, AidList},
    command::{CommandFlags, CommandTlv, RawCommand},
    context::{InterfaceKind, PendingWork, RawContext, RawStats},
    rps::{RawAssignment, RpsIe},
    slot::{SlotDefinition, SlotFormat},
    store::{ConfigStore, Membership},
    window::{BeaconSpreading, PeriodicParams, WindowConfig, WindowKind},
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RawError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("RAW config {0} not found")]
    NotFound(u16),

    #[error("RAW id {0} is reserved for internal use")]
    PermissionDenied(u16),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RawError>;

// Constants

/// Configuration id reserved for engine-wide commands
pub const RAW_META_ID: u16 = 0;

/// First id reserved for assignments created by the engine itself
pub const INTERNAL_ID_OFFSET: u16 = 0x8000;

/// Largest AID representable in an S1G RAW group (11 bits, excluding reserved values)
pub const MAX_AID: u16 = 2007;

/// Default number of assignments carried in a single RPS element
pub const DEFAULT_MAX_ASSIGNMENTS: usize = 32;

/// PRAWs are retransmitted for this many DTIM periods after any change
pub const RAW_DTIMS_FOR_PRAW_TX: u16 = 10;

/// Element id of the RPS element in S1G beacons
pub const WLAN_EID_S1G_RPS: u8 = 208;

// Utility functions
pub fn init_logging() {
    env_logger::init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(RAW_META_ID, 0);
        assert!(INTERNAL_ID_OFFSET > MAX_AID);
        assert_eq!(DEFAULT_MAX_ASSIGNMENTS, 32);
        assert_eq!(RAW_DTIMS_FOR_PRAW_TX, 10);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(RawError::NotFound(7).to_string(), "RAW config 7 not found");
        assert_eq!(
            RawError::PermissionDenied(0x8001).to_string(),
            "RAW id 32769 is reserved for internal use"
        );
    }
}
