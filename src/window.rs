//! RAW configuration data model
//!
//! A [`WindowConfig`] describes one restricted access window: which AIDs it
//! applies to, its slot layout and the optional periodic and beacon spreading
//! behaviour.

use serde::{Deserialize, Serialize};
use crate::aid::INVALID_AID_IDX;
use crate::slot::SlotDefinition;
use crate::{RawError, Result};

/// RAW type carried in the RAW control subfield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum WindowKind {
    #[default]
    Generic = 0,
    Sounding = 1,
    Simplex = 2,
    Triggering = 3,
}

impl WindowKind {
    /// Parse kind from u8
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WindowKind::Generic),
            1 => Ok(WindowKind::Sounding),
            2 => Ok(WindowKind::Simplex),
            3 => Ok(WindowKind::Triggering),
            _ => Err(RawError::InvalidArgument(format!("Invalid RAW type: {}", value))),
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Only generic RAWs can be serialized
    pub fn is_supported(&self) -> bool {
        matches!(self, WindowKind::Generic)
    }
}

/// Periodic RAW (PRAW) parameters and countdown state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicParams {
    /// Period of the PRAW in beacon intervals
    pub periodicity: u8,
    /// Number of periods the PRAW repeats
    pub validity: u8,
    /// Beacons until the first occurrence
    pub start_offset: u8,
    /// Periods left in the current validity
    pub cur_validity: u8,
    /// Beacons left until the next occurrence
    pub cur_start_offset: u8,
    /// Restart transmission instead of expiring
    pub refresh_on_expiry: bool,
}

impl PeriodicParams {
    pub fn new(periodicity: u8, validity: u8, start_offset: u8, refresh_on_expiry: bool) -> Self {
        Self {
            periodicity,
            validity,
            start_offset,
            cur_validity: validity,
            cur_start_offset: start_offset,
            refresh_on_expiry,
        }
    }

    /// Restore the running counters to their configured values
    pub fn reset(&mut self) {
        self.cur_validity = self.validity;
        self.cur_start_offset = self.start_offset;
    }

    /// The countdown can only complete periods with these constraints
    pub fn is_valid(&self) -> bool {
        self.periodicity > 0 && self.validity > 0 && self.start_offset < self.periodicity
    }
}

/// Beacon spreading parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconSpreading {
    /// Maximum number of beacons to spread over (0 = unlimited)
    pub max_spread: u16,
    /// Nominal number of stations in each beacon's RAW (0 = disabled)
    pub nominal_stations_per_beacon: u16,
    /// Last AID included in a previous beacon
    pub last_spread_aid: u16,
}

impl BeaconSpreading {
    pub fn new(max_spread: u16, nominal_stations_per_beacon: u16) -> Self {
        Self {
            max_spread,
            nominal_stations_per_beacon,
            last_spread_aid: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.nominal_stations_per_beacon > 0
    }
}

/// A user (or engine) defined RAW
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Configuration identity, never zero
    pub id: u16,
    /// RAW type
    pub kind: WindowKind,
    /// First AID of the range
    pub start_aid: u16,
    /// Last AID of the range (inclusive)
    pub end_aid: u16,
    /// Index of `start_aid` in the current AID list, or -1
    pub start_aid_idx: i32,
    /// Index of `end_aid` in the current AID list, or -1
    pub end_aid_idx: i32,
    /// Offset of the RAW start from the end of the beacon
    pub start_time_us: u32,
    /// Slot layout
    pub slot: SlotDefinition,
    /// PRAW parameters
    pub periodic: Option<PeriodicParams>,
    /// Beacon spreading parameters
    pub beacon_spreading: Option<BeaconSpreading>,
}

impl WindowConfig {
    /// Create an empty config
    pub fn new(id: u16) -> Self {
        Self {
            id,
            kind: WindowKind::Generic,
            start_aid: 0,
            end_aid: 0,
            start_aid_idx: INVALID_AID_IDX,
            end_aid_idx: INVALID_AID_IDX,
            start_time_us: 0,
            slot: SlotDefinition::default(),
            periodic: None,
            beacon_spreading: None,
        }
    }

    /// Create a generic RAW for an AID range
    pub fn generic(id: u16, start_aid: u16, end_aid: u16, slot: SlotDefinition) -> Self {
        Self {
            start_aid,
            end_aid,
            slot,
            ..Self::new(id)
        }
    }

    pub fn with_periodic(mut self, periodic: PeriodicParams) -> Self {
        self.periodic = Some(periodic);
        self
    }

    pub fn with_beacon_spreading(mut self, spreading: BeaconSpreading) -> Self {
        self.beacon_spreading = Some(spreading);
        self
    }

    pub fn with_start_time(mut self, start_time_us: u32) -> Self {
        self.start_time_us = start_time_us;
        self
    }

    /// Check if the config contains the minimum required fields for activation
    pub fn is_valid(&self) -> bool {
        self.slot.duration_us > 0
            && self.start_aid > 0
            && self.end_aid > 0
            && self.periodic.map_or(true, |p| p.is_valid())
    }

    pub fn is_periodic(&self) -> bool {
        self.periodic.is_some()
    }

    /// Beacon spreading is configured with a non-zero nominal station count
    pub fn uses_beacon_spreading(&self) -> bool {
        self.beacon_spreading.is_some_and(|s| s.is_enabled())
    }

    /// The AID indices resolved against current membership
    pub fn has_resolved_indices(&self) -> bool {
        self.start_aid_idx >= 0 && self.end_aid_idx >= 0
    }

    pub fn invalidate_indices(&mut self) {
        self.start_aid_idx = INVALID_AID_IDX;
        self.end_aid_idx = INVALID_AID_IDX;
    }
}
