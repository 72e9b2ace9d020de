//! RAW slot definition encoding
//!
//! The slot definition subfield carries the slot duration (in "cslot" units of
//! 120us above a 500us floor) and the number of slots. Two mutually exclusive
//! layouts exist; longer durations are always preferred over more slots.

use serde::{Deserialize, Serialize};

/// Minimum slot duration in microseconds (cslot value 0)
pub const MIN_SLOT_DURATION_US: u32 = 500;

/// Duration of one cslot step in microseconds
pub const CSLOT_STEP_US: u32 = 120;

const SLOT_DEF_FORMAT: u16 = 1 << 0;
const SLOT_CROSS_BOUNDARY: u16 = 1 << 1;

const SLOT_DCOUNT_SHIFT: u16 = 2;
const SLOT_DCOUNT_8: u16 = 0x00ff << SLOT_DCOUNT_SHIFT;
const SLOT_DCOUNT_11: u16 = 0x07ff << SLOT_DCOUNT_SHIFT;

const SLOT_NUM_6_SHIFT: u16 = 10;
const SLOT_NUM_6: u16 = 0x3f << SLOT_NUM_6_SHIFT;
const SLOT_NUM_3_SHIFT: u16 = 13;
const SLOT_NUM_3: u16 = 0x07 << SLOT_NUM_3_SHIFT;

/// Convert a cslot value to microseconds
pub fn cslot_to_us(cslot: u16) -> u32 {
    MIN_SLOT_DURATION_US + cslot as u32 * CSLOT_STEP_US
}

/// Convert microseconds to a cslot value (no range checking)
pub fn us_to_cslot(us: u32) -> u32 {
    us.saturating_sub(MIN_SLOT_DURATION_US) / CSLOT_STEP_US
}

/// Bit layout of the slot definition subfield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotFormat {
    /// 8-bit duration, 6-bit slot count
    Compact,
    /// 11-bit duration, 3-bit slot count
    Extended,
}

impl SlotFormat {
    /// Largest cslot value representable
    pub fn max_cslot(&self) -> u16 {
        match self {
            SlotFormat::Compact => (1 << 8) - 1,
            SlotFormat::Extended => (1 << 11) - 1,
        }
    }

    /// Largest number of slots representable
    pub fn max_slots(&self) -> u8 {
        match self {
            SlotFormat::Compact => (1 << 6) - 1,
            SlotFormat::Extended => (1 << 3) - 1,
        }
    }
}

/// RAW slot configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDefinition {
    /// Number of slots in the RAW
    pub count: u8,
    /// Duration of each slot in microseconds
    pub duration_us: u32,
    /// Stations may continue transmitting across slot boundaries
    pub cross_slot_boundary: bool,
}

impl SlotDefinition {
    pub fn new(count: u8, duration_us: u32, cross_slot_boundary: bool) -> Self {
        Self {
            count,
            duration_us,
            cross_slot_boundary,
        }
    }

    /// Layout that will be chosen for this duration
    pub fn format(&self) -> SlotFormat {
        if us_to_cslot(self.duration_us.max(MIN_SLOT_DURATION_US)) > u8::MAX as u32 {
            SlotFormat::Extended
        } else {
            SlotFormat::Compact
        }
    }

    /// Encode the slot definition subfield.
    ///
    /// Out of range values are clamped with a warning: first the slot count,
    /// then the duration.
    pub fn encode(&self) -> u16 {
        let cslot = if self.duration_us < MIN_SLOT_DURATION_US {
            log::warn!("RAW slot duration too short, setting to {}us", MIN_SLOT_DURATION_US);
            0
        } else {
            us_to_cslot(self.duration_us)
        };

        log::debug!("Slot duration us, cslot: {}, {}", self.duration_us, cslot);

        let mut field = 0u16;
        if self.cross_slot_boundary {
            field |= SLOT_CROSS_BOUNDARY;
        }

        let format = self.format();
        let mut count = self.count;
        if count > format.max_slots() {
            log::warn!("Too many slots: {}, capping to {}", count, format.max_slots());
            count = format.max_slots();
        }

        let max_cslot = format.max_cslot();
        let cslot = if cslot > max_cslot as u32 {
            log::warn!(
                "Slot duration too long: {} ({}us), capping to {} ({}us)",
                cslot,
                MIN_SLOT_DURATION_US as u64 + cslot as u64 * CSLOT_STEP_US as u64,
                max_cslot,
                cslot_to_us(max_cslot)
            );
            max_cslot
        } else {
            cslot as u16
        };

        match format {
            SlotFormat::Extended => {
                field |= SLOT_DEF_FORMAT;
                field |= (cslot << SLOT_DCOUNT_SHIFT) & SLOT_DCOUNT_11;
                field |= ((count as u16) << SLOT_NUM_3_SHIFT) & SLOT_NUM_3;
            }
            SlotFormat::Compact => {
                field |= (cslot << SLOT_DCOUNT_SHIFT) & SLOT_DCOUNT_8;
                field |= ((count as u16) << SLOT_NUM_6_SHIFT) & SLOT_NUM_6;
            }
        }
        field
    }

    /// Decode a slot definition subfield; the duration is the cslot value in us
    pub fn decode(field: u16) -> Self {
        let (cslot, count) = if field & SLOT_DEF_FORMAT != 0 {
            (
                (field & SLOT_DCOUNT_11) >> SLOT_DCOUNT_SHIFT,
                (field & SLOT_NUM_3) >> SLOT_NUM_3_SHIFT,
            )
        } else {
            (
                (field & SLOT_DCOUNT_8) >> SLOT_DCOUNT_SHIFT,
                (field & SLOT_NUM_6) >> SLOT_NUM_6_SHIFT,
            )
        };

        Self {
            count: count as u8,
            duration_us: cslot_to_us(cslot),
            cross_slot_boundary: field & SLOT_CROSS_BOUNDARY != 0,
        }
    }

    /// The duration as it will be observed on the air
    pub fn quantized_duration_us(&self) -> u32 {
        let cslot = us_to_cslot(self.duration_us.max(MIN_SLOT_DURATION_US));
        cslot_to_us(cslot.min(self.format().max_cslot() as u32) as u16)
    }
}
