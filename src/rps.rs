//! RAW Parameter Set (RPS) element
//!
//! The RPS element payload is a plain concatenation of RAW assignments. Each
//! assignment starts with a control byte and the slot definition, followed by
//! the optional subfields announced by the control byte:
//!
//! ```text
//! raw_control (1) | slot_definition (2) | [start time (1)] | [group (3)]
//!     | [channel (2)] | [periodic (3)]
//! ```
//!
//! The element is built in two passes. The first pass computes the exact
//! payload size from the selected configs and the second writes into a buffer
//! of that size; any disagreement between the two is a logic fault.

use serde::{Deserialize, Serialize};
use crate::aid::AidList;
use crate::slot::SlotDefinition;
use crate::spread;
use crate::store::ConfigStore;
use crate::window::{WindowConfig, WindowKind};
use crate::wire::{WireBuffer, MAX_ELEMENT_LEN};
use crate::{RawError, Result};

pub const RAW_CONTROL_TYPE: u8 = 0x03;
pub const RAW_CONTROL_TYPE_OPTION: u8 = 0x0c;
pub const RAW_CONTROL_START_IND: u8 = 1 << 4;
pub const RAW_CONTROL_GROUP_IND: u8 = 1 << 5;
pub const RAW_CONTROL_CHANNEL_IND: u8 = 1 << 6;
pub const RAW_CONTROL_PERIODIC_IND: u8 = 1 << 7;

const ASSIGNMENT_HEADER_LEN: usize = 3;
const START_TIME_LEN: usize = 1;
const GROUP_LEN: usize = 3;
const CHANNEL_LEN: usize = 2;
const PERIODIC_LEN: usize = 3;

const GROUP_PAGE: u32 = 0x03;
const GROUP_START_AID_SHIFT: u32 = 2;
const GROUP_END_AID_SHIFT: u32 = 13;
const GROUP_AID_MASK: u32 = 0x07ff;

/// Microseconds in one start time unit (2 TU)
pub const START_TIME_UNIT_US: u32 = 2 * 1024;

/// Convert microseconds to the 2 TU start time unit
pub fn us_to_two_tu(us: u32) -> u8 {
    let units = us / START_TIME_UNIT_US;
    if units > u8::MAX as u32 {
        log::warn!("RAW start time {}us too large, capping", us);
        u8::MAX
    } else {
        units as u8
    }
}

/// Periodic subfield of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicField {
    pub periodicity: u8,
    /// Remaining validity
    pub validity: u8,
    /// Beacons until the next occurrence
    pub start_offset: u8,
}

/// A single RAW assignment as carried in the RPS element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAssignment {
    pub kind: WindowKind,
    pub slot: SlotDefinition,
    /// Start time in 2 TU units
    pub start_time_2tu: Option<u8>,
    /// Inclusive AID range
    pub group: Option<(u16, u16)>,
    /// Channel activity bitmap and max transmission width, never generated
    pub channel: Option<u16>,
    pub periodic: Option<PeriodicField>,
}

impl RawAssignment {
    /// Assignment for `config` covering the AID range `start_aid..=end_aid`
    pub fn from_config(config: &WindowConfig, start_aid: u16, end_aid: u16) -> Self {
        Self {
            kind: config.kind,
            slot: config.slot,
            start_time_2tu: (config.start_time_us != 0).then(|| us_to_two_tu(config.start_time_us)),
            group: Some((start_aid, end_aid)),
            channel: None,
            periodic: config.periodic.map(|p| PeriodicField {
                periodicity: p.periodicity,
                validity: p.cur_validity,
                start_offset: p.cur_start_offset,
            }),
        }
    }

    /// Serialized size
    pub fn len(&self) -> usize {
        ASSIGNMENT_HEADER_LEN
            + self.start_time_2tu.map_or(0, |_| START_TIME_LEN)
            + self.group.map_or(0, |_| GROUP_LEN)
            + self.channel.map_or(0, |_| CHANNEL_LEN)
            + self.periodic.map_or(0, |_| PERIODIC_LEN)
    }

    fn raw_control(&self) -> u8 {
        let mut control = self.kind.to_u8() & RAW_CONTROL_TYPE;
        if self.start_time_2tu.is_some() {
            control |= RAW_CONTROL_START_IND;
        }
        if self.group.is_some() {
            control |= RAW_CONTROL_GROUP_IND;
        }
        if self.channel.is_some() {
            control |= RAW_CONTROL_CHANNEL_IND;
        }
        if self.periodic.is_some() {
            control |= RAW_CONTROL_PERIODIC_IND;
        }
        control
    }

    /// Serialize assignment to buffer
    pub fn serialize(&self, buf: &mut WireBuffer) -> Result<()> {
        buf.write_u8(self.raw_control())?;
        buf.write_u16_le(self.slot.encode())?;

        if let Some(start_time) = self.start_time_2tu {
            buf.write_u8(start_time)?;
        }

        if let Some((start_aid, end_aid)) = self.group {
            // Pages are not used, always page 0
            let group = ((start_aid as u32 & GROUP_AID_MASK) << GROUP_START_AID_SHIFT)
                | ((end_aid as u32 & GROUP_AID_MASK) << GROUP_END_AID_SHIFT);
            buf.write_u24_le(group)?;
        }

        if let Some(channel) = self.channel {
            buf.write_u16_le(channel)?;
        }

        if let Some(periodic) = self.periodic {
            buf.write_u8(periodic.periodicity)?;
            buf.write_u8(periodic.validity)?;
            buf.write_u8(periodic.start_offset)?;
        }
        Ok(())
    }

    /// Parse assignment from buffer
    pub fn parse(buf: &mut WireBuffer) -> Result<Self> {
        let control = buf.read_u8()?;
        let slot = SlotDefinition::decode(buf.read_u16_le()?);
        let kind = WindowKind::from_u8(control & RAW_CONTROL_TYPE)?;

        let start_time_2tu = if control & RAW_CONTROL_START_IND != 0 {
            Some(buf.read_u8()?)
        } else {
            None
        };

        let group = if control & RAW_CONTROL_GROUP_IND != 0 {
            let field = buf.read_u24_le()?;
            if field & GROUP_PAGE != 0 {
                log::debug!("RAW group uses page {}", field & GROUP_PAGE);
            }
            Some((
                ((field >> GROUP_START_AID_SHIFT) & GROUP_AID_MASK) as u16,
                ((field >> GROUP_END_AID_SHIFT) & GROUP_AID_MASK) as u16,
            ))
        } else {
            None
        };

        let channel = if control & RAW_CONTROL_CHANNEL_IND != 0 {
            Some(buf.read_u16_le()?)
        } else {
            None
        };

        let periodic = if control & RAW_CONTROL_PERIODIC_IND != 0 {
            Some(PeriodicField {
                periodicity: buf.read_u8()?,
                validity: buf.read_u8()?,
                start_offset: buf.read_u8()?,
            })
        } else {
            None
        };

        Ok(Self {
            kind,
            slot,
            start_time_2tu,
            group,
            channel,
            periodic,
        })
    }
}

/// Size of the assignment generated for `config`
pub fn assignment_len(config: &WindowConfig) -> usize {
    ASSIGNMENT_HEADER_LEN
        + if config.start_time_us != 0 { START_TIME_LEN } else { 0 }
        + GROUP_LEN
        + if config.is_periodic() { PERIODIC_LEN } else { 0 }
}

/// Size of the RPS payload for the selected configs
pub fn element_len<'a>(configs: impl IntoIterator<Item = &'a WindowConfig>) -> Result<usize> {
    configs.into_iter().try_fold(0usize, |size, config| {
        if !config.kind.is_supported() {
            return Err(RawError::Unsupported(format!(
                "RAW {} has type {:?}",
                config.id, config.kind
            )));
        }
        Ok(size + assignment_len(config))
    })
}

/// Build the RPS payload for the selected config ids, in order.
///
/// Advances the beacon spreading state of each selected config.
pub fn build(store: &mut ConfigStore, selection: &[u16], aids: &AidList) -> Result<Vec<u8>> {
    if selection.is_empty() {
        return Ok(Vec::new());
    }

    let configs = selection
        .iter()
        .map(|&id| {
            store
                .find(id)
                .ok_or_else(|| RawError::InternalInconsistency(format!("selected RAW {} not stored", id)))
        })
        .collect::<Result<Vec<_>>>()?;
    let size = element_len(configs)?;

    log::debug!("Number of RAWs: {}", selection.len());
    log::debug!("RPS IE size: {}", size);
    if size > MAX_ELEMENT_LEN {
        log::warn!("RPS IE size {} exceeds element limit of {}", size, MAX_ELEMENT_LEN);
    }

    let mut buf = WireBuffer::with_capacity(size)?;
    for &id in selection {
        let config = store
            .find_mut(id)
            .ok_or_else(|| RawError::InternalInconsistency(format!("selected RAW {} not stored", id)))?;
        let (start_aid, end_aid) = spread::beacon_aid_range(config, aids);
        RawAssignment::from_config(config, start_aid, end_aid).serialize(&mut buf)?;
    }

    if !buf.is_full() {
        return Err(RawError::InternalInconsistency(format!(
            "RPS IE written {} bytes, expected {}",
            buf.position(),
            size
        )));
    }
    Ok(buf.into_vec())
}

/// A decoded RPS element payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpsIe {
    pub assignments: Vec<RawAssignment>,
}

impl RpsIe {
    /// Parse an RPS element payload (without element header)
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = WireBuffer::from_data(payload);
        let mut assignments = Vec::new();
        while buf.available() > 0 {
            assignments.push(RawAssignment::parse(&mut buf)?);
        }
        Ok(Self { assignments })
    }

    /// Serialize all assignments
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let size = self.assignments.iter().map(|a| a.len()).sum();
        let mut buf = WireBuffer::with_capacity(size)?;
        for assignment in &self.assignments {
            assignment.serialize(&mut buf)?;
        }
        Ok(buf.into_vec())
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
