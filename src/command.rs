//! RAW configuration commands
//!
//! Commands arrive from the management plane as a small header followed by a
//! sequence of tagged, fixed size fields. Every field is little-endian.
//!
//! ```text
//! u16 id | u8 flags | u16 body_len | body: (u8 tag, payload)*
//! ```

use bitflags::bitflags;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use crate::slot::SlotDefinition;
use crate::window::{BeaconSpreading, PeriodicParams, WindowConfig, WindowKind};
use crate::{RawError, Result};

/// Size of the command header
pub const COMMAND_HEADER_LEN: usize = 5;

bitflags! {
    /// Command flag bits
    #[derive(Default, Serialize, Deserialize)]
    pub struct CommandFlags: u8 {
        /// Activate the config (or the engine for id 0)
        const ENABLE = 1 << 0;
        /// Delete the config (or every config for id 0)
        const DELETE = 1 << 1;
        /// Create or update the config from the command body
        const UPDATE = 1 << 2;
    }
}

/// Command field tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandTag {
    SlotDef = 0,
    Group = 1,
    StartTime = 2,
    Praw = 3,
    BeaconSpread = 4,
    Kind = 5,
}

impl TryFrom<u8> for CommandTag {
    type Error = RawError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::SlotDef),
            1 => Ok(Self::Group),
            2 => Ok(Self::StartTime),
            3 => Ok(Self::Praw),
            4 => Ok(Self::BeaconSpread),
            5 => Ok(Self::Kind),
            other => Err(RawError::InvalidArgument(format!("Unknown RAW command tag {}", other))),
        }
    }
}

impl CommandTag {
    /// Length of the payload following the tag
    pub fn payload_len(&self) -> usize {
        match self {
            CommandTag::SlotDef => 6,
            CommandTag::Group | CommandTag::StartTime | CommandTag::Praw | CommandTag::BeaconSpread => 4,
            CommandTag::Kind => 1,
        }
    }
}

/// A single tagged command field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandTlv {
    SlotDef {
        raw_duration_us: u32,
        num_slots: u8,
        cross_slot_boundary: bool,
    },
    Group {
        start_aid: u16,
        end_aid: u16,
    },
    StartTime {
        start_time_us: u32,
    },
    Praw {
        periodicity: u8,
        validity: u8,
        start_offset: u8,
        refresh_on_expiry: bool,
    },
    BeaconSpread {
        max_spread: u16,
        nominal_stations_per_beacon: u16,
    },
    Kind(u8),
}

impl CommandTlv {
    pub fn tag(&self) -> CommandTag {
        match self {
            CommandTlv::SlotDef { .. } => CommandTag::SlotDef,
            CommandTlv::Group { .. } => CommandTag::Group,
            CommandTlv::StartTime { .. } => CommandTag::StartTime,
            CommandTlv::Praw { .. } => CommandTag::Praw,
            CommandTlv::BeaconSpread { .. } => CommandTag::BeaconSpread,
            CommandTlv::Kind(_) => CommandTag::Kind,
        }
    }

    /// Parse one field from buffer
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(RawError::InvalidArgument("Missing RAW command tag".to_string()));
        }
        let tag = CommandTag::try_from(buf.get_u8())?;
        if buf.remaining() < tag.payload_len() {
            return Err(RawError::InvalidArgument(format!(
                "Truncated RAW command field {:?}: {} of {} bytes",
                tag,
                buf.remaining(),
                tag.payload_len()
            )));
        }

        let tlv = match tag {
            CommandTag::SlotDef => CommandTlv::SlotDef {
                raw_duration_us: buf.get_u32_le(),
                num_slots: buf.get_u8(),
                cross_slot_boundary: buf.get_u8() != 0,
            },
            CommandTag::Group => CommandTlv::Group {
                start_aid: buf.get_u16_le(),
                end_aid: buf.get_u16_le(),
            },
            CommandTag::StartTime => CommandTlv::StartTime {
                start_time_us: buf.get_u32_le(),
            },
            CommandTag::Praw => CommandTlv::Praw {
                periodicity: buf.get_u8(),
                validity: buf.get_u8(),
                start_offset: buf.get_u8(),
                refresh_on_expiry: buf.get_u8() != 0,
            },
            CommandTag::BeaconSpread => CommandTlv::BeaconSpread {
                max_spread: buf.get_u16_le(),
                nominal_stations_per_beacon: buf.get_u16_le(),
            },
            CommandTag::Kind => CommandTlv::Kind(buf.get_u8()),
        };
        Ok(tlv)
    }

    /// Serialize field to buffer
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.tag() as u8);
        match *self {
            CommandTlv::SlotDef {
                raw_duration_us,
                num_slots,
                cross_slot_boundary,
            } => {
                buf.put_u32_le(raw_duration_us);
                buf.put_u8(num_slots);
                buf.put_u8(cross_slot_boundary as u8);
            }
            CommandTlv::Group { start_aid, end_aid } => {
                buf.put_u16_le(start_aid);
                buf.put_u16_le(end_aid);
            }
            CommandTlv::StartTime { start_time_us } => buf.put_u32_le(start_time_us),
            CommandTlv::Praw {
                periodicity,
                validity,
                start_offset,
                refresh_on_expiry,
            } => {
                buf.put_u8(periodicity);
                buf.put_u8(validity);
                buf.put_u8(start_offset);
                buf.put_u8(refresh_on_expiry as u8);
            }
            CommandTlv::BeaconSpread {
                max_spread,
                nominal_stations_per_beacon,
            } => {
                buf.put_u16_le(max_spread);
                buf.put_u16_le(nominal_stations_per_beacon);
            }
            CommandTlv::Kind(kind) => buf.put_u8(kind),
        }
    }

    /// Serialized size including the tag
    pub fn size(&self) -> usize {
        1 + self.tag().payload_len()
    }

    /// Patch this field onto a config
    fn apply(&self, config: &mut WindowConfig) -> Result<()> {
        match *self {
            CommandTlv::SlotDef {
                raw_duration_us,
                num_slots,
                cross_slot_boundary,
            } => {
                if num_slots == 0 {
                    return Err(RawError::InvalidArgument("RAW with zero slots".to_string()));
                }
                config.slot =
                    SlotDefinition::new(num_slots, raw_duration_us / num_slots as u32, cross_slot_boundary);
            }
            CommandTlv::Group { start_aid, end_aid } => {
                config.start_aid = start_aid;
                config.end_aid = end_aid;
                config.invalidate_indices();
            }
            CommandTlv::StartTime { start_time_us } => config.start_time_us = start_time_us,
            CommandTlv::Praw {
                periodicity,
                validity,
                start_offset,
                refresh_on_expiry,
            } => {
                config.periodic = (periodicity > 0)
                    .then(|| PeriodicParams::new(periodicity, validity, start_offset, refresh_on_expiry));
            }
            CommandTlv::BeaconSpread {
                max_spread,
                nominal_stations_per_beacon,
            } => {
                config.beacon_spreading = Some(BeaconSpreading::new(max_spread, nominal_stations_per_beacon));
            }
            CommandTlv::Kind(kind) => {
                let kind = WindowKind::from_u8(kind)?;
                if !kind.is_supported() {
                    return Err(RawError::InvalidArgument(format!("RAW type {:?} not supported", kind)));
                }
                config.kind = kind;
            }
        }
        Ok(())
    }
}

/// A complete RAW configuration command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommand {
    /// Config id, 0 addresses the engine itself
    pub id: u16,
    pub flags: CommandFlags,
    pub tlvs: Vec<CommandTlv>,
}

impl RawCommand {
    pub fn new(id: u16, flags: CommandFlags) -> Self {
        Self {
            id,
            flags,
            tlvs: Vec::new(),
        }
    }

    pub fn with_tlv(mut self, tlv: CommandTlv) -> Self {
        self.tlvs.push(tlv);
        self
    }

    pub fn enable(&self) -> bool {
        self.flags.contains(CommandFlags::ENABLE)
    }

    pub fn delete(&self) -> bool {
        self.flags.contains(CommandFlags::DELETE)
    }

    pub fn update(&self) -> bool {
        self.flags.contains(CommandFlags::UPDATE)
    }

    /// Parse a command. The whole command is rejected if any field is unknown
    /// or truncated.
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < COMMAND_HEADER_LEN {
            return Err(RawError::InvalidArgument("Insufficient data for RAW command header".to_string()));
        }

        let id = buf.get_u16_le();
        // Undefined flag bits are ignored
        let flags = CommandFlags::from_bits_truncate(buf.get_u8());
        let body_len = buf.get_u16_le() as usize;
        if buf.remaining() < body_len {
            return Err(RawError::InvalidArgument(format!(
                "RAW command body truncated: {} of {} bytes",
                buf.remaining(),
                body_len
            )));
        }

        let mut body = buf.take(body_len);
        let mut tlvs = Vec::new();
        while body.has_remaining() {
            tlvs.push(CommandTlv::parse(&mut body)?);
        }

        Ok(Self { id, flags, tlvs })
    }

    /// Parse a command from a byte slice
    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        Self::parse(&mut data)
    }

    /// Serialize command to buffer
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.id);
        buf.put_u8(self.flags.bits());
        buf.put_u16_le(self.body_len() as u16);
        for tlv in &self.tlvs {
            tlv.serialize(buf);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMAND_HEADER_LEN + self.body_len());
        self.serialize(&mut out);
        out
    }

    fn body_len(&self) -> usize {
        self.tlvs.iter().map(|tlv| tlv.size()).sum()
    }

    /// Produce the updated version of `config`. Nothing is modified if any
    /// field is rejected.
    pub fn apply_to(&self, config: &WindowConfig) -> Result<WindowConfig> {
        let mut updated = config.clone();
        updated.kind = WindowKind::Generic;
        for tlv in &self.tlvs {
            tlv.apply(&mut updated)?;
        }
        Ok(updated)
    }
}
