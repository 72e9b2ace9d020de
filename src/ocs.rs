//! Off-channel scan (OCS) assignment
//!
//! While the access point scans another channel it protects the scanning
//! period with an internal single-station RAW. The assignment uses a reserved
//! id that management commands cannot touch.

use crate::context::RawContext;
use crate::slot::SlotDefinition;
use crate::window::WindowConfig;
use crate::{Result, INTERNAL_ID_OFFSET};

/// Id of the internal OCS assignment
pub const OCS_RAW_ID: u16 = INTERNAL_ID_OFFSET + 1;

/// Slot duration of the OCS assignment
pub const OCS_SLOT_DURATION_US: u32 = 32_767;

/// Install the OCS assignment for `aid`.
///
/// The assignment is (re)initialized when it does not exist yet or covers a
/// different station, then activated. RAW is enabled if needed. Returns true
/// if a regeneration pass is needed.
pub fn install(ctx: &mut RawContext, aid: u16) -> Result<bool> {
    let config = ctx.store_mut().create_or_find(OCS_RAW_ID)?;

    if config.slot.duration_us != OCS_SLOT_DURATION_US || config.start_aid != aid {
        *config = WindowConfig::generic(OCS_RAW_ID, aid, aid, SlotDefinition::new(1, OCS_SLOT_DURATION_US, false));
        log::debug!("OCS RAW initialized for AID {}", aid);
    }

    ctx.store_mut().activate(OCS_RAW_ID)?;
    if !ctx.is_enabled() {
        ctx.enable();
    }
    Ok(ctx.trigger_update(false))
}

/// Deactivate the OCS assignment. Returns true if a regeneration pass is needed.
pub fn remove(ctx: &mut RawContext) -> bool {
    ctx.store_mut().deactivate(OCS_RAW_ID);
    ctx.trigger_update(false)
}

/// Check if the OCS assignment is active
pub fn is_active(ctx: &RawContext) -> bool {
    ctx.store().active_plain().contains(&OCS_RAW_ID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandFlags, RawCommand};
    use crate::context::{InterfaceKind, RawOptions};
    use crate::rps::RpsIe;
    use crate::RawError;

    fn context() -> RawContext {
        RawContext::new(InterfaceKind::AccessPoint, RawOptions::default()).unwrap()
    }

    #[test]
    fn test_install_enables_raw() {
        let mut ctx = context();
        assert!(!ctx.is_enabled());
        assert!(install(&mut ctx, 7).unwrap());
        assert!(ctx.is_enabled());
        assert!(is_active(&ctx));

        ctx.regenerate().unwrap();
        let ie = RpsIe::parse(ctx.rps_ie()).unwrap();
        assert_eq!(ie.assignments[0].group, Some((7, 7)));
        assert_eq!(ie.assignments[0].slot.count, 1);
    }

    #[test]
    fn test_remove() {
        let mut ctx = context();
        install(&mut ctx, 3).unwrap();
        ctx.regenerate().unwrap();
        assert!(remove(&mut ctx));
        assert!(!is_active(&ctx));
        ctx.regenerate().unwrap();
        assert_eq!(ctx.rps_ie_len(), 0);
        // The config stays stored for the next scan
        assert!(ctx.store().find(OCS_RAW_ID).is_some());
    }

    #[test]
    fn test_reinstall_other_station() {
        let mut ctx = context();
        install(&mut ctx, 3).unwrap();
        install(&mut ctx, 9).unwrap();
        let cfg = ctx.store().find(OCS_RAW_ID).unwrap();
        assert_eq!((cfg.start_aid, cfg.end_aid), (9, 9));
        assert_eq!(ctx.store().active_plain(), &[OCS_RAW_ID]);
    }

    #[test]
    fn test_commands_cannot_touch_internal_id() {
        let mut ctx = context();
        install(&mut ctx, 3).unwrap();
        let cmd = RawCommand::new(OCS_RAW_ID, CommandFlags::DELETE);
        assert!(matches!(ctx.process_command(&cmd), Err(RawError::PermissionDenied(_))));
        assert!(is_active(&ctx));
    }
}
