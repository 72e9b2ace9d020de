//! Per-interface RAW context
//!
//! [`RawContext`] owns every RAW config of an access point interface together
//! with the station membership, the generated RPS payload and the pending work
//! that the next regeneration pass has to consume. It is a plain synchronous
//! state machine; serialization of passes is the job of the dispatcher in
//! [`crate::daemon`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aid::{AidBitmap, AidList};
use crate::command::RawCommand;
use crate::periodic;
use crate::ratelimit::RateLimiter;
use crate::rps;
use crate::store::ConfigStore;
use crate::window::WindowConfig;
use crate::{RawError, Result, DEFAULT_MAX_ASSIGNMENTS, INTERNAL_ID_OFFSET, RAW_DTIMS_FOR_PRAW_TX, RAW_META_ID};

/// Type of the network interface a context is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    #[default]
    AccessPoint,
    Station,
    Mesh,
    Monitor,
}

/// Work requested for the next regeneration pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingWork {
    /// Station membership changed, the AID list must be regenerated
    RefreshAids,
    /// A beacon was transmitted, PRAW countdowns must advance
    BeaconSent,
    /// The engine was enabled or disabled
    EnabledChanged,
}

/// Engine options for one context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOptions {
    /// Enable RAW when the context is created
    pub enabled: bool,
    /// DTIM period of the interface in beacons
    pub dtim_period: u8,
    /// PRAWs are retransmitted for this many DTIM periods after a change
    pub praw_dtims_for_tx: u16,
    /// Maximum assignments in one RPS element
    pub max_assignments: usize,
    /// Rate limit window for repeated warnings
    pub warn_interval: Duration,
    /// Warnings allowed per window
    pub warn_burst: u32,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            dtim_period: 1,
            praw_dtims_for_tx: RAW_DTIMS_FOR_PRAW_TX,
            max_assignments: DEFAULT_MAX_ASSIGNMENTS,
            warn_interval: crate::ratelimit::DEFAULT_WARN_INTERVAL,
            warn_burst: crate::ratelimit::DEFAULT_WARN_BURST,
        }
    }
}

/// Counters describing the work done by a context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStats {
    /// Completed regeneration passes
    pub regenerations: u64,
    /// Beacon-sent notifications consumed
    pub beacons_processed: u64,
    /// Assignments left out because the element was full
    pub dropped_assignments: u64,
    /// PRAWs deactivated on expiry
    pub expired_praws: u64,
    /// Time of the last completed pass
    pub last_regeneration: Option<DateTime<Utc>>,
}

/// RAW state of one access point interface
#[derive(Debug)]
pub struct RawContext {
    options: RawOptions,
    store: ConfigStore,
    stations: AidBitmap,
    aid_list: Option<Arc<AidList>>,
    rps_ie: Vec<u8>,
    praw_tx_count: u16,
    pending: HashSet<PendingWork>,
    enabled: bool,
    update_every_beacon: bool,
    warn_limiter: RateLimiter,
    stats: RawStats,
}

impl RawContext {
    /// Create the RAW context of an interface. Only access points support RAW.
    pub fn new(kind: InterfaceKind, options: RawOptions) -> Result<Self> {
        if kind != InterfaceKind::AccessPoint {
            log::info!("RAW not supported on {:?} interfaces", kind);
            return Err(RawError::Unsupported(format!("RAW on {:?} interface", kind)));
        }
        if options.max_assignments == 0 {
            return Err(RawError::InvalidArgument("max_assignments must be at least 1".to_string()));
        }

        let enabled = options.enabled;
        let mut ctx = Self {
            warn_limiter: RateLimiter::new(options.warn_interval, options.warn_burst),
            options,
            store: ConfigStore::new(),
            stations: AidBitmap::new(),
            aid_list: None,
            rps_ie: Vec::new(),
            praw_tx_count: 0,
            pending: HashSet::new(),
            enabled: false,
            update_every_beacon: false,
            stats: RawStats::default(),
        };
        if enabled {
            ctx.enable();
        }
        log::info!("RAW {}", if enabled { "enabled" } else { "disabled" });
        Ok(ctx)
    }

    /// Enable the engine
    pub fn enable(&mut self) {
        if !self.enabled {
            self.enabled = true;
            self.pending.insert(PendingWork::EnabledChanged);
        }
    }

    /// Disable the engine. The element is cleared by the next pass.
    pub fn disable(&mut self) {
        if self.enabled {
            self.enabled = false;
            self.pending.insert(PendingWork::EnabledChanged);
        }
    }

    /// Apply a configuration command.
    ///
    /// Whatever the outcome, the per-beacon update mode is recomputed and a
    /// regeneration is requested afterwards.
    pub fn process_command(&mut self, cmd: &RawCommand) -> Result<()> {
        log::debug!("RAW command: {} {:#x}", cmd.id, cmd.flags.bits());

        let result = self.apply_command(cmd);
        if let Err(e) = &result {
            log::warn!("RAW command {} failed: {}", cmd.id, e);
        }

        if !self.store.active_periodic().is_empty() {
            // Config changes require PRAWs to be retransmitted
            self.start_praw_transmission(true);
            self.update_every_beacon = true;
        } else {
            self.update_every_beacon = self.any_plain_spreading();
        }

        self.trigger_update(false);
        result
    }

    fn apply_command(&mut self, cmd: &RawCommand) -> Result<()> {
        if cmd.id >= INTERNAL_ID_OFFSET {
            return Err(RawError::PermissionDenied(cmd.id));
        }

        let mut enable = cmd.enable();

        if cmd.id == RAW_META_ID {
            if enable {
                self.enable();
            } else {
                self.disable();
            }
            if cmd.delete() {
                log::info!("Deleting all RAW configs");
                self.store.delete_all();
            }
            return Ok(());
        }

        let mut result = Ok(());
        if cmd.update() {
            let current = match self.store.find(cmd.id) {
                Some(cfg) => cfg.clone(),
                None => WindowConfig::new(cmd.id),
            };
            let updated = cmd.apply_to(&current)?;
            if !updated.is_valid() {
                // Invalid configs may be stored as long as they stay inactive
                if enable {
                    result = Err(RawError::InvalidArgument(format!("RAW {} configuration incomplete", cmd.id)));
                }
                enable = false;
            }
            self.store.replace(updated)?;
        } else {
            if self.store.find(cmd.id).is_none() {
                if enable {
                    log::warn!("Trying to enable RAW {} without configuration", cmd.id);
                    return Err(RawError::NotFound(cmd.id));
                }
                return Ok(());
            }
            if cmd.delete() {
                self.store.delete(cmd.id);
                return Ok(());
            }
        }

        if enable {
            self.store.activate(cmd.id)?;
            self.resolve_spreading_indices(cmd.id);
        } else {
            self.store.deactivate(cmd.id);
        }
        result
    }

    /// Resolve the AID indices of a newly activated or updated spreading
    /// config against the current AID list. Without a list the pending
    /// refresh resolves them.
    fn resolve_spreading_indices(&mut self, id: u16) {
        let Some(aid_list) = self.aid_list.clone() else {
            return;
        };
        if let Some(cfg) = self.store.find_mut(id) {
            resolve_config_indices(cfg, &aid_list);
        }
    }

    fn any_plain_spreading(&self) -> bool {
        self.store
            .active_plain()
            .iter()
            .filter_map(|&id| self.store.find(id))
            .any(|cfg| cfg.uses_beacon_spreading())
    }

    /// Restart the PRAW retransmission burst. On configuration changes every
    /// active PRAW is realigned to its start offset.
    fn start_praw_transmission(&mut self, new_config: bool) {
        if new_config {
            periodic::realign_offsets(&mut self.store);
        }
        self.praw_tx_count = (self.options.dtim_period as u16).saturating_mul(self.options.praw_dtims_for_tx);
    }

    /// Record a station association
    pub fn station_associated(&mut self, aid: u16) -> Result<bool> {
        let changed = self.stations.insert(aid)?;
        Ok(changed && self.membership_changed())
    }

    /// Record a station disassociation
    pub fn station_disassociated(&mut self, aid: u16) -> Result<bool> {
        let changed = self.stations.remove(aid)?;
        Ok(changed && self.membership_changed())
    }

    /// The AID list is rebuilt on the first enabled pass after any change,
    /// including changes made while the engine is disabled.
    fn membership_changed(&mut self) -> bool {
        self.pending.insert(PendingWork::RefreshAids);
        self.trigger_update(true)
    }

    /// Record that a beacon was transmitted. Returns true if a pass is needed.
    pub fn notify_beacon_sent(&mut self) -> bool {
        if !(self.enabled && self.update_every_beacon) {
            return false;
        }
        if !self.pending.insert(PendingWork::BeaconSent) && self.warn_limiter.allow() {
            // The previous beacon was not consumed in time, PRAW validity drifts
            log::warn!("Beacon sent before the previous RAW update completed");
        }
        true
    }

    /// Request a regeneration pass. Returns true if a pass is needed.
    pub fn trigger_update(&mut self, refresh_aids: bool) -> bool {
        if !self.enabled {
            return self.pending.contains(&PendingWork::EnabledChanged);
        }
        if self.aid_list.is_none() || refresh_aids {
            self.pending.insert(PendingWork::RefreshAids);
        }
        true
    }

    fn refresh_aids(&mut self) -> Result<()> {
        let aid_list = Arc::new(AidList::from_bitmap(&self.stations)?);

        let ids: Vec<u16> = self.store.active_plain().to_vec();
        for id in ids {
            if let Some(cfg) = self.store.find_mut(id) {
                resolve_config_indices(cfg, &aid_list);
            }
        }
        self.aid_list = Some(aid_list);
        Ok(())
    }

    fn debug_dump_aid_indices(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let aids = self.aid_list();
        for id in self.store.active_ids() {
            let Some(cfg) = self.store.find(id) else {
                continue;
            };
            log::debug!("Final start/end AID indices ({}): {}, {}", id, cfg.start_aid_idx, cfg.end_aid_idx);
            if cfg.has_resolved_indices() {
                if let (Some(start), Some(end)) = (
                    aids.get(cfg.start_aid_idx as usize),
                    aids.get(cfg.end_aid_idx as usize),
                ) {
                    log::debug!("Final start/end AID values ({}): {}, {}", id, start, end);
                }
            }
        }
    }

    /// Ordered selection of config ids for the next element
    fn select(&mut self, mut include_praws: bool) -> Vec<u16> {
        let capacity = self.options.max_assignments;
        let mut selection = Vec::with_capacity(capacity.min(self.store.len()));
        let mut dropped = Vec::new();

        for &id in self.store.active_plain().iter().rev() {
            if selection.len() >= capacity {
                dropped.push(id);
                continue;
            }
            selection.push(id);
            // Regular RAWs are always accompanied by the PRAWs
            include_praws = true;
        }

        if include_praws {
            for &id in self.store.active_periodic().iter().rev() {
                if selection.len() >= capacity {
                    dropped.push(id);
                    continue;
                }
                selection.push(id);
            }
        }

        for id in dropped {
            self.stats.dropped_assignments += 1;
            if self.warn_limiter.allow() {
                log::warn!("Too many active RAW assignments, ID {} not included", id);
            }
        }
        selection
    }

    /// Run one regeneration pass, consuming the pending work.
    ///
    /// On failure the element is left empty.
    pub fn regenerate(&mut self) -> Result<()> {
        self.pending.remove(&PendingWork::EnabledChanged);

        if !self.enabled {
            // Membership changes are kept for the next enabled pass
            self.pending.retain(|work| *work == PendingWork::RefreshAids);
            self.rps_ie.clear();
            self.finish_pass();
            return Ok(());
        }

        if self.pending.remove(&PendingWork::RefreshAids) {
            if let Err(e) = self.refresh_aids() {
                self.rps_ie.clear();
                return Err(e);
            }
            self.debug_dump_aid_indices();
            // Newly associated stations must learn about the PRAWs
            self.start_praw_transmission(false);
        }

        let mut include_praws = false;
        if self.pending.remove(&PendingWork::BeaconSent) {
            self.stats.beacons_processed += 1;
            let outcome = periodic::advance_active(&mut self.store);
            self.stats.expired_praws += outcome.expired.len() as u64;
            if outcome.restart_burst {
                self.start_praw_transmission(false);
            }

            // Keep including PRAWs while retransmitting them after an update
            if self.praw_tx_count > 0 {
                include_praws = true;
                self.praw_tx_count -= 1;
            }
        }

        self.update_every_beacon = !self.store.active_periodic().is_empty() || self.any_plain_spreading();

        let selection = self.select(include_praws);
        let aids = self.aid_list();
        match rps::build(&mut self.store, &selection, &aids) {
            Ok(payload) => self.rps_ie = payload,
            Err(e) => {
                self.rps_ie.clear();
                return Err(e);
            }
        }
        self.finish_pass();
        Ok(())
    }

    fn finish_pass(&mut self) {
        self.stats.regenerations += 1;
        self.stats.last_regeneration = Some(Utc::now());
    }

    /// Tear the context down, freeing every config
    pub fn teardown(&mut self) {
        self.enabled = false;
        self.update_every_beacon = false;
        self.pending.clear();
        self.rps_ie.clear();
        self.store.delete_all();
    }

    /// Current RPS element payload
    pub fn rps_ie(&self) -> &[u8] {
        &self.rps_ie
    }

    pub fn rps_ie_len(&self) -> usize {
        self.rps_ie.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn update_every_beacon(&self) -> bool {
        self.update_every_beacon
    }

    pub fn praw_tx_count(&self) -> u16 {
        self.praw_tx_count
    }

    pub fn has_pending(&self, work: PendingWork) -> bool {
        self.pending.contains(&work)
    }

    pub fn stats(&self) -> RawStats {
        self.stats.clone()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }

    /// Snapshot of the AID list used by the last refresh
    pub fn aid_list(&self) -> Arc<AidList> {
        self.aid_list.clone().unwrap_or_default()
    }

    pub fn stations(&self) -> &AidBitmap {
        &self.stations
    }

    pub fn options(&self) -> &RawOptions {
        &self.options
    }

    pub fn set_dtim_period(&mut self, dtim_period: u8) {
        self.options.dtim_period = dtim_period.max(1);
    }
}

/// Only beacon spreading RAWs use AID indices
fn resolve_config_indices(cfg: &mut WindowConfig, aid_list: &AidList) {
    if cfg.uses_beacon_spreading() {
        let (start_idx, end_idx) = aid_list.resolve_indices(cfg.start_aid, cfg.end_aid);
        cfg.start_aid_idx = start_idx;
        cfg.end_aid_idx = end_idx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandFlags, CommandTlv};
    use crate::rps::RpsIe;
    use crate::store::Membership;

    fn enabled_context() -> RawContext {
        let options = RawOptions {
            enabled: true,
            ..RawOptions::default()
        };
        RawContext::new(InterfaceKind::AccessPoint, options).unwrap()
    }

    fn create_cmd(id: u16, start_aid: u16, end_aid: u16) -> RawCommand {
        RawCommand::new(id, CommandFlags::UPDATE | CommandFlags::ENABLE)
            .with_tlv(CommandTlv::SlotDef {
                raw_duration_us: 4000,
                num_slots: 4,
                cross_slot_boundary: false,
            })
            .with_tlv(CommandTlv::Group { start_aid, end_aid })
    }

    fn praw_cmd(id: u16, periodicity: u8, validity: u8, start_offset: u8) -> RawCommand {
        create_cmd(id, 1, 100).with_tlv(CommandTlv::Praw {
            periodicity,
            validity,
            start_offset,
            refresh_on_expiry: false,
        })
    }

    #[test]
    fn test_non_ap_rejected() {
        let result = RawContext::new(InterfaceKind::Station, RawOptions::default());
        assert!(matches!(result, Err(RawError::Unsupported(_))));
    }

    #[test]
    fn test_create_activate_beacon_scenario() {
        let mut ctx = enabled_context();
        ctx.process_command(&create_cmd(5, 10, 50)).unwrap();
        assert_eq!(ctx.store().membership(5), Membership::Plain);

        ctx.regenerate().unwrap();
        let ie = RpsIe::parse(ctx.rps_ie()).unwrap();
        assert_eq!(ie.len(), 1);
        assert_eq!(ie.assignments[0].group, Some((10, 50)));
        assert_eq!(ie.assignments[0].slot.count, 4);
        assert_eq!(ctx.rps_ie_len(), 6);
        assert_eq!(ctx.stats().regenerations, 1);
    }

    #[test]
    fn test_reserved_id() {
        let mut ctx = enabled_context();
        let result = ctx.process_command(&create_cmd(INTERNAL_ID_OFFSET + 3, 1, 2));
        assert!(matches!(result, Err(RawError::PermissionDenied(_))));
        assert!(ctx.store().is_empty());
    }

    #[test]
    fn test_enable_missing_config() {
        let mut ctx = enabled_context();
        let cmd = RawCommand::new(9, CommandFlags::ENABLE);
        assert!(matches!(ctx.process_command(&cmd), Err(RawError::NotFound(9))));
        // Disabling a missing config is not an error
        ctx.process_command(&RawCommand::new(9, CommandFlags::empty())).unwrap();
    }

    #[test]
    fn test_invalid_config_stored_inactive() {
        let mut ctx = enabled_context();
        let cmd = RawCommand::new(3, CommandFlags::UPDATE | CommandFlags::ENABLE)
            .with_tlv(CommandTlv::Group { start_aid: 1, end_aid: 5 });
        assert!(matches!(ctx.process_command(&cmd), Err(RawError::InvalidArgument(_))));
        assert!(ctx.store().find(3).is_some());
        assert_eq!(ctx.store().membership(3), Membership::Inactive);

        // Completing the config later activates it
        let cmd = RawCommand::new(3, CommandFlags::UPDATE | CommandFlags::ENABLE).with_tlv(CommandTlv::SlotDef {
            raw_duration_us: 1000,
            num_slots: 1,
            cross_slot_boundary: false,
        });
        ctx.process_command(&cmd).unwrap();
        assert_eq!(ctx.store().membership(3), Membership::Plain);
    }

    #[test]
    fn test_rejected_command_leaves_config() {
        let mut ctx = enabled_context();
        ctx.process_command(&create_cmd(2, 10, 20)).unwrap();
        let before = ctx.store().find(2).cloned();

        let bad = RawCommand::new(2, CommandFlags::UPDATE | CommandFlags::ENABLE)
            .with_tlv(CommandTlv::Group { start_aid: 30, end_aid: 40 })
            .with_tlv(CommandTlv::Kind(2));
        assert!(ctx.process_command(&bad).is_err());
        assert_eq!(ctx.store().find(2).cloned(), before);

        // A rejected command does not create the config either
        let bad = RawCommand::new(8, CommandFlags::UPDATE).with_tlv(CommandTlv::Kind(1));
        assert!(ctx.process_command(&bad).is_err());
        assert!(ctx.store().find(8).is_none());
    }

    #[test]
    fn test_delete() {
        let mut ctx = enabled_context();
        ctx.process_command(&create_cmd(1, 1, 10)).unwrap();
        ctx.process_command(&create_cmd(2, 11, 20)).unwrap();
        ctx.process_command(&RawCommand::new(1, CommandFlags::DELETE)).unwrap();
        assert!(ctx.store().find(1).is_none());

        ctx.process_command(&RawCommand::new(0, CommandFlags::ENABLE | CommandFlags::DELETE))
            .unwrap();
        assert!(ctx.store().is_empty());
        assert!(ctx.is_enabled());
    }

    #[test]
    fn test_disable_clears_element() {
        let mut ctx = enabled_context();
        ctx.process_command(&create_cmd(1, 1, 10)).unwrap();
        ctx.regenerate().unwrap();
        assert!(ctx.rps_ie_len() > 0);

        ctx.process_command(&RawCommand::new(0, CommandFlags::empty())).unwrap();
        assert!(!ctx.is_enabled());
        assert!(ctx.has_pending(PendingWork::EnabledChanged));
        ctx.regenerate().unwrap();
        assert_eq!(ctx.rps_ie_len(), 0);

        // Triggers are ignored while disabled
        assert!(!ctx.trigger_update(true));
        assert!(!ctx.notify_beacon_sent());
    }

    #[test]
    fn test_selection_order_and_capacity() {
        let options = RawOptions {
            enabled: true,
            max_assignments: 3,
            ..RawOptions::default()
        };
        let mut ctx = RawContext::new(InterfaceKind::AccessPoint, options).unwrap();
        for id in 1..=4 {
            ctx.process_command(&create_cmd(id, id * 10, id * 10 + 5)).unwrap();
        }
        ctx.regenerate().unwrap();

        let groups: Vec<_> = RpsIe::parse(ctx.rps_ie())
            .unwrap()
            .assignments
            .iter()
            .map(|a| a.group.unwrap().0)
            .collect();
        // Descending id order, lowest id dropped
        assert_eq!(groups, vec![40, 30, 20]);
        assert_eq!(ctx.stats().dropped_assignments, 1);
    }

    #[test]
    fn test_praw_only_burst() {
        let mut ctx = enabled_context();
        ctx.set_dtim_period(1);
        ctx.process_command(&praw_cmd(1, 4, 100, 0)).unwrap();
        assert!(ctx.update_every_beacon());
        assert_eq!(ctx.praw_tx_count(), 10);

        // Initial pass refreshes the AID list, which restarts the burst
        ctx.regenerate().unwrap();
        assert_eq!(ctx.rps_ie_len(), 0);

        for _ in 0..10 {
            assert!(ctx.notify_beacon_sent());
            ctx.regenerate().unwrap();
            assert_eq!(RpsIe::parse(ctx.rps_ie()).unwrap().len(), 1);
        }

        // Burst over, PRAW-only configurations are no longer advertised
        assert!(ctx.notify_beacon_sent());
        ctx.regenerate().unwrap();
        assert_eq!(ctx.rps_ie_len(), 0);
    }

    #[test]
    fn test_praw_with_plain_raw() {
        let mut ctx = enabled_context();
        ctx.process_command(&create_cmd(1, 1, 10)).unwrap();
        ctx.process_command(&praw_cmd(2, 4, 2, 0)).unwrap();
        ctx.regenerate().unwrap();

        let ie = RpsIe::parse(ctx.rps_ie()).unwrap();
        assert_eq!(ie.len(), 2);
        assert!(ie.assignments[0].periodic.is_none());
        assert!(ie.assignments[1].periodic.is_some());

        // PRAW (4, 2, 0) expires on the 8th beacon
        for beacon in 1..=8 {
            assert!(ctx.notify_beacon_sent(), "beacon {}", beacon);
            ctx.regenerate().unwrap();
            let expected = if beacon < 8 { Membership::Periodic } else { Membership::Inactive };
            assert_eq!(ctx.store().membership(2), expected, "beacon {}", beacon);
        }
        assert_eq!(RpsIe::parse(ctx.rps_ie()).unwrap().len(), 1);
        assert_eq!(ctx.stats().expired_praws, 1);
        assert!(!ctx.update_every_beacon());
    }

    #[test]
    fn test_new_config_realigns_praws() {
        let mut ctx = enabled_context();
        ctx.process_command(&praw_cmd(1, 5, 3, 2)).unwrap();
        ctx.regenerate().unwrap();
        ctx.notify_beacon_sent();
        ctx.regenerate().unwrap();
        assert_eq!(ctx.store().find(1).unwrap().periodic.unwrap().cur_start_offset, 1);

        ctx.process_command(&create_cmd(2, 1, 10)).unwrap();
        assert_eq!(ctx.store().find(1).unwrap().periodic.unwrap().cur_start_offset, 2);
    }

    #[test]
    fn test_beacon_spreading_follows_membership() {
        let mut ctx = enabled_context();
        for aid in 1..=10 {
            ctx.station_associated(aid).unwrap();
        }
        let cmd = create_cmd(1, 1, 10).with_tlv(CommandTlv::BeaconSpread {
            max_spread: 0,
            nominal_stations_per_beacon: 3,
        });
        ctx.process_command(&cmd).unwrap();
        assert!(ctx.update_every_beacon());

        let mut sizes = Vec::new();
        ctx.regenerate().unwrap();
        for _ in 0..4 {
            let (start, end) = RpsIe::parse(ctx.rps_ie()).unwrap().assignments[0].group.unwrap();
            sizes.push(end - start + 1);
            assert!(ctx.notify_beacon_sent());
            ctx.regenerate().unwrap();
        }
        assert_eq!(sizes, vec![3, 3, 2, 2]);

        // Departure of a station is picked up by the next pass
        assert!(ctx.station_disassociated(10).unwrap());
        assert!(ctx.has_pending(PendingWork::RefreshAids));
        ctx.regenerate().unwrap();
        assert_eq!(ctx.aid_list().len(), 9);
        assert_eq!(ctx.store().find(1).unwrap().end_aid_idx, 8);
    }

    #[test]
    fn test_spreading_config_added_after_refresh() {
        let mut ctx = enabled_context();
        for aid in 1..=10 {
            ctx.station_associated(aid).unwrap();
        }
        ctx.regenerate().unwrap();
        assert_eq!(ctx.aid_list().len(), 10);

        let cmd = create_cmd(1, 1, 10).with_tlv(CommandTlv::BeaconSpread {
            max_spread: 0,
            nominal_stations_per_beacon: 3,
        });
        ctx.process_command(&cmd).unwrap();
        assert!(!ctx.has_pending(PendingWork::RefreshAids));
        ctx.regenerate().unwrap();

        let mut ranges = Vec::new();
        for _ in 0..4 {
            ranges.push(RpsIe::parse(ctx.rps_ie()).unwrap().assignments[0].group.unwrap());
            assert!(ctx.notify_beacon_sent());
            ctx.regenerate().unwrap();
        }
        assert_eq!(ranges, vec![(1, 3), (4, 6), (7, 8), (9, 10)]);

        // Moving the group of an active spreading RAW keeps it spread
        let cmd = RawCommand::new(1, CommandFlags::UPDATE | CommandFlags::ENABLE)
            .with_tlv(CommandTlv::Group { start_aid: 5, end_aid: 10 });
        ctx.process_command(&cmd).unwrap();
        assert_eq!(ctx.store().find(1).unwrap().start_aid_idx, 4);
        ctx.regenerate().unwrap();
        assert_eq!(RpsIe::parse(ctx.rps_ie()).unwrap().assignments[0].group, Some((5, 7)));
    }

    #[test]
    fn test_membership_change_while_disabled() {
        let mut ctx = enabled_context();
        for aid in 1..=10 {
            ctx.station_associated(aid).unwrap();
        }
        ctx.regenerate().unwrap();

        ctx.process_command(&RawCommand::new(0, CommandFlags::empty())).unwrap();
        ctx.regenerate().unwrap();
        for aid in 11..=20 {
            // Nothing to do until the engine is enabled again
            assert!(!ctx.station_associated(aid).unwrap());
        }
        ctx.regenerate().unwrap();
        assert!(ctx.has_pending(PendingWork::RefreshAids));

        ctx.process_command(&RawCommand::new(0, CommandFlags::ENABLE)).unwrap();
        ctx.regenerate().unwrap();
        assert_eq!(ctx.aid_list().len(), 20);
        assert_eq!(ctx.stations().count(), 20);
    }

    #[test]
    fn test_duplicate_beacon_sent() {
        let mut ctx = enabled_context();
        ctx.process_command(&praw_cmd(1, 4, 2, 0)).unwrap();
        assert!(ctx.notify_beacon_sent());
        assert!(ctx.notify_beacon_sent());
        ctx.regenerate().unwrap();
        assert!(!ctx.has_pending(PendingWork::BeaconSent));
        assert_eq!(ctx.stats().beacons_processed, 1);
    }

    #[test]
    fn test_teardown() {
        let mut ctx = enabled_context();
        ctx.process_command(&create_cmd(1, 1, 10)).unwrap();
        ctx.regenerate().unwrap();
        ctx.teardown();
        assert!(ctx.store().is_empty());
        assert_eq!(ctx.rps_ie_len(), 0);
        assert!(!ctx.is_enabled());
    }
}
