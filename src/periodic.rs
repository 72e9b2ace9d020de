//! Periodic RAW countdown
//!
//! Each active PRAW counts beacons down towards its next occurrence. Every time
//! the countdown lands back on the configured start offset one period has
//! elapsed; once the validity is used up the PRAW either expires or, when
//! configured to refresh, starts over and triggers a new retransmission burst.

use crate::store::ConfigStore;
use crate::window::PeriodicParams;

/// Result of advancing a single PRAW by one beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrawTransition {
    /// Still counting down within a period
    Running,
    /// A full period elapsed, validity decremented
    PeriodElapsed,
    /// Validity exhausted, counters reset, PRAW should be deactivated
    Expired,
    /// Validity exhausted, counters reset, retransmission should restart
    Refreshed,
}

/// Advance one PRAW after a beacon was transmitted
pub fn advance_after_beacon(praw: &mut PeriodicParams) -> PrawTransition {
    praw.cur_start_offset = match praw.cur_start_offset {
        0 => praw.periodicity.saturating_sub(1),
        offset => offset - 1,
    };

    if praw.cur_start_offset != praw.start_offset {
        return PrawTransition::Running;
    }

    praw.cur_validity = praw.cur_validity.saturating_sub(1);
    if praw.cur_validity > 0 {
        return PrawTransition::PeriodElapsed;
    }

    praw.reset();
    if praw.refresh_on_expiry {
        PrawTransition::Refreshed
    } else {
        PrawTransition::Expired
    }
}

/// Outcome of advancing every active PRAW
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrawAdvance {
    /// PRAWs deactivated because they expired
    pub expired: Vec<u16>,
    /// At least one PRAW refreshed and needs a new retransmission burst
    pub restart_burst: bool,
}

/// Advance all active PRAWs in `store`, deactivating the expired ones
pub fn advance_active(store: &mut ConfigStore) -> PrawAdvance {
    let mut outcome = PrawAdvance::default();
    let ids: Vec<u16> = store.active_periodic().to_vec();

    for id in ids {
        let Some(praw) = store.find_mut(id).and_then(|cfg| cfg.periodic.as_mut()) else {
            continue;
        };
        match advance_after_beacon(praw) {
            PrawTransition::Running | PrawTransition::PeriodElapsed => {}
            PrawTransition::Refreshed => {
                log::debug!("PRAW {} refreshed", id);
                outcome.restart_burst = true;
            }
            PrawTransition::Expired => {
                log::info!("PRAW {} expired", id);
                store.deactivate(id);
                outcome.expired.push(id);
            }
        }
    }
    outcome
}

/// Realign every active PRAW to its configured start offset so relative
/// offsets between PRAWs are preserved after a configuration change
pub fn realign_offsets(store: &mut ConfigStore) {
    let ids: Vec<u16> = store.active_periodic().to_vec();
    for id in ids {
        if let Some(praw) = store.find_mut(id).and_then(|cfg| cfg.periodic.as_mut()) {
            praw.cur_start_offset = praw.start_offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotDefinition;
    use crate::store::Membership;
    use crate::window::WindowConfig;

    #[test]
    fn test_countdown_sequence() {
        let mut praw = PeriodicParams::new(4, 2, 0, false);
        let offsets: Vec<u8> = (0..4)
            .map(|_| {
                advance_after_beacon(&mut praw);
                praw.cur_start_offset
            })
            .collect();
        assert_eq!(offsets, vec![3, 2, 1, 0]);
        assert_eq!(praw.cur_validity, 1);
    }

    #[test]
    fn test_expires_at_eighth_beacon() {
        let mut praw = PeriodicParams::new(4, 2, 0, false);
        for beacon in 1..=7 {
            let transition = advance_after_beacon(&mut praw);
            assert_ne!(transition, PrawTransition::Expired, "beacon {}", beacon);
        }
        assert_eq!(advance_after_beacon(&mut praw), PrawTransition::Expired);
        assert_eq!((praw.cur_validity, praw.cur_start_offset), (2, 0));
    }

    #[test]
    fn test_nonzero_start_offset() {
        let mut praw = PeriodicParams::new(3, 1, 2, false);
        assert_eq!(advance_after_beacon(&mut praw), PrawTransition::Running);
        assert_eq!(advance_after_beacon(&mut praw), PrawTransition::Running);
        assert_eq!(advance_after_beacon(&mut praw), PrawTransition::Expired);
    }

    #[test]
    fn test_refresh_on_expiry() {
        let mut praw = PeriodicParams::new(1, 1, 0, true);
        assert_eq!(advance_after_beacon(&mut praw), PrawTransition::Refreshed);
        assert_eq!(praw.cur_validity, 1);
    }

    #[test]
    fn test_advance_active_deactivates() {
        let mut store = ConfigStore::new();
        let slot = SlotDefinition::new(1, 1000, false);
        for (id, refresh) in [(1u16, false), (2, true)] {
            let cfg = store.create_or_find(id).unwrap();
            *cfg = WindowConfig::generic(id, 1, 10, slot).with_periodic(PeriodicParams::new(2, 1, 0, refresh));
            store.activate(id).unwrap();
        }

        assert_eq!(advance_active(&mut store), PrawAdvance::default());
        let outcome = advance_active(&mut store);
        assert_eq!(outcome.expired, vec![1]);
        assert!(outcome.restart_burst);
        assert_eq!(store.membership(1), Membership::Inactive);
        assert_eq!(store.membership(2), Membership::Periodic);
    }

    #[test]
    fn test_realign_offsets() {
        let mut store = ConfigStore::new();
        let cfg = store.create_or_find(3).unwrap();
        cfg.periodic = Some(PeriodicParams::new(5, 1, 2, false));
        store.activate(3).unwrap();
        advance_active(&mut store);
        assert_eq!(store.find(3).unwrap().periodic.unwrap().cur_start_offset, 1);

        realign_offsets(&mut store);
        assert_eq!(store.find(3).unwrap().periodic.unwrap().cur_start_offset, 2);
    }
}
