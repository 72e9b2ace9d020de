//! Configuration store
//!
//! All configs of an interface live in an id-ordered arena. Active configs are
//! additionally referenced from one of two id-ordered index lists, one for plain
//! RAWs and one for periodic RAWs.

use std::collections::BTreeMap;
use crate::window::WindowConfig;
use crate::{RawError, Result, RAW_META_ID};

/// Which active list (if any) a config belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Inactive,
    Plain,
    Periodic,
}

/// Master store of RAW configs
#[derive(Debug, Default)]
pub struct ConfigStore {
    configs: BTreeMap<u16, WindowConfig>,
    active_plain: Vec<u16>,
    active_periodic: Vec<u16>,
}

fn insert_sorted(list: &mut Vec<u16>, id: u16) {
    if let Err(pos) = list.binary_search(&id) {
        list.insert(pos, id);
    }
}

fn remove_sorted(list: &mut Vec<u16>, id: u16) -> bool {
    match list.binary_search(&id) {
        Ok(pos) => {
            list.remove(pos);
            true
        }
        Err(_) => false,
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a config, creating an empty one if it does not exist yet
    pub fn create_or_find(&mut self, id: u16) -> Result<&mut WindowConfig> {
        if id == RAW_META_ID {
            return Err(RawError::InvalidArgument("RAW id 0 cannot be stored".to_string()));
        }
        Ok(self.configs.entry(id).or_insert_with(|| {
            log::debug!("Creating RAW config {}", id);
            WindowConfig::new(id)
        }))
    }

    pub fn find(&self, id: u16) -> Option<&WindowConfig> {
        self.configs.get(&id)
    }

    pub fn find_mut(&mut self, id: u16) -> Option<&mut WindowConfig> {
        self.configs.get_mut(&id)
    }

    /// Replace a stored config with a new version, keeping its membership
    /// consistent with whether it is periodic.
    pub fn replace(&mut self, config: WindowConfig) -> Result<()> {
        let id = config.id;
        if id == RAW_META_ID {
            return Err(RawError::InvalidArgument("RAW id 0 cannot be stored".to_string()));
        }
        let was_active = self.membership(id) != Membership::Inactive;
        self.deactivate(id);
        self.configs.insert(id, config);
        if was_active {
            self.activate(id)?;
        }
        Ok(())
    }

    /// Remove a config and drop it from the active lists
    pub fn delete(&mut self, id: u16) -> Option<WindowConfig> {
        self.deactivate(id);
        let removed = self.configs.remove(&id);
        if removed.is_some() {
            log::debug!("Deleted RAW config {}", id);
        }
        removed
    }

    /// Remove every config
    pub fn delete_all(&mut self) {
        self.active_plain.clear();
        self.active_periodic.clear();
        self.configs.clear();
    }

    /// Add a config to the active list matching its kind; no-op if already active
    pub fn activate(&mut self, id: u16) -> Result<()> {
        let Some(config) = self.configs.get(&id) else {
            return Err(RawError::NotFound(id));
        };
        match (self.membership(id), config.is_periodic()) {
            (Membership::Plain, false) | (Membership::Periodic, true) => {}
            (_, periodic) => {
                self.deactivate(id);
                if periodic {
                    insert_sorted(&mut self.active_periodic, id);
                } else {
                    insert_sorted(&mut self.active_plain, id);
                }
            }
        }
        Ok(())
    }

    /// Remove a config from whichever active list holds it
    pub fn deactivate(&mut self, id: u16) {
        if !remove_sorted(&mut self.active_plain, id) {
            remove_sorted(&mut self.active_periodic, id);
        }
    }

    pub fn membership(&self, id: u16) -> Membership {
        if self.active_plain.binary_search(&id).is_ok() {
            Membership::Plain
        } else if self.active_periodic.binary_search(&id).is_ok() {
            Membership::Periodic
        } else {
            Membership::Inactive
        }
    }

    /// Active plain config ids, ascending
    pub fn active_plain(&self) -> &[u16] {
        &self.active_plain
    }

    /// Active periodic config ids, ascending
    pub fn active_periodic(&self) -> &[u16] {
        &self.active_periodic
    }

    pub fn has_active(&self) -> bool {
        !self.active_plain.is_empty() || !self.active_periodic.is_empty()
    }

    /// All stored configs, ascending by id
    pub fn iter(&self) -> impl Iterator<Item = &WindowConfig> {
        self.configs.values()
    }

    /// Active configs, plain list first
    pub fn active_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.active_plain.iter().chain(self.active_periodic.iter()).copied()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
