//! Participant roster shared by both registries.
//!
//! Maps a transport handle to a display name (plus an optional per-transport
//! link, e.g. the outbound half of a stream) and keeps a name index so the
//! uniqueness check does not walk every entry.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::error::RelayError;

#[derive(Debug)]
pub struct Entry<L> {
    pub name: String,
    pub link: L,
}

#[derive(Debug)]
pub struct Roster<H, L = ()> {
    entries: HashMap<H, Entry<L>>,
    names: HashSet<String>,
}

impl<H, L> Default for Roster<H, L> {
    fn default() -> Self {
        Roster {
            entries: HashMap::new(),
            names: HashSet::new(),
        }
    }
}

impl<H: Eq + Hash + Copy, L> Roster<H, L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn contains(&self, handle: &H) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn name_of(&self, handle: &H) -> Option<&str> {
        self.entries.get(handle).map(|e| e.name.as_str())
    }

    // Registers `name` under `handle`. A handle holds one name at a time, so
    // a handle that was already present gives up its previous name.
    pub fn insert(&mut self, handle: H, name: String, link: L) -> Result<(), RelayError> {
        if self.names.contains(&name) {
            return Err(RelayError::NameConflict(name));
        }

        self.names.insert(name.clone());
        if let Some(previous) = self.entries.insert(handle, Entry { name, link }) {
            self.names.remove(&previous.name);
        }

        Ok(())
    }

    pub fn remove(&mut self, handle: &H) -> Option<Entry<L>> {
        let entry = self.entries.remove(handle)?;
        self.names.remove(&entry.name);
        Some(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&H, &Entry<L>)> {
        self.entries.iter()
    }

    pub fn handles(&self) -> impl Iterator<Item = &H> {
        self.entries.keys()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (H, Entry<L>)> + '_ {
        self.names.clear();
        self.entries.drain()
    }

    pub fn names(&self) -> Vec<String> {
        let mut list: Vec<String> = self.names.iter().cloned().collect();
        list.sort();
        list
    }
}
