//! Slab storage for live tracks.
//!
//! The tracker's collections hold [`TrackKey`]s into one arena instead of
//! owning track copies, so a track can only be moved between collections,
//! never duplicated.

use std::ops::{Index, IndexMut};

use crate::tracker::strack::STrack;

/// Stable handle to a track stored in a [`TrackArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey(usize);

#[derive(Debug, Clone, Default)]
pub struct TrackArena {
    slots: Vec<Option<STrack>>,
    free: Vec<usize>,
}

impl TrackArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, track: STrack) -> TrackKey {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(track);
                TrackKey(index)
            }
            None => {
                self.slots.push(Some(track));
                TrackKey(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, key: TrackKey) -> Option<&STrack> {
        self.slots.get(key.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, key: TrackKey) -> Option<&mut STrack> {
        self.slots.get_mut(key.0).and_then(Option::as_mut)
    }

    /// Take a track out of the arena, freeing its slot for reuse.
    pub fn remove(&mut self, key: TrackKey) -> Option<STrack> {
        let track = self.slots.get_mut(key.0)?.take()?;
        self.free.push(key.0);
        Some(track)
    }

    /// Tracks for `keys`, skipping keys that are no longer live.
    pub fn resolve<'a>(&'a self, keys: &'a [TrackKey]) -> impl Iterator<Item = &'a STrack> + 'a {
        keys.iter().filter_map(|&key| self.get(key))
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

/// Indexing panics on a key whose track was already removed.
impl Index<TrackKey> for TrackArena {
    type Output = STrack;

    fn index(&self, key: TrackKey) -> &STrack {
        match self.get(key) {
            Some(track) => track,
            None => panic!("stale track key {key:?}"),
        }
    }
}

impl IndexMut<TrackKey> for TrackArena {
    fn index_mut(&mut self, key: TrackKey) -> &mut STrack {
        match self.get_mut(key) {
            Some(track) => track,
            None => panic!("stale track key {key:?}"),
        }
    }
}
