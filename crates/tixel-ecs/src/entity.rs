//! Entity handles and slot allocation.
//!
//! An [`EntityId`] packs a slot *index* (low 32 bits) and a *generation*
//! (high 32 bits). A slot's generation goes up each time it is reissued,
//! so an id kept past a despawn stops matching and never reaches the
//! slot's next occupant.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Generational entity handle.
///
/// Ordering is by raw value, which keeps iteration and pair keys stable for a
/// given spawn history.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Build a handle from a slot index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// Slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// Generation (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Occupied { generation: u32 },
    /// Keeps the last occupant's generation until the slot is reissued.
    Vacant { generation: u32 },
}

impl Slot {
    fn generation(self) -> u32 {
        match self {
            Slot::Occupied { generation } | Slot::Vacant { generation } => generation,
        }
    }
}

/// Slot table behind [`World`](crate::world::World) ids.
///
/// Released slots wait in a queue and are reissued oldest first.
#[derive(Debug, Clone, Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    vacant: VecDeque<u32>,
    occupied: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> EntityId {
        self.occupied += 1;
        if let Some(index) = self.vacant.pop_front() {
            let slot = &mut self.slots[index as usize];
            let generation = slot.generation().wrapping_add(1);
            *slot = Slot::Occupied { generation };
            return EntityId::new(index, generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied { generation: 0 });
        EntityId::new(index, 0)
    }

    /// Vacate the slot `id` points at. A stale or unknown `id` is a no-op
    /// and yields `false`.
    pub fn release(&mut self, id: EntityId) -> bool {
        if !self.is_current(id) {
            return false;
        }
        self.slots[id.index() as usize] = Slot::Vacant {
            generation: id.generation(),
        };
        self.vacant.push_back(id.index());
        self.occupied -= 1;
        true
    }

    pub fn is_current(&self, id: EntityId) -> bool {
        self.slots.get(id.index() as usize)
            == Some(&Slot::Occupied {
                generation: id.generation(),
            })
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    /// Slots created so far, vacant ones included.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
