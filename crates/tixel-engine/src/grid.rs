//! Uniform spatial grid used as the collision broad phase.
//!
//! Every indexed hitbox is stored in each cell its bounding box touches. A
//! neighbor query returns everything stored in the 3x3 block around each of
//! the entity's cells, so two overlapping (or touching) hitboxes are always
//! reported as neighbors. False positives are expected; the narrow phase in
//! [`collision`](crate::collision) filters them.
//!
//! The grid is rebuilt from scratch once per fixed step after integration.
//!
//! Cell coordinates are clamped to `±CELL_COORD_LIMIT`, so bodies that drift
//! arbitrarily far away pile up in the outermost cells instead of
//! overflowing. A hitbox spanning more than [`MAX_CELLS_PER_HITBOX`] cells is
//! refused and reported through [`GridError::TooManyCells`].

use std::collections::{BTreeSet, HashMap};

use glam::DVec2;
use tixel_ecs::prelude::*;
use tracing::{trace, warn};

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// The entity was not present at the last rebuild (no transform, no
    /// collider, or spawned afterwards).
    #[error("entity {entity} is not indexed in the spatial grid")]
    NotIndexed { entity: EntityId },

    /// The hitbox covers more cells than one entity may occupy.
    #[error("hitbox spans {cells} grid cells, limit is {limit}")]
    TooManyCells { cells: u128, limit: u64 },
}

const CELL_COORD_LIMIT: f64 = (1u64 << 48) as f64;

/// Most cells a single hitbox may be stored in.
pub const MAX_CELLS_PER_HITBOX: u64 = 1 << 16;

/// Integer cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub x: i64,
    pub y: i64,
}

impl CellKey {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: DVec2,
    cells: HashMap<CellKey, Vec<EntityId>>,
    entries: HashMap<EntityId, Vec<CellKey>>,
    rejected: HashMap<EntityId, GridError>,
}

impl SpatialGrid {
    /// # Errors
    ///
    /// [`ConfigError::InvalidCellSize`] unless both axes are positive and finite.
    pub fn new(cell_size: DVec2) -> Result<Self, ConfigError> {
        if !(cell_size.x > 0.0 && cell_size.y > 0.0 && cell_size.is_finite()) {
            return Err(ConfigError::InvalidCellSize(cell_size));
        }
        Ok(Self {
            cell_size,
            cells: HashMap::new(),
            entries: HashMap::new(),
            rejected: HashMap::new(),
        })
    }

    pub fn cell_size(&self) -> DVec2 {
        self.cell_size
    }

    fn cell_of(&self, point: DVec2) -> CellKey {
        // NaN clamps to the lower bound.
        let c = (point / self.cell_size)
            .floor()
            .clamp(DVec2::splat(-CELL_COORD_LIMIT), DVec2::splat(CELL_COORD_LIMIT));
        CellKey::new(c.x as i64, c.y as i64)
    }

    /// Number of cells the box with bottom-left corner `position` and extent
    /// `size` touches, bounds inclusive.
    pub fn span_of(&self, position: DVec2, size: DVec2) -> u128 {
        let lo = self.cell_of(position);
        let hi = self.cell_of(position + size);
        let columns = (hi.x - lo.x + 1).max(0) as u128;
        let rows = (hi.y - lo.y + 1).max(0) as u128;
        columns * rows
    }

    /// Cells covered by the box with bottom-left corner `position` and
    /// extent `size`, bounds inclusive.
    ///
    /// # Errors
    ///
    /// [`GridError::TooManyCells`] if the box covers more than
    /// [`MAX_CELLS_PER_HITBOX`] cells.
    pub fn cells_for(&self, position: DVec2, size: DVec2) -> Result<Vec<CellKey>, GridError> {
        let cells = self.span_of(position, size);
        if cells > u128::from(MAX_CELLS_PER_HITBOX) {
            return Err(GridError::TooManyCells {
                cells,
                limit: MAX_CELLS_PER_HITBOX,
            });
        }
        let lo = self.cell_of(position);
        let hi = self.cell_of(position + size);
        let mut keys = Vec::with_capacity(cells as usize);
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                keys.push(CellKey::new(x, y));
            }
        }
        Ok(keys)
    }

    /// Index one hitbox, replacing any previous entry for `id`.
    ///
    /// A refused hitbox is remembered, and [`neighbors`](Self::neighbors)
    /// returns the same error for it until the next rebuild.
    ///
    /// # Errors
    ///
    /// [`GridError::TooManyCells`] if the hitbox is too large to index.
    pub fn insert(&mut self, id: EntityId, position: DVec2, size: DVec2) -> Result<(), GridError> {
        self.remove(id);
        let keys = match self.cells_for(position, size) {
            Ok(keys) => keys,
            Err(err) => {
                self.rejected.insert(id, err.clone());
                return Err(err);
            }
        };
        for key in &keys {
            self.cells.entry(*key).or_default().push(id);
        }
        self.entries.insert(id, keys);
        Ok(())
    }

    /// Drop `id` from the index. Returns `false` if it was not indexed.
    pub fn remove(&mut self, id: EntityId) -> bool {
        self.rejected.remove(&id);
        let Some(keys) = self.entries.remove(&id) else {
            return false;
        };
        for key in keys {
            if let Some(bucket) = self.cells.get_mut(&key) {
                bucket.retain(|e| *e != id);
                if bucket.is_empty() {
                    self.cells.remove(&key);
                }
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
        self.rejected.clear();
    }

    /// Re-index every entity that has both a transform and a collider.
    ///
    /// Disabled colliders are indexed too; whether a contact is resolved is
    /// decided by the narrow phase. Oversized hitboxes are logged and left
    /// out.
    pub fn rebuild(&mut self, world: &World) {
        self.clear();
        for (id, record) in world.iter() {
            if let (Some(transform), Some(collider)) = (&record.transform, &record.collider) {
                if let Err(err) = self.insert(id, transform.position, collider.size()) {
                    warn!(entity = %id, error = %err, "hitbox left out of spatial grid");
                }
            }
        }
        trace!(
            entities = self.entries.len(),
            rejected = self.rejected.len(),
            cells = self.cells.len(),
            "spatial grid rebuilt"
        );
    }

    /// Every other indexed entity sharing or bordering one of `id`'s cells,
    /// sorted and without duplicates.
    ///
    /// # Errors
    ///
    /// [`GridError::NotIndexed`] if `id` was not indexed at the last rebuild,
    /// or the error its hitbox was refused with.
    pub fn neighbors(&self, id: EntityId) -> Result<Vec<EntityId>, GridError> {
        let Some(keys) = self.entries.get(&id) else {
            return Err(self
                .rejected
                .get(&id)
                .cloned()
                .unwrap_or(GridError::NotIndexed { entity: id }));
        };

        let mut found = BTreeSet::new();
        for key in keys {
            for dx in -1..=1 {
                for dy in -1..=1 {
                    let cell = CellKey::new(key.x.saturating_add(dx), key.y.saturating_add(dy));
                    if let Some(bucket) = self.cells.get(&cell) {
                        found.extend(bucket.iter().copied().filter(|e| *e != id));
                    }
                }
            }
        }
        Ok(found.into_iter().collect())
    }

    /// Cells occupied by `id` at the last rebuild.
    pub fn cells_of(&self, id: EntityId) -> Option<&[CellKey]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Indexed entities, sorted.
    pub fn indexed(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
