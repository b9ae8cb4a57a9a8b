//! Narrow-phase AABB test and impulse-based contact resolution.
//!
//! [`CollisionSystem::resolve_all`] walks collidable entities in world order,
//! asks the [`SpatialGrid`] for candidates, and resolves each overlapping
//! pair at most once per step. A pair is resolved completely (position
//! correction, then impulse) before the next pair is looked at, and the
//! caller's contact callback runs right after each resolution.
//!
//! Entities with a collider but no [`PhysicsBody`] are immovable: their
//! inverse mass is zero, so they neither get pushed nor receive impulse.
//!
//! Bounds are closed, so boxes that merely touch still intersect. Position
//! correction therefore pushes a pair [`SEPARATION_SLOP`] past the touching
//! point, and a resolved pair at rest stays out of contact afterwards.

use std::collections::HashSet;

use glam::DVec2;
use tixel_ecs::prelude::*;
use tracing::{trace, warn};

use crate::config::ConfigError;
use crate::grid::{GridError, SpatialGrid};

/// Gap left between two boxes after positional correction.
pub const SEPARATION_SLOP: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Aabb
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box with closed bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec2,
    pub max: DVec2,
}

impl Aabb {
    pub fn new(position: DVec2, size: DVec2) -> Self {
        Self {
            min: position,
            max: position + size,
        }
    }

    /// Box of an entity with both a transform and a collider.
    pub fn from_record(record: &EntityRecord) -> Option<Self> {
        let transform = record.transform.as_ref()?;
        let collider = record.collider.as_ref()?;
        Some(Self::new(transform.position, collider.size()))
    }

    /// Touching edges count as intersecting.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Per-axis overlap. Negative components mean a gap on that axis.
    pub fn overlap(&self, other: &Aabb) -> DVec2 {
        self.max.min(other.max) - self.min.max(other.min)
    }
}

// ---------------------------------------------------------------------------
// PairKey / Contact
// ---------------------------------------------------------------------------

/// Unordered entity pair, stored with the lower id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    first: EntityId,
    second: EntityId,
}

impl PairKey {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> EntityId {
        self.first
    }

    pub fn second(&self) -> EntityId {
        self.second
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.first == id || self.second == id
    }
}

/// Outcome of resolving one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub pair: PairKey,
    /// Unit normal pointing from `pair.first()` towards `pair.second()`.
    pub normal: DVec2,
    /// Overlap along `normal` before correction, slop not included.
    pub penetration: f64,
    /// Impulse magnitude applied along `normal`. Zero if the bodies were
    /// already separating or both are immovable.
    pub impulse: f64,
}

/// What one resolution pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionReport {
    pub resolved: Vec<PairKey>,
    /// Collidable entities missing from the grid, skipped for this pass.
    pub skipped: Vec<(EntityId, GridError)>,
}

// ---------------------------------------------------------------------------
// CollisionSystem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionSystem {
    elasticity: f64,
}

fn inverse_mass(record: &EntityRecord) -> f64 {
    record.physics.as_ref().map_or(0.0, PhysicsBody::inverse_mass)
}

fn velocity(record: &EntityRecord) -> DVec2 {
    record.physics.as_ref().map_or(DVec2::ZERO, |p| p.velocity)
}

/// Box of a collidable entity, or `None` if its collider is disabled.
fn contact_box(world: &World, id: EntityId) -> Result<Option<Aabb>, EcsError> {
    let collider = *world.require_collider(id)?;
    let transform = world.require_transform(id)?;
    Ok(collider
        .enabled
        .then(|| Aabb::new(transform.position, collider.size())))
}

fn nudge(record: &mut EntityRecord, delta: DVec2) {
    if let Some(t) = record.transform.as_mut() {
        t.position += delta;
    }
}

impl CollisionSystem {
    /// # Errors
    ///
    /// [`ConfigError::InvalidElasticity`] unless `elasticity` is in `[0, 1]`.
    pub fn new(elasticity: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&elasticity) {
            return Err(ConfigError::InvalidElasticity(elasticity));
        }
        Ok(Self { elasticity })
    }

    pub fn elasticity(&self) -> f64 {
        self.elasticity
    }

    /// Resolve every overlapping collidable pair once.
    ///
    /// `on_contact` runs after each pair is resolved, with the world already
    /// reflecting the correction and impulse. Later pairs see whatever the
    /// callback changed.
    pub fn resolve_all<F>(
        &self,
        world: &mut World,
        grid: &SpatialGrid,
        mut on_contact: F,
    ) -> CollisionReport
    where
        F: FnMut(&mut World, &Contact),
    {
        let mut report = CollisionReport::default();
        let mut seen: HashSet<PairKey> = HashSet::new();

        for id in world.ids() {
            if !world.get(id).is_some_and(EntityRecord::is_collidable) {
                continue;
            }
            let candidates = match grid.neighbors(id) {
                Ok(candidates) => candidates,
                Err(err) => {
                    warn!(entity = %id, error = %err, "collidable entity missing from grid, skipping");
                    report.skipped.push((id, err));
                    continue;
                }
            };
            for other in candidates {
                let key = PairKey::new(id, other);
                if seen.contains(&key) {
                    continue;
                }
                match self.resolve_pair(world, id, other) {
                    Ok(Some(contact)) => {
                        seen.insert(key);
                        report.resolved.push(key);
                        on_contact(world, &contact);
                    }
                    Ok(None) => {}
                    // A contact callback may have removed or stripped one side.
                    Err(err) => warn!(pair = ?key, error = %err, "pair no longer collidable"),
                }
            }
        }

        if !report.resolved.is_empty() {
            trace!(pairs = report.resolved.len(), "contacts resolved");
        }
        report
    }

    /// Test one pair and, if the boxes intersect, separate them and exchange
    /// impulse.
    ///
    /// Returns `Ok(None)` when the boxes are apart, when either collider is
    /// disabled, or when `a == b`.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if either id is not live, and
    /// [`EcsError::MissingComponent`] if either side lacks a transform or a
    /// collider.
    pub fn resolve_pair(
        &self,
        world: &mut World,
        a: EntityId,
        b: EntityId,
    ) -> Result<Option<Contact>, EcsError> {
        let pair = PairKey::new(a, b);
        let (Some(box_a), Some(box_b)) = (
            contact_box(world, pair.first())?,
            contact_box(world, pair.second())?,
        ) else {
            return Ok(None);
        };
        if !box_a.intersects(&box_b) {
            return Ok(None);
        }
        let Some((rec_a, rec_b)) = world.pair_mut(pair.first(), pair.second()) else {
            return Ok(None);
        };

        // Separate along the axis of least overlap; ties go to X.
        let overlap = box_a.overlap(&box_b);
        let (axis, penetration) = if overlap.x <= overlap.y {
            (DVec2::X, overlap.x)
        } else {
            (DVec2::Y, overlap.y)
        };
        let normal = if box_b.min.dot(axis) < box_a.min.dot(axis) {
            -axis
        } else {
            axis
        };

        let inv_a = inverse_mass(rec_a);
        let inv_b = inverse_mass(rec_b);
        let inv_total = inv_a + inv_b;
        if inv_total == 0.0 {
            return Ok(Some(Contact {
                pair,
                normal,
                penetration,
                impulse: 0.0,
            }));
        }

        let share_a = if inv_a == 0.0 {
            0.0
        } else if inv_b == 0.0 {
            1.0
        } else {
            0.5
        };
        let push = penetration + SEPARATION_SLOP;
        nudge(rec_a, -normal * push * share_a);
        nudge(rec_b, normal * push * (1.0 - share_a));

        let rel = (velocity(rec_b) - velocity(rec_a)).dot(normal);
        let mut impulse = 0.0;
        if rel < 0.0 {
            impulse = -(1.0 + self.elasticity) * rel / inv_total;
            if let Some(p) = rec_a.physics.as_mut() {
                p.velocity -= normal * impulse * inv_a;
            }
            if let Some(p) = rec_b.physics.as_mut() {
                p.velocity += normal * impulse * inv_b;
            }
        }

        Ok(Some(Contact {
            pair,
            normal,
            penetration,
            impulse,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
