//! Arena-backed entity storage.
//!
//! The [`World`] keeps one [`EntityRecord`] per live entity in a slot vector
//! indexed by [`EntityId::index`]. Slots never move, so an id stays valid for
//! the entity's whole lifetime and iteration order is the slot order.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::component::{Collider, ComponentKind, PhysicsBody, RenderMeta, Transform};
use crate::entity::{EntityAllocator, EntityId};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Component (owned, tagged)
// ---------------------------------------------------------------------------

/// A single component value tagged with its kind, for generic insert/remove.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Transform(Transform),
    Physics(PhysicsBody),
    Collider(Collider),
    Render(RenderMeta),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Transform(_) => ComponentKind::Transform,
            Component::Physics(_) => ComponentKind::Physics,
            Component::Collider(_) => ComponentKind::Collider,
            Component::Render(_) => ComponentKind::Render,
        }
    }
}

impl From<Transform> for Component {
    fn from(value: Transform) -> Self {
        Component::Transform(value)
    }
}

impl From<PhysicsBody> for Component {
    fn from(value: PhysicsBody) -> Self {
        Component::Physics(value)
    }
}

impl From<Collider> for Component {
    fn from(value: Collider) -> Self {
        Component::Collider(value)
    }
}

impl From<RenderMeta> for Component {
    fn from(value: RenderMeta) -> Self {
        Component::Render(value)
    }
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// The data components of one entity. Each kind appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityRecord {
    pub transform: Option<Transform>,
    pub physics: Option<PhysicsBody>,
    pub collider: Option<Collider>,
    pub render: Option<RenderMeta>,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: impl Into<Component>) -> Self {
        self.insert(component.into());
        self
    }

    /// Store `component`, returning the value it replaced.
    pub fn insert(&mut self, component: Component) -> Option<Component> {
        match component {
            Component::Transform(c) => self.transform.replace(c).map(Component::Transform),
            Component::Physics(c) => self.physics.replace(c).map(Component::Physics),
            Component::Collider(c) => self.collider.replace(c).map(Component::Collider),
            Component::Render(c) => self.render.replace(c).map(Component::Render),
        }
    }

    /// Take the component of `kind` out of the record.
    ///
    /// Behaviors are not stored here, so `ComponentKind::Behavior` always
    /// yields `None`.
    pub fn remove(&mut self, kind: ComponentKind) -> Option<Component> {
        match kind {
            ComponentKind::Transform => self.transform.take().map(Component::Transform),
            ComponentKind::Physics => self.physics.take().map(Component::Physics),
            ComponentKind::Collider => self.collider.take().map(Component::Collider),
            ComponentKind::Render => self.render.take().map(Component::Render),
            ComponentKind::Behavior => None,
        }
    }

    pub fn has(&self, kind: ComponentKind) -> bool {
        match kind {
            ComponentKind::Transform => self.transform.is_some(),
            ComponentKind::Physics => self.physics.is_some(),
            ComponentKind::Collider => self.collider.is_some(),
            ComponentKind::Render => self.render.is_some(),
            ComponentKind::Behavior => false,
        }
    }

    /// Kinds present on this record, in declaration order.
    pub fn kinds(&self) -> Vec<ComponentKind> {
        [
            ComponentKind::Transform,
            ComponentKind::Physics,
            ComponentKind::Collider,
            ComponentKind::Render,
        ]
        .into_iter()
        .filter(|k| self.has(*k))
        .collect()
    }

    /// `true` when the entity can take part in collision: it has a position
    /// and an enabled hitbox.
    pub fn is_collidable(&self) -> bool {
        self.transform.is_some() && self.collider.is_some_and(|c| c.enabled)
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Storage for all live entities.
#[derive(Debug, Clone, Default)]
pub struct World {
    allocator: EntityAllocator,
    slots: Vec<Option<(EntityId, EntityRecord)>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entity and return its id.
    pub fn spawn(&mut self, record: EntityRecord) -> EntityId {
        let id = self.allocator.allocate();
        let idx = id.index() as usize;
        if idx == self.slots.len() {
            self.slots.push(Some((id, record)));
        } else {
            self.slots[idx] = Some((id, record));
        }
        trace!(entity = %id, "spawned");
        id
    }

    /// Remove an entity, returning its components.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not live.
    pub fn despawn(&mut self, id: EntityId) -> Result<EntityRecord, EcsError> {
        if !self.allocator.release(id) {
            return Err(EcsError::StaleEntity { entity: id });
        }
        let (_, record) = self.slots[id.index() as usize]
            .take()
            .ok_or(EcsError::StaleEntity { entity: id })?;
        trace!(entity = %id, "despawned");
        Ok(record)
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.allocator.is_current(id)
    }

    pub fn entity_count(&self) -> usize {
        self.allocator.occupied()
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        match self.slots.get(id.index() as usize)? {
            Some((slot_id, record)) if *slot_id == id => Some(record),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        match self.slots.get_mut(id.index() as usize)? {
            Some((slot_id, record)) if *slot_id == id => Some(record),
            _ => None,
        }
    }

    /// Like [`get`](Self::get) but reports a stale id as an error.
    pub fn record(&self, id: EntityId) -> Result<&EntityRecord, EcsError> {
        self.get(id).ok_or(EcsError::StaleEntity { entity: id })
    }

    pub fn record_mut(&mut self, id: EntityId) -> Result<&mut EntityRecord, EcsError> {
        self.get_mut(id).ok_or(EcsError::StaleEntity { entity: id })
    }

    /// Mutable access to two distinct entities at once.
    ///
    /// Returns `None` if `a == b` or either id is not live.
    pub fn pair_mut(
        &mut self,
        a: EntityId,
        b: EntityId,
    ) -> Option<(&mut EntityRecord, &mut EntityRecord)> {
        let (ia, ib) = (a.index() as usize, b.index() as usize);
        if ia == ib || !self.is_alive(a) || !self.is_alive(b) {
            return None;
        }
        let (low, high) = (ia.min(ib), ia.max(ib));
        let (head, tail) = self.slots.split_at_mut(high);
        let low_rec = head[low].as_mut().map(|(_, r)| r)?;
        let high_rec = tail[0].as_mut().map(|(_, r)| r)?;
        if ia < ib {
            Some((low_rec, high_rec))
        } else {
            Some((high_rec, low_rec))
        }
    }

    /// Store a component on an entity, returning the replaced value.
    pub fn insert(
        &mut self,
        id: EntityId,
        component: impl Into<Component>,
    ) -> Result<Option<Component>, EcsError> {
        Ok(self.record_mut(id)?.insert(component.into()))
    }

    /// Remove a component from an entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] for a dead id, [`EcsError::MissingComponent`]
    /// if the entity has no component of that kind.
    pub fn remove(&mut self, id: EntityId, kind: ComponentKind) -> Result<Component, EcsError> {
        self.record_mut(id)?
            .remove(kind)
            .ok_or(EcsError::MissingComponent { entity: id, kind })
    }

    pub fn has(&self, id: EntityId, kind: ComponentKind) -> bool {
        self.get(id).is_some_and(|r| r.has(kind))
    }

    // -- typed accessors ----------------------------------------------------

    pub fn transform(&self, id: EntityId) -> Option<&Transform> {
        self.get(id)?.transform.as_ref()
    }

    pub fn transform_mut(&mut self, id: EntityId) -> Option<&mut Transform> {
        self.get_mut(id)?.transform.as_mut()
    }

    pub fn physics(&self, id: EntityId) -> Option<&PhysicsBody> {
        self.get(id)?.physics.as_ref()
    }

    pub fn physics_mut(&mut self, id: EntityId) -> Option<&mut PhysicsBody> {
        self.get_mut(id)?.physics.as_mut()
    }

    pub fn collider(&self, id: EntityId) -> Option<&Collider> {
        self.get(id)?.collider.as_ref()
    }

    pub fn collider_mut(&mut self, id: EntityId) -> Option<&mut Collider> {
        self.get_mut(id)?.collider.as_mut()
    }

    pub fn render(&self, id: EntityId) -> Option<&RenderMeta> {
        self.get(id)?.render.as_ref()
    }

    pub fn render_mut(&mut self, id: EntityId) -> Option<&mut RenderMeta> {
        self.get_mut(id)?.render.as_mut()
    }

    /// Fetch a required physics body, naming what is missing on failure.
    pub fn require_physics(&self, id: EntityId) -> Result<&PhysicsBody, EcsError> {
        self.record(id)?
            .physics
            .as_ref()
            .ok_or(EcsError::MissingComponent {
                entity: id,
                kind: ComponentKind::Physics,
            })
    }

    pub fn require_transform(&self, id: EntityId) -> Result<&Transform, EcsError> {
        self.record(id)?
            .transform
            .as_ref()
            .ok_or(EcsError::MissingComponent {
                entity: id,
                kind: ComponentKind::Transform,
            })
    }

    pub fn require_collider(&self, id: EntityId) -> Result<&Collider, EcsError> {
        self.record(id)?
            .collider
            .as_ref()
            .ok_or(EcsError::MissingComponent {
                entity: id,
                kind: ComponentKind::Collider,
            })
    }

    // -- iteration ----------------------------------------------------------

    /// Live entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &EntityRecord)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|(id, rec)| (*id, rec)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut EntityRecord)> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.as_mut().map(|(id, rec)| (*id, rec)))
    }

    /// Snapshot of live ids in slot order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    fn mover(x: f64, y: f64) -> EntityRecord {
        EntityRecord::new()
            .with(Transform::new(x, y))
            .with(PhysicsBody::new(1.0, 10.0).unwrap())
    }

    #[test]
    fn spawn_and_read_back() {
        let mut world = World::new();
        let e = world.spawn(mover(1.0, 2.0));
        assert!(world.is_alive(e));
        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.transform(e).unwrap().position, DVec2::new(1.0, 2.0));
        assert!(world.collider(e).is_none());
    }

    #[test]
    fn despawn_returns_record_and_invalidates_id() {
        let mut world = World::new();
        let e = world.spawn(mover(0.0, 0.0));
        let rec = world.despawn(e).unwrap();
        assert!(rec.physics.is_some());
        assert!(!world.is_alive(e));
        assert!(world.get(e).is_none());
        assert!(matches!(world.despawn(e), Err(EcsError::StaleEntity { .. })));
    }

    #[test]
    fn stale_id_does_not_alias_reused_slot() {
        let mut world = World::new();
        let old = world.spawn(mover(0.0, 0.0));
        world.despawn(old).unwrap();
        let new = world.spawn(mover(5.0, 5.0));
        assert_eq!(old.index(), new.index());
        assert!(world.transform(old).is_none());
        assert_eq!(world.transform(new).unwrap().position.x, 5.0);
    }

    #[test]
    fn insert_replaces_same_kind() {
        let mut world = World::new();
        let e = world.spawn(EntityRecord::new().with(Transform::new(1.0, 1.0)));
        let prev = world.insert(e, Transform::new(9.0, 9.0)).unwrap();
        assert_eq!(prev, Some(Component::Transform(Transform::new(1.0, 1.0))));
        assert_eq!(world.get(e).unwrap().kinds(), vec![ComponentKind::Transform]);
    }

    #[test]
    fn remove_missing_component_is_an_error() {
        let mut world = World::new();
        let e = world.spawn(EntityRecord::new().with(Transform::new(0.0, 0.0)));
        let err = world.remove(e, ComponentKind::Collider).unwrap_err();
        assert!(matches!(
            err,
            EcsError::MissingComponent {
                kind: ComponentKind::Collider,
                ..
            }
        ));
        assert!(world.remove(e, ComponentKind::Transform).is_ok());
        assert!(!world.has(e, ComponentKind::Transform));
    }

    #[test]
    fn require_reports_missing_kind() {
        let mut world = World::new();
        let e = world.spawn(EntityRecord::new().with(Transform::new(0.0, 0.0)));
        assert!(matches!(
            world.require_physics(e),
            Err(EcsError::MissingComponent {
                kind: ComponentKind::Physics,
                ..
            })
        ));
        assert!(world.require_collider(e).is_err());
        assert_eq!(world.require_transform(e).unwrap().position.x, 0.0);

        let bare = world.spawn(EntityRecord::new());
        assert_eq!(
            world.require_transform(bare),
            Err(EcsError::MissingComponent {
                entity: bare,
                kind: ComponentKind::Transform,
            })
        );
    }

    #[test]
    fn pair_mut_returns_in_argument_order() {
        let mut world = World::new();
        let a = world.spawn(mover(1.0, 0.0));
        let b = world.spawn(mover(2.0, 0.0));

        let (rb, ra) = world.pair_mut(b, a).unwrap();
        assert_eq!(rb.transform.unwrap().position.x, 2.0);
        assert_eq!(ra.transform.unwrap().position.x, 1.0);
        ra.transform.as_mut().unwrap().position.x = 10.0;

        assert_eq!(world.transform(a).unwrap().position.x, 10.0);
        assert!(world.pair_mut(a, a).is_none());
    }

    #[test]
    fn pair_mut_rejects_dead_entities() {
        let mut world = World::new();
        let a = world.spawn(mover(0.0, 0.0));
        let b = world.spawn(mover(0.0, 0.0));
        world.despawn(b).unwrap();
        assert!(world.pair_mut(a, b).is_none());
    }

    #[test]
    fn iteration_follows_slot_order() {
        let mut world = World::new();
        let a = world.spawn(mover(0.0, 0.0));
        let b = world.spawn(mover(0.0, 0.0));
        let c = world.spawn(mover(0.0, 0.0));
        world.despawn(a).unwrap();
        let d = world.spawn(mover(0.0, 0.0));
        // `d` reuses slot 0.
        assert_eq!(world.ids(), vec![d, b, c]);
    }

    #[test]
    fn record_from_partial_json() {
        let rec: EntityRecord = serde_json::from_str(
            r#"{ "transform": { "position": [1.0, 2.0] },
                 "collider": { "width": 2.0, "height": 1.0 } }"#,
        )
        .unwrap();
        assert_eq!(rec.kinds(), vec![ComponentKind::Transform, ComponentKind::Collider]);
        assert!(rec.is_collidable());

        let bad = r#"{ "physics": { "mass": -1.0, "velocity_limit": 1.0 } }"#;
        assert!(serde_json::from_str::<EntityRecord>(bad).is_err());
    }

    #[test]
    fn collidable_requires_enabled_collider_and_transform() {
        let with_both = EntityRecord::new()
            .with(Transform::new(0.0, 0.0))
            .with(Collider::new(1.0, 1.0).unwrap());
        assert!(with_both.is_collidable());

        let disabled = EntityRecord::new()
            .with(Transform::new(0.0, 0.0))
            .with(Collider::new(1.0, 1.0).unwrap().disabled());
        assert!(!disabled.is_collidable());

        let no_transform = EntityRecord::new().with(Collider::new(1.0, 1.0).unwrap());
        assert!(!no_transform.is_collidable());
    }
}
