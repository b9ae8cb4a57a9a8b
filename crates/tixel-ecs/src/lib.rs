//! Tixel ECS -- entity storage and component records for the Tixel simulation core.
//!
//! Entities are generational handles into an index-stable arena. Each entity
//! owns at most one of each data component ([`Transform`](component::Transform),
//! [`PhysicsBody`](component::PhysicsBody), [`Collider`](component::Collider),
//! [`RenderMeta`](component::RenderMeta)); behavior callbacks are attached by
//! the engine crate.
//!
//! # Quick Start
//!
//! ```
//! use tixel_ecs::prelude::*;
//!
//! let mut world = World::new();
//! let body = PhysicsBody::new(1.0, 5.0).unwrap();
//! let entity = world.spawn(
//!     EntityRecord::new()
//!         .with(Transform::new(0.0, 0.0))
//!         .with(body)
//!         .with(Collider::new(2.0, 1.0).unwrap()),
//! );
//!
//! assert!(world.get(entity).unwrap().is_collidable());
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations and component construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EcsError {
    /// The entity is not live (removed, or the id was never handed out).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },

    /// An operation needed a component the entity does not carry.
    #[error("entity {entity:?} has no {kind} component")]
    MissingComponent {
        entity: entity::EntityId,
        kind: component::ComponentKind,
    },

    #[error("mass must be positive and finite, got {mass}")]
    InvalidMass { mass: f64 },

    #[error("{field} must be non-negative and finite, got {value}")]
    InvalidLimit { field: &'static str, value: f64 },

    #[error("hitbox dimensions must be non-negative and finite, got {width}x{height}")]
    InvalidHitbox { width: f64, height: f64 },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Collider, ComponentKind, PhysicsBody, RenderMeta, Transform};
    pub use crate::entity::EntityId;
    pub use crate::world::{Component, EntityRecord, World};
    pub use crate::EcsError;
    pub use glam::DVec2;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    fn box_entity(x: f64, y: f64) -> EntityRecord {
        EntityRecord::new()
            .with(Transform::new(x, y))
            .with(PhysicsBody::new(2.0, 8.0).unwrap())
            .with(Collider::new(1.0, 1.0).unwrap())
            .with(RenderMeta::textured("crate"))
    }

    #[test]
    fn full_entity_exposes_every_kind() {
        let mut world = World::new();
        let e = world.spawn(box_entity(3.0, 4.0));
        assert_eq!(
            world.get(e).unwrap().kinds(),
            vec![
                ComponentKind::Transform,
                ComponentKind::Physics,
                ComponentKind::Collider,
                ComponentKind::Render,
            ]
        );
        assert_eq!(world.physics(e).unwrap().mass(), 2.0);
        assert_eq!(world.render(e).unwrap().texture_id.as_deref(), Some("crate"));
    }

    #[test]
    fn mutation_through_typed_accessors() {
        let mut world = World::new();
        let e = world.spawn(box_entity(0.0, 0.0));
        world.physics_mut(e).unwrap().velocity = DVec2::new(1.0, 0.0);
        world.transform_mut(e).unwrap().position.y = 7.0;
        world.collider_mut(e).unwrap().enabled = false;
        world.render_mut(e).unwrap().visible = false;

        let rec = world.get(e).unwrap();
        assert_eq!(rec.physics.as_ref().unwrap().velocity.x, 1.0);
        assert_eq!(rec.transform.unwrap().position.y, 7.0);
        assert!(!rec.is_collidable());
        assert!(!rec.render.as_ref().unwrap().visible);
    }

    #[test]
    fn many_entities_survive_partial_removal() {
        let mut world = World::new();
        let ids: Vec<EntityId> = (0..1_000)
            .map(|i| world.spawn(box_entity(i as f64, 0.0)))
            .collect();
        for id in ids.iter().step_by(2) {
            world.despawn(*id).unwrap();
        }
        assert_eq!(world.entity_count(), 500);
        for (n, id) in ids.iter().enumerate() {
            assert_eq!(world.is_alive(*id), n % 2 == 1);
        }
        assert_eq!(world.iter().count(), 500);
    }

    #[test]
    fn errors_render_readably() {
        let err = PhysicsBody::new(-1.0, 1.0).unwrap_err();
        assert_eq!(err.to_string(), "mass must be positive and finite, got -1");

        let err = EcsError::MissingComponent {
            entity: EntityId::new(3, 1),
            kind: ComponentKind::Physics,
        };
        assert_eq!(err.to_string(), "entity EntityId(3v1) has no physics component");
    }
}
