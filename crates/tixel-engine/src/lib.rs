//! Tixel Engine -- fixed-step simulation core for console games.
//!
//! This crate builds on [`tixel_ecs`] to drive a world forward: a
//! fixed-timestep loop that integrates rigid bodies, resolves collisions
//! between axis-aligned hitboxes through a uniform spatial grid, and calls
//! per-entity behavior hooks, decoupled from the render frame rate.
//!
//! # Quick Start
//!
//! ```
//! use tixel_engine::prelude::*;
//!
//! let mut sim = Simulation::new(SimConfig::default()).unwrap();
//! let wall = sim.spawn(
//!     EntityBuilder::new()
//!         .with(Transform::new(0.0, 0.0))
//!         .with(Collider::new(1.0, 10.0).unwrap()),
//! );
//! let ball = sim.spawn(
//!     EntityBuilder::new()
//!         .with(Transform::new(0.5, 2.0))
//!         .with(Collider::new(1.0, 1.0).unwrap())
//!         .with(PhysicsBody::new(1.0, 10.0).unwrap().with_velocity(DVec2::new(-3.0, 0.0)))
//!         .with(RenderMeta::textured("ball"))
//!         .behavior(Hooks::new().on_collision(|me, _other, ctx| {
//!             if let Some(render) = ctx.render_mut(me) {
//!                 render.texture_id = Some("ball-hit".into());
//!             }
//!             Ok(())
//!         })),
//! );
//!
//! let report = sim.fixed_step();
//! assert_eq!(report.resolved.len(), 1);
//! assert!(sim.world().physics(ball).unwrap().velocity.x > 0.0);
//! assert_eq!(sim.world().transform(wall).unwrap().position, DVec2::ZERO);
//! assert_eq!(sim.world().render(ball).unwrap().texture_id.as_deref(), Some("ball-hit"));
//! ```

#![deny(unsafe_code)]

pub mod behavior;
pub mod collision;
pub mod config;
pub mod grid;
pub mod input;
pub mod integrator;
pub mod render;
pub mod sim;
pub mod snapshot;

/// Re-export the ECS crate for convenience.
pub use tixel_ecs;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors surfaced by the simulation driver.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Ecs(#[from] tixel_ecs::EcsError),

    /// `run` was called after a previous run returned.
    #[error("simulation already finished; create a new one to run again")]
    AlreadyFinished,

    #[error("renderer failed: {0:#}")]
    Render(anyhow::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use tixel_ecs::prelude::*;

    pub use crate::behavior::{
        Behavior, CallbackFailure, CommandQueue, EntityBuilder, HookContext, HookKind, Hooks,
    };
    pub use crate::collision::{
        Aabb, CollisionReport, CollisionSystem, Contact, PairKey, SEPARATION_SLOP,
    };
    pub use crate::config::{ConfigError, SimConfig};
    pub use crate::grid::{CellKey, GridError, SpatialGrid};
    pub use crate::input::{KeySnapshot, KeyTable};
    pub use crate::render::{Frame, NullRenderer, RenderItem, Renderer, TextRenderer};
    pub use crate::sim::{
        FrameReport, LoopState, RunSummary, Simulation, StepReport, StepTimings, StopHandle,
    };
    pub use crate::snapshot::SimSnapshot;
    pub use crate::EngineError;
}
