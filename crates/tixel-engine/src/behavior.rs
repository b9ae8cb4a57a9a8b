//! Behavior callbacks, the context they receive, and deferred structural edits.
//!
//! Every entity may carry one [`Behavior`]. Its hooks run at fixed points of
//! the loop:
//!
//! | hook           | when                                                  |
//! |----------------|-------------------------------------------------------|
//! | `on_init`      | once, right after the entity is added                 |
//! | `on_tick`      | once per fixed step, after collisions are resolved    |
//! | `on_frame`     | once per render frame                                 |
//! | `on_remove`    | once, before the entity is detached and freed         |
//! | `on_collision` | once per resolved contact, after the physical response |
//!
//! Hooks never see ambient globals. They get a [`HookContext`] that exposes
//! the counters, the input snapshot, read access to the world, and mutation
//! of existing components. Adding or removing entities goes through the
//! context's [`CommandQueue`] and is applied after the current pass finishes,
//! so the list being iterated never changes underneath a dispatch loop.
//!
//! A hook that returns `Err` or panics is contained at the dispatch boundary
//! and reported as a [`CallbackFailure`]; the remaining entities still run.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tixel_ecs::prelude::*;
use tracing::warn;

use crate::input::KeySnapshot;
use crate::sim::StopHandle;

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// Game-specific behavior attached to one entity. Every hook defaults to a
/// no-op, so implementors only write the ones they need.
#[allow(unused_variables)]
pub trait Behavior {
    fn on_init(&mut self, me: EntityId, ctx: &mut HookContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_tick(&mut self, me: EntityId, ctx: &mut HookContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_frame(&mut self, me: EntityId, ctx: &mut HookContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_remove(&mut self, me: EntityId, ctx: &mut HookContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_collision(
        &mut self,
        me: EntityId,
        other: EntityId,
        ctx: &mut HookContext<'_>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Closure for an entity hook.
pub type EntityHookFn = Box<dyn FnMut(EntityId, &mut HookContext<'_>) -> anyhow::Result<()>>;

/// Closure for the collision hook: `(me, other, ctx)`.
pub type CollisionHookFn =
    Box<dyn FnMut(EntityId, EntityId, &mut HookContext<'_>) -> anyhow::Result<()>>;

/// Closure for a simulation-wide hook (not tied to an entity).
pub type GlobalHookFn = Box<dyn FnMut(&mut HookContext<'_>) -> anyhow::Result<()>>;

/// A [`Behavior`] assembled from optional closures, one slot per hook.
#[derive(Default)]
pub struct Hooks {
    init: Option<EntityHookFn>,
    tick: Option<EntityHookFn>,
    frame: Option<EntityHookFn>,
    remove: Option<EntityHookFn>,
    collision: Option<CollisionHookFn>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_init(
        mut self,
        f: impl FnMut(EntityId, &mut HookContext<'_>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.init = Some(Box::new(f));
        self
    }

    pub fn on_tick(
        mut self,
        f: impl FnMut(EntityId, &mut HookContext<'_>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.tick = Some(Box::new(f));
        self
    }

    pub fn on_frame(
        mut self,
        f: impl FnMut(EntityId, &mut HookContext<'_>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.frame = Some(Box::new(f));
        self
    }

    pub fn on_remove(
        mut self,
        f: impl FnMut(EntityId, &mut HookContext<'_>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.remove = Some(Box::new(f));
        self
    }

    pub fn on_collision(
        mut self,
        f: impl FnMut(EntityId, EntityId, &mut HookContext<'_>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.collision = Some(Box::new(f));
        self
    }
}

impl Behavior for Hooks {
    fn on_init(&mut self, me: EntityId, ctx: &mut HookContext<'_>) -> anyhow::Result<()> {
        self.init.as_mut().map_or(Ok(()), |f| f(me, ctx))
    }

    fn on_tick(&mut self, me: EntityId, ctx: &mut HookContext<'_>) -> anyhow::Result<()> {
        self.tick.as_mut().map_or(Ok(()), |f| f(me, ctx))
    }

    fn on_frame(&mut self, me: EntityId, ctx: &mut HookContext<'_>) -> anyhow::Result<()> {
        self.frame.as_mut().map_or(Ok(()), |f| f(me, ctx))
    }

    fn on_remove(&mut self, me: EntityId, ctx: &mut HookContext<'_>) -> anyhow::Result<()> {
        self.remove.as_mut().map_or(Ok(()), |f| f(me, ctx))
    }

    fn on_collision(
        &mut self,
        me: EntityId,
        other: EntityId,
        ctx: &mut HookContext<'_>,
    ) -> anyhow::Result<()> {
        self.collision.as_mut().map_or(Ok(()), |f| f(me, other, ctx))
    }
}

// ---------------------------------------------------------------------------
// EntityBuilder
// ---------------------------------------------------------------------------

/// Components plus an optional behavior, ready to be spawned.
#[derive(Default)]
pub struct EntityBuilder {
    pub(crate) record: EntityRecord,
    pub(crate) behavior: Option<Box<dyn Behavior>>,
}

impl fmt::Debug for EntityBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBuilder")
            .field("record", &self.record)
            .field("behavior", &self.behavior.is_some())
            .finish()
    }
}

impl EntityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: impl Into<Component>) -> Self {
        self.record.insert(component.into());
        self
    }

    pub fn behavior(mut self, behavior: impl Behavior + 'static) -> Self {
        self.behavior = Some(Box::new(behavior));
        self
    }

    pub fn record(&self) -> &EntityRecord {
        &self.record
    }
}

impl From<EntityRecord> for EntityBuilder {
    fn from(record: EntityRecord) -> Self {
        Self {
            record,
            behavior: None,
        }
    }
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// A structural edit requested during dispatch.
#[derive(Debug)]
pub enum Deferred {
    Spawn(EntityBuilder),
    Despawn(EntityId),
}

/// FIFO of structural edits, applied by the simulation between passes.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Vec<Deferred>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, builder: EntityBuilder) {
        self.pending.push(Deferred::Spawn(builder));
    }

    pub fn despawn(&mut self, id: EntityId) {
        self.pending.push(Deferred::Despawn(id));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take everything queued so far, in insertion order.
    pub fn take(&mut self) -> Vec<Deferred> {
        std::mem::take(&mut self.pending)
    }
}

// ---------------------------------------------------------------------------
// HookContext
// ---------------------------------------------------------------------------

/// Everything a hook may see or touch during one invocation.
pub struct HookContext<'a> {
    pub(crate) tick: u64,
    pub(crate) frame: u64,
    pub(crate) dt: f64,
    pub(crate) world: &'a mut World,
    pub(crate) commands: &'a mut CommandQueue,
    pub(crate) input: &'a KeySnapshot,
    pub(crate) stop: &'a StopHandle,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(
        (tick, frame, dt): (u64, u64, f64),
        world: &'a mut World,
        commands: &'a mut CommandQueue,
        input: &'a KeySnapshot,
        stop: &'a StopHandle,
    ) -> Self {
        Self {
            tick,
            frame,
            dt,
            world,
            commands,
            input,
            stop,
        }
    }

    /// Fixed steps completed, including the current one while it runs.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Render frames started so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Fixed step duration in seconds.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn input(&self) -> &KeySnapshot {
        self.input
    }

    pub fn world(&self) -> &World {
        self.world
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.world.get(id)
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.world.ids()
    }

    pub fn transform_mut(&mut self, id: EntityId) -> Option<&mut Transform> {
        self.world.transform_mut(id)
    }

    pub fn physics_mut(&mut self, id: EntityId) -> Option<&mut PhysicsBody> {
        self.world.physics_mut(id)
    }

    pub fn collider_mut(&mut self, id: EntityId) -> Option<&mut Collider> {
        self.world.collider_mut(id)
    }

    pub fn render_mut(&mut self, id: EntityId) -> Option<&mut RenderMeta> {
        self.world.render_mut(id)
    }

    /// Queue an entity to be added once the current pass ends.
    pub fn spawn(&mut self, builder: EntityBuilder) {
        self.commands.spawn(builder);
    }

    /// Queue an entity for removal once the current pass ends.
    pub fn despawn(&mut self, id: EntityId) {
        self.commands.despawn(id);
    }

    /// Ask the loop to stop at the next frame boundary.
    pub fn request_stop(&mut self) {
        self.stop.stop();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_stopped()
    }
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

/// Which hook a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Init,
    Tick,
    Frame,
    Remove,
    Collision,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::Init => "on_init",
            HookKind::Tick => "on_tick",
            HookKind::Frame => "on_frame",
            HookKind::Remove => "on_remove",
            HookKind::Collision => "on_collision",
        };
        f.write_str(name)
    }
}

/// A hook that returned an error or panicked. Recoverable; reported, not fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    /// The entity whose hook failed. `None` for simulation-wide hooks.
    pub entity: Option<EntityId>,
    pub hook: HookKind,
    /// Registered name of a simulation-wide hook.
    pub name: Option<String>,
    pub message: String,
    pub panicked: bool,
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.entity, &self.name) {
            (Some(e), _) => write!(f, "{} of entity {e} failed: {}", self.hook, self.message),
            (None, Some(n)) => write!(f, "{} hook '{n}' failed: {}", self.hook, self.message),
            (None, None) => write!(f, "{} failed: {}", self.hook, self.message),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Run one hook, turning an `Err` or a panic into a [`CallbackFailure`].
pub(crate) fn guarded(
    hook: HookKind,
    entity: Option<EntityId>,
    name: Option<&str>,
    f: impl FnOnce() -> anyhow::Result<()>,
) -> Result<(), CallbackFailure> {
    let (message, panicked) = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => (format!("{e:#}"), false),
        Err(payload) => (panic_message(payload.as_ref()), true),
    };
    let failure = CallbackFailure {
        entity,
        hook,
        name: name.map(str::to_owned),
        message,
        panicked,
    };
    warn!(
        entity = ?failure.entity,
        hook = %failure.hook,
        name = ?failure.name,
        panicked = failure.panicked,
        error = %failure.message,
        "hook failed"
    );
    Err(failure)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
