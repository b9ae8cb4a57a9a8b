//! Fixed-timestep simulation loop.
//!
//! The [`Simulation`] owns the world, the behavior table, the spatial grid and
//! the deferred command queue. Wall-clock time is fed into an accumulator and
//! drained in fixed steps of `1 / tick_rate` seconds. Each fixed step:
//!
//! 1. takes an input snapshot;
//! 2. advances the tick counter;
//! 3. integrates every physics body;
//! 4. rebuilds the spatial grid from the new positions;
//! 5. resolves collisions, firing `on_collision` on both sides of each pair;
//! 6. runs `on_tick` for every entity (id order), then the global tick hooks;
//! 7. applies queued spawns and despawns.
//!
//! Once per frame, after the fixed steps: the frame counter advances, `on_frame`
//! and the global frame hooks run, queued commands are applied, and the frame
//! is handed to the renderer.
//!
//! Simulation time is `tick_count * dt`, computed by multiplication rather than
//! accumulated, so it does not drift.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tixel_engine::prelude::*;
//!
//! let config = SimConfig { tick_rate: 8.0, max_backlog: 1.0, ..Default::default() };
//! let mut sim = Simulation::new(config).unwrap();
//! let ball = sim.spawn(
//!     EntityBuilder::new()
//!         .with(Transform::new(0.0, 0.0))
//!         .with(PhysicsBody::new(1.0, 10.0).unwrap().with_velocity(DVec2::new(1.0, 0.0))),
//! );
//!
//! let report = sim.advance(Duration::from_millis(250));
//! assert_eq!(report.steps, 2);
//! assert_eq!(sim.world().transform(ball).unwrap().position.x, 0.25);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::DVec2;
use tixel_ecs::prelude::*;
use tracing::{debug, debug_span, warn};

use crate::behavior::{
    guarded, Behavior, CallbackFailure, CommandQueue, Deferred, EntityBuilder, GlobalHookFn,
    HookContext, HookKind,
};
use crate::collision::{CollisionSystem, PairKey};
use crate::config::SimConfig;
use crate::grid::{GridError, SpatialGrid};
use crate::input::{KeySnapshot, KeyTable};
use crate::integrator;
use crate::render::{extract_render_items, Frame, RenderItem, Renderer};
use crate::EngineError;

// ---------------------------------------------------------------------------
// LoopState / StopHandle
// ---------------------------------------------------------------------------

/// Lifecycle of [`Simulation::run`].
///
/// `Stopped` is only the state before the first run. A loop that has ended
/// is stopped for good and reports `Finished` instead, so callers can tell a
/// fresh simulation from a spent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Not started yet.
    Stopped,
    Running,
    /// Terminal stopped state: `run` has returned and cannot be called again.
    Finished,
}

/// Cloneable flag that asks a running simulation to stop at the next frame
/// boundary. Safe to trigger from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Wall-clock cost of each phase of the last fixed step.
#[derive(Debug, Clone, Default)]
pub struct StepTimings {
    pub integrate: Duration,
    pub grid: Duration,
    pub collisions: Duration,
    pub hooks: Duration,
    pub commands: Duration,
    pub total: Duration,
}

/// What one fixed step did.
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub tick: u64,
    /// Bodies advanced by the integrator.
    pub integrated: usize,
    pub resolved: Vec<PairKey>,
    pub skipped: Vec<(EntityId, GridError)>,
    pub failures: Vec<CallbackFailure>,
    /// Deferred spawns and despawns applied at the end of the step.
    pub commands_applied: usize,
    pub timings: StepTimings,
}

/// What one call to [`Simulation::advance`] did.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub frame: u64,
    /// Fixed steps run for this frame.
    pub steps: u32,
    /// Simulated time thrown away by the backlog clamp, in seconds.
    pub dropped: f64,
    /// Failures from the fixed steps and from the frame hooks.
    pub failures: Vec<CallbackFailure>,
    /// Commands applied at the end of the frame (not counting the steps').
    pub commands_applied: usize,
}

/// Totals for one [`Simulation::run`].
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub frames: u64,
    pub steps: u64,
    pub failures: usize,
    pub dropped: f64,
    pub wall_time: Duration,
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

pub struct Simulation {
    config: SimConfig,
    fixed_dt: f64,
    world: World,
    behaviors: HashMap<EntityId, Box<dyn Behavior>>,
    grid: SpatialGrid,
    collisions: CollisionSystem,
    commands: CommandQueue,
    input: KeyTable,
    snapshot: KeySnapshot,
    tick_hooks: Vec<(String, GlobalHookFn)>,
    frame_hooks: Vec<(String, GlobalHookFn)>,
    camera_target: Option<EntityId>,
    tick_counter: u64,
    frame_counter: u64,
    accumulator: f64,
    state: LoopState,
    stop: StopHandle,
    /// Failures from hooks run outside a step (spawn / despawn by game code),
    /// reported with the next step or frame.
    pending_failures: Vec<CallbackFailure>,
    last_step: StepReport,
}

impl Simulation {
    /// # Errors
    ///
    /// [`EngineError::Config`] if `config` fails validation.
    pub fn new(config: SimConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            fixed_dt: config.fixed_dt(),
            grid: SpatialGrid::new(config.cell_size)?,
            collisions: CollisionSystem::new(config.elasticity)?,
            config,
            world: World::new(),
            behaviors: HashMap::new(),
            commands: CommandQueue::new(),
            input: KeyTable::new(),
            snapshot: KeySnapshot::default(),
            tick_hooks: Vec::new(),
            frame_hooks: Vec::new(),
            camera_target: None,
            tick_counter: 0,
            frame_counter: 0,
            accumulator: 0.0,
            state: LoopState::Stopped,
            stop: StopHandle::default(),
            pending_failures: Vec::new(),
            last_step: StepReport::default(),
        })
    }

    /// Use an existing key table, e.g. one already wired to a listener.
    pub fn with_input(mut self, input: KeyTable) -> Self {
        self.input = input;
        self
    }

    fn counters(&self) -> (u64, u64, f64) {
        (self.tick_counter, self.frame_counter, self.fixed_dt)
    }

    // -- structure -----------------------------------------------------------

    /// Add an entity now and run its `on_init`.
    pub fn spawn(&mut self, builder: EntityBuilder) -> EntityId {
        let counters = self.counters();
        let EntityBuilder { record, behavior } = builder;
        let id = self.world.spawn(record);
        if let Some(mut behavior) = behavior {
            let mut ctx = HookContext::new(
                counters,
                &mut self.world,
                &mut self.commands,
                &self.snapshot,
                &self.stop,
            );
            if let Err(failure) =
                guarded(HookKind::Init, Some(id), None, || behavior.on_init(id, &mut ctx))
            {
                self.pending_failures.push(failure);
            }
            self.behaviors.insert(id, behavior);
        }
        debug!(entity = %id, "entity spawned");
        id
    }

    /// Remove an entity now: `on_remove` first, then grid, behavior table and
    /// world.
    ///
    /// # Errors
    ///
    /// [`EngineError::Ecs`] with [`EcsError::StaleEntity`] if `id` is not live.
    pub fn despawn(&mut self, id: EntityId) -> Result<(), EngineError> {
        if !self.world.is_alive(id) {
            return Err(EcsError::StaleEntity { entity: id }.into());
        }
        let counters = self.counters();
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            let mut ctx = HookContext::new(
                counters,
                &mut self.world,
                &mut self.commands,
                &self.snapshot,
                &self.stop,
            );
            if let Err(failure) =
                guarded(HookKind::Remove, Some(id), None, || behavior.on_remove(id, &mut ctx))
            {
                self.pending_failures.push(failure);
            }
        }
        self.grid.remove(id);
        self.behaviors.remove(&id);
        self.world.despawn(id)?;
        if self.camera_target == Some(id) {
            self.camera_target = None;
        }
        debug!(entity = %id, "entity despawned");
        Ok(())
    }

    /// Apply queued structural edits in FIFO order, including any queued by
    /// the hooks they trigger. Returns how many were applied.
    fn apply_commands(&mut self, failures: &mut Vec<CallbackFailure>) -> usize {
        let mut applied = 0;
        loop {
            let batch = self.commands.take();
            if batch.is_empty() {
                break;
            }
            for command in batch {
                match command {
                    Deferred::Spawn(builder) => {
                        self.spawn(builder);
                        applied += 1;
                    }
                    Deferred::Despawn(id) => match self.despawn(id) {
                        Ok(()) => applied += 1,
                        Err(e) => warn!(entity = %id, error = %e, "deferred despawn skipped"),
                    },
                }
            }
        }
        failures.append(&mut self.pending_failures);
        applied
    }

    // -- hooks ---------------------------------------------------------------

    /// Register a hook that runs once per fixed step after every entity's
    /// `on_tick`. Hooks run in registration order.
    ///
    /// # Panics
    ///
    /// Panics if a tick hook with the same name is already registered.
    pub fn add_tick_hook(
        &mut self,
        name: &str,
        hook: impl FnMut(&mut HookContext<'_>) -> anyhow::Result<()> + 'static,
    ) {
        assert!(
            !self.tick_hooks.iter().any(|(n, _)| n == name),
            "duplicate tick hook name: {name:?}"
        );
        self.tick_hooks.push((name.to_owned(), Box::new(hook)));
    }

    /// Register a hook that runs once per frame after every entity's
    /// `on_frame`.
    ///
    /// # Panics
    ///
    /// Panics if a frame hook with the same name is already registered.
    pub fn add_frame_hook(
        &mut self,
        name: &str,
        hook: impl FnMut(&mut HookContext<'_>) -> anyhow::Result<()> + 'static,
    ) {
        assert!(
            !self.frame_hooks.iter().any(|(n, _)| n == name),
            "duplicate frame hook name: {name:?}"
        );
        self.frame_hooks.push((name.to_owned(), Box::new(hook)));
    }

    // -- stepping ------------------------------------------------------------

    /// Run exactly one fixed step.
    pub fn fixed_step(&mut self) -> StepReport {
        let step_start = Instant::now();
        self.snapshot = self.input.snapshot();
        self.tick_counter += 1;
        let span = debug_span!("fixed_step", tick = self.tick_counter);
        let _guard = span.enter();

        let mut failures = std::mem::take(&mut self.pending_failures);
        let mut timings = StepTimings::default();

        let t = Instant::now();
        let integrated =
            integrator::integrate(&mut self.world, self.fixed_dt, self.config.axis_scale);
        timings.integrate = t.elapsed();

        let t = Instant::now();
        self.grid.rebuild(&self.world);
        timings.grid = t.elapsed();

        let counters = self.counters();
        let t = Instant::now();
        let contacts = {
            let behaviors = &mut self.behaviors;
            let commands = &mut self.commands;
            let snapshot = &self.snapshot;
            let stop = &self.stop;
            let failures = &mut failures;
            self.collisions
                .resolve_all(&mut self.world, &self.grid, |world, contact| {
                    let mut ctx = HookContext::new(counters, world, &mut *commands, snapshot, stop);
                    let (a, b) = (contact.pair.first(), contact.pair.second());
                    for (me, other) in [(a, b), (b, a)] {
                        if let Some(behavior) = behaviors.get_mut(&me) {
                            if let Err(failure) = guarded(HookKind::Collision, Some(me), None, || {
                                behavior.on_collision(me, other, &mut ctx)
                            }) {
                                failures.push(failure);
                            }
                        }
                    }
                })
        };
        timings.collisions = t.elapsed();

        let t = Instant::now();
        {
            let mut ids = self.world.ids();
            ids.sort_unstable();
            let mut ctx = HookContext::new(
                counters,
                &mut self.world,
                &mut self.commands,
                &self.snapshot,
                &self.stop,
            );
            for id in ids {
                if let Some(behavior) = self.behaviors.get_mut(&id) {
                    if let Err(failure) =
                        guarded(HookKind::Tick, Some(id), None, || behavior.on_tick(id, &mut ctx))
                    {
                        failures.push(failure);
                    }
                }
            }
            for (name, hook) in &mut self.tick_hooks {
                if let Err(failure) = guarded(HookKind::Tick, None, Some(name.as_str()), || hook(&mut ctx)) {
                    failures.push(failure);
                }
            }
        }
        timings.hooks = t.elapsed();

        let t = Instant::now();
        let commands_applied = self.apply_commands(&mut failures);
        timings.commands = t.elapsed();
        timings.total = step_start.elapsed();

        let report = StepReport {
            tick: self.tick_counter,
            integrated,
            resolved: contacts.resolved,
            skipped: contacts.skipped,
            failures,
            commands_applied,
            timings,
        };
        self.last_step = report.clone();
        report
    }

    /// Feed `elapsed` wall time in, run as many fixed steps as it pays for,
    /// then run the per-frame hooks.
    ///
    /// The accumulator is clamped to `max_backlog` before stepping, so a long
    /// stall costs at most `max_backlog / dt` steps.
    pub fn advance(&mut self, elapsed: Duration) -> FrameReport {
        let mut report = FrameReport::default();

        self.accumulator += elapsed.as_secs_f64();
        if self.accumulator > self.config.max_backlog {
            report.dropped = self.accumulator - self.config.max_backlog;
            warn!(
                dropped_secs = report.dropped,
                max_backlog = self.config.max_backlog,
                "simulation fell behind, discarding backlog"
            );
            self.accumulator = self.config.max_backlog;
        }

        while self.accumulator >= self.fixed_dt {
            let step = self.fixed_step();
            report.failures.extend(step.failures);
            self.accumulator -= self.fixed_dt;
            report.steps += 1;
        }

        self.frame_counter += 1;
        self.snapshot = self.input.snapshot();
        let mut failures = std::mem::take(&mut report.failures);
        {
            let mut ids = self.world.ids();
            ids.sort_unstable();
            let mut ctx = HookContext::new(
                self.counters(),
                &mut self.world,
                &mut self.commands,
                &self.snapshot,
                &self.stop,
            );
            for id in ids {
                if let Some(behavior) = self.behaviors.get_mut(&id) {
                    if let Err(failure) = guarded(HookKind::Frame, Some(id), None, || {
                        behavior.on_frame(id, &mut ctx)
                    }) {
                        failures.push(failure);
                    }
                }
            }
            for (name, hook) in &mut self.frame_hooks {
                if let Err(failure) = guarded(HookKind::Frame, None, Some(name.as_str()), || hook(&mut ctx))
                {
                    failures.push(failure);
                }
            }
        }
        report.commands_applied = self.apply_commands(&mut failures);
        report.failures = failures;
        report.frame = self.frame_counter;
        report
    }

    /// Drive the loop until stopped, rendering once per frame.
    ///
    /// In headless mode the loop does not sleep and does not read the wall
    /// clock: every frame advances by exactly one frame budget, so a headless
    /// run is reproducible.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyFinished`] if `run` already returned once,
    /// [`EngineError::Render`] if the renderer fails (the loop stops).
    pub fn run<R: Renderer>(&mut self, mut renderer: R) -> Result<RunSummary, EngineError> {
        if self.state != LoopState::Stopped {
            return Err(EngineError::AlreadyFinished);
        }
        self.state = LoopState::Running;
        debug!(
            tick_rate = self.config.tick_rate,
            frame_rate = self.config.frame_rate,
            headless = self.config.headless,
            "simulation started"
        );

        let budget = self.config.frame_budget();
        let started = Instant::now();
        let mut last = started;
        let mut summary = RunSummary::default();

        let result = loop {
            let frame_start = Instant::now();
            let elapsed = if self.config.headless {
                budget
            } else {
                frame_start - last
            };
            last = frame_start;

            let report = self.advance(elapsed);
            summary.frames += 1;
            summary.steps += u64::from(report.steps);
            summary.failures += report.failures.len();
            summary.dropped += report.dropped;

            if let Err(e) = renderer.render(&self.render_frame()) {
                warn!(error = %e, "renderer failed, stopping");
                break Err(EngineError::Render(e));
            }
            if self.stop.is_stopped() {
                break Ok(());
            }
            if !self.config.headless {
                let spent = frame_start.elapsed();
                if spent < budget {
                    std::thread::sleep(budget - spent);
                }
            }
        };

        self.state = LoopState::Finished;
        summary.wall_time = started.elapsed();
        debug!(
            frames = summary.frames,
            steps = summary.steps,
            failures = summary.failures,
            "simulation finished"
        );
        result.map(|()| summary)
    }

    // -- rendering -----------------------------------------------------------

    /// Follow `id` with the camera.
    ///
    /// # Errors
    ///
    /// [`EngineError::Ecs`] if `id` is not live.
    pub fn set_camera_target(&mut self, id: EntityId) -> Result<(), EngineError> {
        self.world.record(id)?;
        self.camera_target = Some(id);
        Ok(())
    }

    pub fn clear_camera_target(&mut self) {
        self.camera_target = None;
    }

    pub fn camera_target(&self) -> Option<EntityId> {
        self.camera_target
    }

    pub fn render_items(&self) -> Vec<RenderItem> {
        extract_render_items(&self.world)
    }

    pub fn render_frame(&self) -> Frame {
        Frame {
            frame: self.frame_counter,
            tick: self.tick_counter,
            resolution: self.config.resolution,
            camera: self
                .camera_target
                .and_then(|id| self.world.transform(id))
                .map(|t| t.position),
            items: self.render_items(),
        }
    }

    // -- accessors -----------------------------------------------------------

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Simulated seconds, `tick_count * dt`.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    /// Simulated time carried over to the next frame.
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access for game setup code. Spawning and despawning
    /// should still go through [`spawn`](Self::spawn) /
    /// [`despawn`](Self::despawn) so hooks fire.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.world.get(id)
    }

    pub fn has_behavior(&self, id: EntityId) -> bool {
        self.behaviors.contains_key(&id)
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn input(&self) -> &KeyTable {
        &self.input
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn last_step_report(&self) -> &StepReport {
        &self.last_step
    }

    /// Total momentum of every physics body.
    pub fn total_momentum(&self) -> DVec2 {
        self.world
            .iter()
            .filter_map(|(_, r)| r.physics.as_ref())
            .map(PhysicsBody::momentum)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
