//! End-to-end scenarios driven through the public `Simulation` API.
//!
//! Tick rate 8 (dt = 0.125) keeps positions exactly representable so most
//! checks can compare floats directly.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use tixel_engine::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(elasticity: f64) -> SimConfig {
    SimConfig {
        tick_rate: 8.0,
        frame_rate: 4.0,
        max_backlog: 0.5,
        elasticity,
        headless: true,
        ..Default::default()
    }
}

fn block(x: f64, y: f64, w: f64, h: f64) -> EntityBuilder {
    EntityBuilder::new()
        .with(Transform::new(x, y))
        .with(Collider::new(w, h).unwrap())
}

fn body(x: f64, y: f64, mass: f64, v: DVec2) -> EntityBuilder {
    block(x, y, 2.0, 2.0).with(PhysicsBody::new(mass, 1e6).unwrap().with_velocity(v))
}

type Log = Rc<RefCell<Vec<String>>>;

fn push(log: &Log, entry: String) {
    log.borrow_mut().push(entry);
}

/// Walls around `[0, size]` plus `n` balls scattered inside from `seed`.
fn arena(seed: u64, n: usize, size: f64) -> Simulation {
    let mut sim = Simulation::new(config(0.9)).unwrap();
    sim.spawn(block(-1.0, -1.0, size + 2.0, 1.0));
    sim.spawn(block(-1.0, size, size + 2.0, 1.0));
    sim.spawn(block(-1.0, 0.0, 1.0, size));
    sim.spawn(block(size, 0.0, 1.0, size));

    let mut rng = Pcg64::seed_from_u64(seed);
    for _ in 0..n {
        let x = rng.gen_range(1.0..size - 2.0);
        let y = rng.gen_range(1.0..size - 2.0);
        let v = DVec2::new(rng.gen_range(-6.0..6.0), rng.gen_range(-6.0..6.0));
        let mass = rng.gen_range(0.5..4.0);
        sim.spawn(
            block(x, y, 1.0, 1.0)
                .with(PhysicsBody::new(mass, 8.0).unwrap().with_velocity(v))
                .with(RenderMeta::default()),
        );
    }
    sim
}

// ---------------------------------------------------------------------------
// Collision response
// ---------------------------------------------------------------------------

#[test]
fn resting_overlap_separates_on_x_without_impulse() {
    let mut sim = Simulation::new(config(0.5)).unwrap();
    let a = sim.spawn(body(0.0, 0.0, 1.0, DVec2::ZERO));
    let b = sim.spawn(body(1.0, 0.0, 1.0, DVec2::ZERO));

    let report = sim.fixed_step();
    assert_eq!(report.resolved.len(), 1);

    let world = sim.world();
    let (pa, pb) = (world.transform(a).unwrap().position, world.transform(b).unwrap().position);
    assert!((pa - DVec2::new(-0.5, 0.0)).length() <= SEPARATION_SLOP);
    assert!((pb - DVec2::new(1.5, 0.0)).length() <= SEPARATION_SLOP);
    assert_eq!(world.physics(a).unwrap().velocity, DVec2::ZERO);
    assert_eq!(world.physics(b).unwrap().velocity, DVec2::ZERO);

    let box_a = Aabb::from_record(world.get(a).unwrap()).unwrap();
    let box_b = Aabb::from_record(world.get(b).unwrap()).unwrap();
    assert!(!box_a.intersects(&box_b));
}

#[test]
fn separated_boxes_stay_put_and_stop_colliding() {
    let mut sim = Simulation::new(config(0.5)).unwrap();
    let hits: Log = Rc::default();
    let counter = |log: &Log| {
        let log = log.clone();
        Hooks::new().on_collision(move |me, other, _| {
            push(&log, format!("{me}-{other}"));
            Ok(())
        })
    };
    sim.spawn(body(0.0, 0.0, 1.0, DVec2::ZERO).behavior(counter(&hits)));
    sim.spawn(body(1.0, 0.0, 1.0, DVec2::ZERO).behavior(counter(&hits)));
    sim.fixed_step();
    assert_eq!(hits.borrow().len(), 2);
    let settled = sim.snapshot();

    for _ in 0..5 {
        let report = sim.fixed_step();
        assert!(report.resolved.is_empty());
    }
    assert_eq!(hits.borrow().len(), 2);
    assert_eq!(sim.snapshot().entities, settled.entities);
}

#[test]
fn head_on_elastic_collision_swaps_velocities() {
    let mut sim = Simulation::new(config(1.0)).unwrap();
    let a = sim.spawn(body(0.0, 0.0, 1.0, DVec2::new(4.0, 0.0)));
    let b = sim.spawn(body(2.5, 0.0, 1.0, DVec2::new(-4.0, 0.0)));

    // One step closes the 0.5 gap to an overlap of 0.5.
    let report = sim.fixed_step();
    assert_eq!(report.resolved.len(), 1);
    assert_eq!(sim.world().physics(a).unwrap().velocity, DVec2::new(-4.0, 0.0));
    assert_eq!(sim.world().physics(b).unwrap().velocity, DVec2::new(4.0, 0.0));
    assert_eq!(sim.total_momentum(), DVec2::ZERO);
}

#[test]
fn ball_bounces_off_static_wall() {
    let mut sim = Simulation::new(config(1.0)).unwrap();
    let wall = sim.spawn(block(0.0, -5.0, 1.0, 10.0));
    let ball = sim.spawn(body(1.25, 0.0, 2.0, DVec2::new(-4.0, 0.0)));

    let report = sim.fixed_step();
    assert_eq!(report.resolved.len(), 1);
    assert_eq!(sim.world().transform(wall).unwrap().position, DVec2::new(0.0, -5.0));
    let x = sim.world().transform(ball).unwrap().position.x;
    assert!(x > 1.0 && x - 1.0 <= 2.0 * SEPARATION_SLOP);
    assert_eq!(sim.world().physics(ball).unwrap().velocity, DVec2::new(4.0, 0.0));
}

#[test]
fn stacked_static_blocks_report_every_pair() {
    let mut sim = Simulation::new(config(0.5)).unwrap();
    let n = 5;
    let ids: Vec<EntityId> = (0..n).map(|_| sim.spawn(block(0.0, 0.0, 1.0, 1.0))).collect();

    let report = sim.fixed_step();
    assert_eq!(report.resolved.len(), n * (n - 1) / 2);
    for id in ids {
        assert_eq!(sim.world().transform(id).unwrap().position, DVec2::ZERO);
    }
}

#[test]
fn disabled_collider_passes_through() {
    let mut sim = Simulation::new(config(0.5)).unwrap();
    let ghost = sim.spawn(
        EntityBuilder::new()
            .with(Transform::new(0.0, 0.0))
            .with(Collider::new(2.0, 2.0).unwrap().disabled())
            .with(PhysicsBody::new(1.0, 10.0).unwrap()),
    );
    sim.spawn(body(1.0, 0.0, 1.0, DVec2::ZERO));

    let report = sim.fixed_step();
    assert!(report.resolved.is_empty());
    assert_eq!(sim.world().transform(ghost).unwrap().position, DVec2::ZERO);
}

#[test]
fn runaway_body_does_not_break_the_step() {
    let mut sim = Simulation::new(config(0.5)).unwrap();
    let runaway = sim.spawn(body(1e20, 0.0, 1.0, DVec2::new(1e5, 0.0)));
    let a = sim.spawn(body(0.0, 0.0, 1.0, DVec2::ZERO));
    let b = sim.spawn(body(1.0, 0.0, 1.0, DVec2::ZERO));

    for _ in 0..3 {
        let report = sim.fixed_step();
        assert!(report.skipped.is_empty());
    }
    assert!(sim.world().transform(runaway).unwrap().position.x >= 1e20);
    let box_a = Aabb::from_record(sim.world().get(a).unwrap()).unwrap();
    let box_b = Aabb::from_record(sim.world().get(b).unwrap()).unwrap();
    assert!(!box_a.intersects(&box_b));
}

#[test]
fn oversized_hitbox_is_skipped_and_reported() {
    let mut sim = Simulation::new(config(0.5)).unwrap();
    let slab = sim.spawn(block(0.0, 0.0, 1e6, 1e6));
    let inside = sim.spawn(body(1.0, 1.0, 1.0, DVec2::ZERO));

    let report = sim.fixed_step();
    assert!(report.resolved.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, slab);
    assert!(matches!(report.skipped[0].1, GridError::TooManyCells { .. }));
    assert_eq!(sim.world().transform(inside).unwrap().position, DVec2::new(1.0, 1.0));
}

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

#[test]
fn speed_is_clamped_to_limit() {
    let mut sim = Simulation::new(config(0.5)).unwrap();
    let e = sim.spawn(
        EntityBuilder::new()
            .with(Transform::new(0.0, 0.0))
            .with(PhysicsBody::new(1.0, 5.0).unwrap().with_velocity(DVec2::new(10.0, 0.0))),
    );
    sim.fixed_step();
    let v = sim.world().physics(e).unwrap().velocity;
    assert_eq!(v, DVec2::new(5.0, 0.0));
    assert_eq!(sim.world().transform(e).unwrap().position.x, 0.625);
}

#[test]
fn axis_scale_shrinks_vertical_motion() {
    let mut sim = Simulation::new(SimConfig {
        axis_scale: DVec2::new(1.0, 0.5),
        ..config(0.5)
    })
    .unwrap();
    let e = sim.spawn(
        EntityBuilder::new()
            .with(Transform::new(0.0, 0.0))
            .with(PhysicsBody::new(1.0, 10.0).unwrap().with_velocity(DVec2::new(2.0, 2.0))),
    );
    sim.fixed_step();
    assert_eq!(sim.world().transform(e).unwrap().position, DVec2::new(0.25, 0.125));
}

// ---------------------------------------------------------------------------
// Loop and hooks
// ---------------------------------------------------------------------------

#[test]
fn spawned_child_lives_out_its_lifecycle() {
    let log: Log = Rc::default();
    let mut sim = Simulation::new(config(0.5)).unwrap();

    let l = log.clone();
    let spawner = sim.spawn(EntityBuilder::new().behavior(Hooks::new().on_tick(move |_, ctx| {
        if ctx.tick() != 1 {
            return Ok(());
        }
        let (init, tick, frame, remove) = (l.clone(), l.clone(), l.clone(), l.clone());
        ctx.spawn(
            EntityBuilder::new().with(Transform::new(0.0, 0.0)).behavior(
                Hooks::new()
                    .on_init(move |_, ctx| {
                        push(&init, format!("init@{}", ctx.tick()));
                        Ok(())
                    })
                    .on_tick(move |me, ctx| {
                        push(&tick, format!("tick@{}", ctx.tick()));
                        if ctx.tick() == 3 {
                            ctx.despawn(me);
                        }
                        Ok(())
                    })
                    .on_frame(move |_, ctx| {
                        push(&frame, format!("frame@{}", ctx.frame()));
                        Ok(())
                    })
                    .on_remove(move |_, ctx| {
                        push(&remove, format!("remove@{}", ctx.tick()));
                        Ok(())
                    }),
            ),
        );
        Ok(())
    })));

    let report = sim.advance(Duration::from_millis(500));
    assert_eq!(report.steps, 4);
    assert!(report.failures.is_empty());
    assert_eq!(
        *log.borrow(),
        vec!["init@1", "tick@2", "tick@3", "remove@3"]
    );
    assert_eq!(sim.world().ids(), vec![spawner]);
}

#[test]
fn hook_can_move_other_entities_through_context() {
    let mut sim = Simulation::new(config(0.5)).unwrap();
    let target = sim.spawn(EntityBuilder::new().with(Transform::new(0.0, 0.0)));
    sim.spawn(EntityBuilder::new().behavior(Hooks::new().on_tick(move |_, ctx| {
        if let Some(t) = ctx.transform_mut(target) {
            t.position.x += 1.0;
        }
        Ok(())
    })));
    for _ in 0..3 {
        sim.fixed_step();
    }
    assert_eq!(sim.world().transform(target).unwrap().position.x, 3.0);
}

#[test]
fn keys_drive_acceleration() {
    let mut sim = Simulation::new(config(0.5)).unwrap();
    sim.input().bind("d", None, None);
    let ship = sim.spawn(
        EntityBuilder::new()
            .with(Transform::new(0.0, 0.0))
            .with(PhysicsBody::new(1.0, 10.0).unwrap())
            .behavior(Hooks::new().on_tick(|me, ctx| {
                let thrust = if ctx.input().is_pressed("d") { 8.0 } else { 0.0 };
                if let Some(p) = ctx.physics_mut(me) {
                    p.acceleration = DVec2::new(thrust, 0.0);
                }
                Ok(())
            })),
    );

    sim.input().press("d");
    sim.fixed_step();
    sim.input().release("d");
    sim.fixed_step();
    sim.fixed_step();
    // Acceleration set on tick 1 is applied by tick 2's integration only.
    assert_eq!(sim.world().physics(ship).unwrap().velocity, DVec2::new(1.0, 0.0));
    assert_eq!(sim.world().transform(ship).unwrap().position.x, 0.25);
}

#[test]
fn text_renderer_sees_every_frame() {
    let mut sim = Simulation::new(SimConfig {
        resolution: (12, 4),
        ..config(0.5)
    })
    .unwrap();
    sim.spawn(block(0.0, 0.0, 1.0, 1.0).with(RenderMeta::textured("box")));
    sim.add_frame_hook("quit", |ctx| {
        if ctx.frame() == 2 {
            ctx.request_stop();
        }
        Ok(())
    });

    let mut renderer = TextRenderer::new(Vec::new()).with_texture("box", &["##", "##"]);
    let summary = sim.run(&mut renderer).unwrap();
    assert_eq!(summary.frames, 2);

    let text = String::from_utf8(renderer.into_inner()).unwrap();
    assert_eq!(text.matches("+------------+").count(), 4);
    assert!(text.contains('#'));
}

// ---------------------------------------------------------------------------
// Determinism and stress
// ---------------------------------------------------------------------------

fn run_arena(seed: u64) -> (Simulation, RunSummary) {
    let mut sim = arena(seed, 40, 30.0);
    sim.add_frame_hook("limit", |ctx| {
        if ctx.frame() == 30 {
            ctx.request_stop();
        }
        Ok(())
    });
    let summary = sim.run(NullRenderer::default()).unwrap();
    (sim, summary)
}

#[test]
fn identical_headless_runs_hash_identically() {
    let (a, sa) = run_arena(42);
    let (b, sb) = run_arena(42);
    assert_eq!(sa.frames, 30);
    assert_eq!(sa.steps, sb.steps);
    assert_eq!(a.tick_count(), 60);
    assert_eq!(a.state_hash().unwrap(), b.state_hash().unwrap());

    let (c, _) = run_arena(43);
    assert_ne!(a.state_hash().unwrap(), c.state_hash().unwrap());
}

#[test]
fn crowded_arena_stays_bounded() {
    let mut sim = arena(7, 150, 40.0);
    let mut contacts = 0;
    for _ in 0..200 {
        let report = sim.fixed_step();
        assert!(report.failures.is_empty());
        assert!(report.skipped.is_empty());
        contacts += report.resolved.len();
    }
    assert!(contacts > 0);

    for (_, record) in sim.world().iter() {
        let position = record.transform.unwrap().position;
        assert!(position.is_finite());
        if let Some(p) = &record.physics {
            // Impulses applied after integration can briefly exceed the
            // limit; the next integration clamps again.
            assert!(p.velocity.is_finite());
        }
    }
    assert_eq!(sim.render_items().len(), 150);
}
