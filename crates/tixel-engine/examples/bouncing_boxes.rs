//! Bouncing boxes in a walled arena, drawn as text.
//!
//! Run with:
//!   cargo run --example bouncing_boxes -p tixel-engine
//!   cargo run --example bouncing_boxes -p tixel-engine -- --headless --frames 300
//!
//! Set `RUST_LOG=tixel_engine=debug` to watch the loop.

use std::io;

use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use tixel_engine::prelude::*;
use tracing_subscriber::EnvFilter;

const ARENA: (f64, f64) = (60.0, 20.0);

struct Options {
    headless: bool,
    frames: u64,
    balls: usize,
}

fn parse_args() -> anyhow::Result<Options> {
    let mut options = Options {
        headless: false,
        frames: 200,
        balls: 12,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--headless" => options.headless = true,
            "--frames" => {
                let value = args.next().context("--frames needs a value")?;
                options.frames = value.parse().context("--frames must be a number")?;
            }
            "--balls" => {
                let value = args.next().context("--balls needs a value")?;
                options.balls = value.parse().context("--balls must be a number")?;
            }
            other => anyhow::bail!("unknown argument {other:?}"),
        }
    }
    Ok(options)
}

fn wall(x: f64, y: f64, w: f64, h: f64) -> anyhow::Result<EntityBuilder> {
    Ok(EntityBuilder::new()
        .with(Transform::new(x, y))
        .with(Collider::new(w, h)?)
        .with(RenderMeta::textured("wall").with_priority(-1)))
}

/// Balls flash while touching something and get a kick upwards when the
/// `w` key is held.
fn ball_behavior() -> Hooks {
    Hooks::new()
        .on_tick(|me, ctx| {
            let lift = if ctx.input().is_pressed("w") { 20.0 } else { 0.0 };
            if let Some(body) = ctx.physics_mut(me) {
                body.acceleration = DVec2::new(0.0, lift - 9.0);
            }
            Ok(())
        })
        .on_frame(|me, ctx| {
            if let Some(render) = ctx.render_mut(me) {
                render.texture_id = Some("ball".into());
            }
            Ok(())
        })
        .on_collision(|me, _other, ctx| {
            if let Some(render) = ctx.render_mut(me) {
                render.texture_id = Some("hit".into());
            }
            Ok(())
        })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let options = parse_args()?;
    let config = SimConfig {
        resolution: (ARENA.0 as u32 + 4, ARENA.1 as u32 + 4),
        headless: options.headless,
        elasticity: 0.9,
        ..Default::default()
    };
    let mut sim = Simulation::new(config)?;

    let (w, h) = ARENA;
    sim.spawn(wall(-w / 2.0 - 1.0, -h / 2.0 - 1.0, w + 2.0, 1.0)?);
    sim.spawn(wall(-w / 2.0 - 1.0, h / 2.0, w + 2.0, 1.0)?);
    sim.spawn(wall(-w / 2.0 - 1.0, -h / 2.0, 1.0, h)?);
    sim.spawn(wall(w / 2.0, -h / 2.0, 1.0, h)?);

    let mut rng = Pcg64::seed_from_u64(2024);
    for _ in 0..options.balls {
        let position = DVec2::new(
            rng.gen_range(-w / 2.0 + 1.0..w / 2.0 - 2.0),
            rng.gen_range(-h / 2.0 + 1.0..h / 2.0 - 2.0),
        );
        let velocity = DVec2::new(rng.gen_range(-12.0..12.0), rng.gen_range(-6.0..6.0));
        sim.spawn(
            EntityBuilder::new()
                .with(Transform { position })
                .with(PhysicsBody::new(rng.gen_range(0.5..3.0), 25.0)?.with_velocity(velocity))
                .with(Collider::new(1.0, 1.0)?)
                .with(RenderMeta::textured("ball"))
                .behavior(ball_behavior()),
        );
    }

    // Scripted input: hold `w` for one second out of every four.
    sim.input().bind("w", None, None);
    let keys = sim.input().clone();
    let frames = options.frames;
    let frame_rate = sim.config().frame_rate as u64;
    sim.add_frame_hook("script", move |ctx| {
        let phase = ctx.frame() % (4 * frame_rate);
        if phase == 0 {
            keys.press("w");
        } else if phase == frame_rate {
            keys.release("w");
        }
        if ctx.frame() >= frames {
            ctx.request_stop();
        }
        Ok(())
    });

    let summary = if options.headless {
        let summary = sim.run(NullRenderer::default())?;
        println!("final state {}", sim.state_hash()?);
        summary
    } else {
        // Walls clip the texture to their own hitbox, so one big block fits all.
        let brick = "#".repeat(w as usize + 2);
        let wall_rows = vec![brick.as_str(); h as usize + 2];
        let renderer = TextRenderer::new(io::stdout().lock())
            .with_texture("ball", &["o"])
            .with_texture("hit", &["*"])
            .with_texture("wall", &wall_rows);
        sim.run(renderer)?
    };

    println!(
        "{} frames, {} steps, {} hook failures, {:.3}s dropped, {:.2?} wall time",
        summary.frames, summary.steps, summary.failures, summary.dropped, summary.wall_time
    );
    Ok(())
}
