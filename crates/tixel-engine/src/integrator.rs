//! Semi-implicit Euler integration with speed clamping.
//!
//! Per body and step:
//!
//! 1. if the body has an acceleration limit, the applied acceleration is
//!    clamped to it (the stored value is left alone);
//! 2. `velocity += acceleration * dt`;
//! 3. `velocity` is rescaled to the body's velocity limit if it exceeds it;
//! 4. `position += velocity * dt * axis_scale`.
//!
//! Acceleration is never reset here. Game code owns it.

use glam::DVec2;
use tixel_ecs::prelude::*;

/// Scale `v` down to `limit` if it is longer, keeping its direction.
pub fn clamp_magnitude(v: DVec2, limit: f64) -> DVec2 {
    let len = v.length();
    if len > limit {
        v * (limit / len)
    } else {
        v
    }
}

/// Advance one body by `dt`.
pub fn integrate_body(transform: &mut Transform, body: &mut PhysicsBody, dt: f64, axis_scale: DVec2) {
    let acceleration = match body.acceleration_limit() {
        Some(limit) => clamp_magnitude(body.acceleration, limit),
        None => body.acceleration,
    };
    body.velocity = clamp_magnitude(body.velocity + acceleration * dt, body.velocity_limit());
    transform.position += body.velocity * dt * axis_scale;
}

/// Integrate every entity that has both a transform and a physics body.
/// Returns how many were advanced.
pub fn integrate(world: &mut World, dt: f64, axis_scale: DVec2) -> usize {
    let mut count = 0;
    for (_, record) in world.iter_mut() {
        if let (Some(transform), Some(body)) = (record.transform.as_mut(), record.physics.as_mut()) {
            integrate_body(transform, body, dt, axis_scale);
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mover(v: DVec2, a: DVec2, limit: f64) -> EntityRecord {
        EntityRecord::new()
            .with(Transform::new(0.0, 0.0))
            .with(
                PhysicsBody::new(1.0, limit)
                    .unwrap()
                    .with_velocity(v)
                    .with_acceleration(a),
            )
    }

    #[test]
    fn speed_is_clamped_without_turning() {
        let mut world = World::new();
        let e = world.spawn(mover(DVec2::new(10.0, 0.0), DVec2::ZERO, 5.0));
        integrate(&mut world, 0.1, DVec2::ONE);
        let v = world.physics(e).unwrap().velocity;
        assert_eq!(v, DVec2::new(5.0, 0.0));
        assert!((world.transform(e).unwrap().position.x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn velocity_updates_before_position() {
        let mut world = World::new();
        let e = world.spawn(mover(DVec2::ZERO, DVec2::new(0.0, -10.0), 100.0));
        integrate(&mut world, 0.5, DVec2::ONE);
        assert_eq!(world.physics(e).unwrap().velocity, DVec2::new(0.0, -5.0));
        assert_eq!(world.transform(e).unwrap().position, DVec2::new(0.0, -2.5));
        // Acceleration survives the step.
        assert_eq!(world.physics(e).unwrap().acceleration, DVec2::new(0.0, -10.0));
    }

    #[test]
    fn zero_limit_pins_the_body() {
        let mut world = World::new();
        let e = world.spawn(mover(DVec2::new(3.0, 4.0), DVec2::new(1.0, 1.0), 0.0));
        integrate(&mut world, 1.0, DVec2::ONE);
        assert_eq!(world.physics(e).unwrap().velocity, DVec2::ZERO);
        assert_eq!(world.transform(e).unwrap().position, DVec2::ZERO);
    }

    #[test]
    fn zero_velocity_stays_finite() {
        let v = clamp_magnitude(DVec2::ZERO, 0.0);
        assert_eq!(v, DVec2::ZERO);
        assert!(v.is_finite());
    }

    #[test]
    fn acceleration_limit_clamps_applied_value_only() {
        let mut world = World::new();
        let body = PhysicsBody::new(1.0, 100.0)
            .unwrap()
            .with_acceleration(DVec2::new(0.0, 20.0))
            .with_acceleration_limit(2.0)
            .unwrap();
        let e = world.spawn(EntityRecord::new().with(Transform::new(0.0, 0.0)).with(body));
        integrate(&mut world, 1.0, DVec2::ONE);
        let body = world.physics(e).unwrap();
        assert!((body.velocity - DVec2::new(0.0, 2.0)).length() < 1e-12);
        assert_eq!(body.acceleration, DVec2::new(0.0, 20.0));
    }

    #[test]
    fn axis_scale_scales_displacement_not_velocity() {
        let mut world = World::new();
        let e = world.spawn(mover(DVec2::new(2.0, 2.0), DVec2::ZERO, 10.0));
        integrate(&mut world, 1.0, DVec2::new(1.0, 0.5));
        assert_eq!(world.transform(e).unwrap().position, DVec2::new(2.0, 1.0));
        assert_eq!(world.physics(e).unwrap().velocity, DVec2::new(2.0, 2.0));
    }

    #[test]
    fn counts_only_complete_bodies() {
        let mut world = World::new();
        world.spawn(mover(DVec2::X, DVec2::ZERO, 1.0));
        world.spawn(EntityRecord::new().with(Transform::new(0.0, 0.0)));
        world.spawn(EntityRecord::new().with(PhysicsBody::new(1.0, 1.0).unwrap()));
        assert_eq!(integrate(&mut world, 0.1, DVec2::ONE), 1);
    }
}
