//! Component records.
//!
//! Components are plain data. The set of kinds is closed: an entity carries
//! at most one of each, held in the optional slots of
//! [`EntityRecord`](crate::world::EntityRecord). Behavior callbacks are the
//! fifth kind; they live with the simulation that invokes them, so this crate
//! only names them in [`ComponentKind`].

use std::fmt;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Tag for each component kind an entity can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Transform,
    Physics,
    Collider,
    Render,
    Behavior,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Transform => "transform",
            ComponentKind::Physics => "physics",
            ComponentKind::Collider => "collider",
            ComponentKind::Render => "render",
            ComponentKind::Behavior => "behavior",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// World-space position. For entities with a collider this is the
/// bottom-left corner of the hitbox.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub position: DVec2,
}

impl Transform {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: DVec2::new(x, y),
        }
    }
}

// ---------------------------------------------------------------------------
// PhysicsBody
// ---------------------------------------------------------------------------

/// Rigid-body state integrated once per fixed step.
///
/// Mass and limits are validated on construction and cannot be changed
/// afterwards without going through a checked setter, so resolution code can
/// divide by mass unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPhysicsBody")]
pub struct PhysicsBody {
    mass: f64,
    pub velocity: DVec2,
    pub acceleration: DVec2,
    velocity_limit: f64,
    acceleration_limit: Option<f64>,
}

impl PhysicsBody {
    /// Create a body at rest.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidMass`] if `mass` is not a positive finite number,
    /// [`EcsError::InvalidLimit`] if `velocity_limit` is negative or not finite.
    pub fn new(mass: f64, velocity_limit: f64) -> Result<Self, EcsError> {
        check_mass(mass)?;
        check_limit("velocity_limit", velocity_limit)?;
        Ok(Self {
            mass,
            velocity: DVec2::ZERO,
            acceleration: DVec2::ZERO,
            velocity_limit,
            acceleration_limit: None,
        })
    }

    pub fn with_velocity(mut self, velocity: DVec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_acceleration(mut self, acceleration: DVec2) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Cap the magnitude of acceleration before it is applied.
    pub fn with_acceleration_limit(mut self, limit: f64) -> Result<Self, EcsError> {
        check_limit("acceleration_limit", limit)?;
        self.acceleration_limit = Some(limit);
        Ok(self)
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn inverse_mass(&self) -> f64 {
        1.0 / self.mass
    }

    pub fn velocity_limit(&self) -> f64 {
        self.velocity_limit
    }

    pub fn acceleration_limit(&self) -> Option<f64> {
        self.acceleration_limit
    }

    pub fn set_mass(&mut self, mass: f64) -> Result<(), EcsError> {
        check_mass(mass)?;
        self.mass = mass;
        Ok(())
    }

    pub fn set_velocity_limit(&mut self, limit: f64) -> Result<(), EcsError> {
        check_limit("velocity_limit", limit)?;
        self.velocity_limit = limit;
        Ok(())
    }

    /// Momentum `m * v`.
    pub fn momentum(&self) -> DVec2 {
        self.velocity * self.mass
    }
}

fn check_mass(mass: f64) -> Result<(), EcsError> {
    if mass > 0.0 && mass.is_finite() {
        Ok(())
    } else {
        Err(EcsError::InvalidMass { mass })
    }
}

fn check_limit(field: &'static str, value: f64) -> Result<(), EcsError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(EcsError::InvalidLimit { field, value })
    }
}

/// Unvalidated wire form of [`PhysicsBody`].
#[derive(Deserialize)]
struct RawPhysicsBody {
    mass: f64,
    #[serde(default)]
    velocity: DVec2,
    #[serde(default)]
    acceleration: DVec2,
    velocity_limit: f64,
    #[serde(default)]
    acceleration_limit: Option<f64>,
}

impl TryFrom<RawPhysicsBody> for PhysicsBody {
    type Error = EcsError;

    fn try_from(raw: RawPhysicsBody) -> Result<Self, Self::Error> {
        let body = PhysicsBody::new(raw.mass, raw.velocity_limit)?
            .with_velocity(raw.velocity)
            .with_acceleration(raw.acceleration);
        match raw.acceleration_limit {
            Some(limit) => body.with_acceleration_limit(limit),
            None => Ok(body),
        }
    }
}

// ---------------------------------------------------------------------------
// Collider
// ---------------------------------------------------------------------------

/// Axis-aligned hitbox anchored at the transform's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCollider")]
pub struct Collider {
    size: DVec2,
    /// Whether the entity takes part in collision resolution.
    pub enabled: bool,
}

impl Collider {
    /// # Errors
    ///
    /// [`EcsError::InvalidHitbox`] if either dimension is negative or not finite.
    pub fn new(width: f64, height: f64) -> Result<Self, EcsError> {
        let valid = |v: f64| v >= 0.0 && v.is_finite();
        if !valid(width) || !valid(height) {
            return Err(EcsError::InvalidHitbox { width, height });
        }
        Ok(Self {
            size: DVec2::new(width, height),
            enabled: true,
        })
    }

    /// Same hitbox, excluded from collision resolution.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn size(&self) -> DVec2 {
        self.size
    }

    pub fn width(&self) -> f64 {
        self.size.x
    }

    pub fn height(&self) -> f64 {
        self.size.y
    }
}

#[derive(Deserialize)]
struct RawCollider {
    width: f64,
    height: f64,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl TryFrom<RawCollider> for Collider {
    type Error = EcsError;

    fn try_from(raw: RawCollider) -> Result<Self, Self::Error> {
        let mut collider = Collider::new(raw.width, raw.height)?;
        collider.enabled = raw.enabled;
        Ok(collider)
    }
}

// ---------------------------------------------------------------------------
// RenderMeta
// ---------------------------------------------------------------------------

/// What the renderer needs to draw an entity. No behavior here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderMeta {
    pub visible: bool,
    /// Lower values are drawn first.
    pub draw_priority: i32,
    pub texture_id: Option<String>,
}

impl Default for RenderMeta {
    fn default() -> Self {
        Self {
            visible: true,
            draw_priority: 0,
            texture_id: None,
        }
    }
}

impl RenderMeta {
    pub fn textured(texture_id: impl Into<String>) -> Self {
        Self {
            texture_id: Some(texture_id.into()),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, draw_priority: i32) -> Self {
        self.draw_priority = draw_priority;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_must_be_positive() {
        assert!(matches!(
            PhysicsBody::new(0.0, 1.0),
            Err(EcsError::InvalidMass { .. })
        ));
        assert!(matches!(
            PhysicsBody::new(-2.0, 1.0),
            Err(EcsError::InvalidMass { .. })
        ));
        assert!(PhysicsBody::new(f64::NAN, 1.0).is_err());
        assert!(PhysicsBody::new(f64::INFINITY, 1.0).is_err());
        assert!(PhysicsBody::new(0.5, 1.0).is_ok());
    }

    #[test]
    fn velocity_limit_must_be_non_negative() {
        assert!(matches!(
            PhysicsBody::new(1.0, -1.0),
            Err(EcsError::InvalidLimit { field: "velocity_limit", .. })
        ));
        assert!(PhysicsBody::new(1.0, 0.0).is_ok());
    }

    #[test]
    fn setters_keep_invariants() {
        let mut body = PhysicsBody::new(2.0, 3.0).unwrap();
        assert!(body.set_mass(0.0).is_err());
        assert_eq!(body.mass(), 2.0);
        body.set_mass(4.0).unwrap();
        assert_eq!(body.inverse_mass(), 0.25);
        assert!(body.set_velocity_limit(f64::NAN).is_err());
        assert_eq!(body.velocity_limit(), 3.0);
    }

    #[test]
    fn builder_sets_motion_state() {
        let body = PhysicsBody::new(2.0, 10.0)
            .unwrap()
            .with_velocity(DVec2::new(1.0, -1.0))
            .with_acceleration(DVec2::new(0.0, -9.8))
            .with_acceleration_limit(5.0)
            .unwrap();
        assert_eq!(body.momentum(), DVec2::new(2.0, -2.0));
        assert_eq!(body.acceleration_limit(), Some(5.0));
    }

    #[test]
    fn collider_rejects_negative_size() {
        assert!(Collider::new(-1.0, 1.0).is_err());
        assert!(Collider::new(1.0, f64::INFINITY).is_err());
        let c = Collider::new(0.0, 0.0).unwrap();
        assert!(c.enabled);
        assert!(!c.disabled().enabled);
    }

    #[test]
    fn deserialize_validates_mass() {
        let bad = serde_json::json!({"mass": 0.0, "velocity_limit": 1.0});
        assert!(serde_json::from_value::<PhysicsBody>(bad).is_err());

        let good = serde_json::json!({
            "mass": 1.5,
            "velocity": [1.0, 2.0],
            "velocity_limit": 4.0
        });
        let body: PhysicsBody = serde_json::from_value(good).unwrap();
        assert_eq!(body.mass(), 1.5);
        assert_eq!(body.velocity, DVec2::new(1.0, 2.0));
        assert_eq!(body.acceleration, DVec2::ZERO);
    }

    #[test]
    fn deserialize_collider_defaults_to_enabled() {
        let c: Collider = serde_json::from_value(serde_json::json!({"width": 2.0, "height": 1.0}))
            .unwrap();
        assert!(c.enabled);
        assert_eq!(c.size(), DVec2::new(2.0, 1.0));
    }

    #[test]
    fn render_meta_defaults() {
        let meta = RenderMeta::default();
        assert!(meta.visible);
        assert_eq!(meta.draw_priority, 0);
        assert!(meta.texture_id.is_none());
        let tex = RenderMeta::textured("wall").with_priority(-1);
        assert_eq!(tex.texture_id.as_deref(), Some("wall"));
        assert_eq!(tex.draw_priority, -1);
    }

    #[test]
    fn kind_display_names() {
        assert_eq!(ComponentKind::Collider.to_string(), "collider");
        assert_eq!(ComponentKind::Behavior.to_string(), "behavior");
    }
}
