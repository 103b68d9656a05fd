//! Damped spring integrator for a single bone.
//!
//! The physics position lives in world space so that root motion drags the
//! bone behind it. Integration is semi-implicit Euler; the accumulated delta is
//! clamped to [`PhysicsConfig::max_delta`] and split into sub-steps no longer
//! than [`PhysicsConfig::max_substep`]. This is an approximation chosen for
//! stability on frame hitches, not an exact reproduction of any reference solver.

use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Offsets closer than this are treated as the same rest offset.
const REST_EPSILON: f32 = 1.0e-4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub max_delta: f32,
    pub max_substep: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            max_delta: 0.05,
            max_substep: 1.0 / 60.0,
        }
    }
}

/// Per-instance spring state carried across ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct SpringContext {
    pub rest_offset: Vector3<f32>,
    pub physics_position_ws: Point3<f32>,
    pub velocity: Vector3<f32>,
    /// Time accumulated by `advance_time` since the last integration.
    pub delta_time: f32,
    pub initialized: bool,
}

impl Default for SpringContext {
    fn default() -> Self {
        SpringContext {
            rest_offset: Vector3::zeros(),
            physics_position_ws: Point3::origin(),
            velocity: Vector3::zeros(),
            delta_time: 0.0,
            initialized: false,
        }
    }
}

impl SpringContext {
    pub fn advance(&mut self, dt: f32) {
        if dt.is_finite() && dt > 0.0 {
            self.delta_time += dt;
        }
    }
}

pub struct SpringPhysicsJob<'a> {
    pub stiffness: f32,
    pub damping: f32,
    pub mass: f32,
    pub gravity: Vector3<f32>,
    /// Model-space transform of the bone.
    pub bone_transform: &'a Matrix4<f32>,
    /// Model-space transform of the bone's parent.
    pub parent_transform: &'a Matrix4<f32>,
    /// World-space transform of the actor root.
    pub root_transform: &'a Matrix4<f32>,
    pub config: PhysicsConfig,
    pub context: &'a mut SpringContext,
    /// Local-space translation written for the bone.
    pub position_output: &'a mut Vector3<f32>,
}

impl SpringPhysicsJob<'_> {
    /// Advance the spring by the accumulated delta and write the bone's new
    /// local offset. Returns `false` (leaving output and state untouched) when
    /// the parameters or transforms are degenerate.
    pub fn run(self) -> bool {
        let params_ok = [self.stiffness, self.damping, self.mass]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0);
        if !params_ok || !self.gravity.iter().all(|v| v.is_finite()) {
            return false;
        }
        let Some(parent_inv) = self.parent_transform.try_inverse() else {
            return false;
        };
        let parent_ws = self.root_transform * self.parent_transform;
        let Some(parent_ws_inv) = parent_ws.try_inverse() else {
            return false;
        };

        let bone_origin = self.bone_transform.transform_point(&Point3::origin());
        let rest_offset = parent_inv.transform_point(&bone_origin).coords;
        let target_ws = self.root_transform.transform_point(&bone_origin);
        if !rest_offset.iter().all(|v| v.is_finite()) || !target_ws.coords.iter().all(|v| v.is_finite()) {
            return false;
        }

        let ctx = &mut *self.context;
        if !ctx.initialized || (ctx.rest_offset - rest_offset).norm() > REST_EPSILON {
            ctx.rest_offset = rest_offset;
            ctx.physics_position_ws = target_ws;
            ctx.velocity = Vector3::zeros();
            ctx.delta_time = 0.0;
            ctx.initialized = true;
            *self.position_output = rest_offset;
            return true;
        }

        let dt = ctx.delta_time.min(self.config.max_delta);
        let mut position = ctx.physics_position_ws;
        let mut velocity = ctx.velocity;
        if dt > 0.0 {
            let substep = self.config.max_substep.max(1.0e-4);
            let steps = (dt / substep).ceil().max(1.0) as u32;
            let h = dt / steps as f32;
            let inv_mass = 1.0 / self.mass;
            for _ in 0..steps {
                let force = (target_ws - position) * self.stiffness - velocity * self.damping
                    + self.gravity * self.mass;
                velocity += force * inv_mass * h;
                position += velocity * h;
            }
        }

        let local = parent_ws_inv.transform_point(&position).coords;
        if !local.iter().all(|v| v.is_finite()) || !velocity.iter().all(|v| v.is_finite()) {
            return false;
        }
        ctx.physics_position_ws = position;
        ctx.velocity = velocity;
        ctx.delta_time = 0.0;
        *self.position_output = local;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn translation(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    #[test]
    fn first_run_seeds_from_rest_offset() {
        let bone = translation(0.0, 0.0, 2.0);
        let parent = translation(0.0, 0.0, 1.0);
        let root = Matrix4::identity();
        let mut ctx = SpringContext::default();
        ctx.advance(0.5);
        let mut out = Vector3::zeros();
        let ok = SpringPhysicsJob {
            stiffness: 50.0,
            damping: 5.0,
            mass: 1.0,
            gravity: Vector3::zeros(),
            bone_transform: &bone,
            parent_transform: &parent,
            root_transform: &root,
            config: PhysicsConfig::default(),
            context: &mut ctx,
            position_output: &mut out,
        }
        .run();
        assert!(ok);
        assert!(ctx.initialized);
        assert_eq!(ctx.velocity, Vector3::zeros());
        assert_relative_eq!(out, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn degenerate_parent_leaves_state_untouched() {
        let bone = translation(0.0, 0.0, 2.0);
        let parent = Matrix4::zeros();
        let root = Matrix4::identity();
        let mut ctx = SpringContext::default();
        let mut out = Vector3::new(9.0, 9.0, 9.0);
        let ok = SpringPhysicsJob {
            stiffness: 50.0,
            damping: 5.0,
            mass: 1.0,
            gravity: Vector3::zeros(),
            bone_transform: &bone,
            parent_transform: &parent,
            root_transform: &root,
            config: PhysicsConfig::default(),
            context: &mut ctx,
            position_output: &mut out,
        }
        .run();
        assert!(!ok);
        assert_eq!(ctx, SpringContext::default());
        assert_eq!(out, Vector3::new(9.0, 9.0, 9.0));
    }

    #[test]
    fn root_motion_drags_bone_behind() {
        let bone = translation(0.0, 0.0, 2.0);
        let parent = translation(0.0, 0.0, 1.0);
        let mut ctx = SpringContext::default();
        let mut out = Vector3::zeros();
        let step = |root: Matrix4<f32>, ctx: &mut SpringContext, out: &mut Vector3<f32>| {
            ctx.advance(1.0 / 60.0);
            SpringPhysicsJob {
                stiffness: 50.0,
                damping: 5.0,
                mass: 1.0,
                gravity: Vector3::zeros(),
                bone_transform: &bone,
                parent_transform: &parent,
                root_transform: &root,
                config: PhysicsConfig::default(),
                context: ctx,
                position_output: out,
            }
            .run()
        };
        assert!(step(Matrix4::identity(), &mut ctx, &mut out));
        assert!(step(translation(1.0, 0.0, 0.0), &mut ctx, &mut out));
        // The physics point stayed near x = 0 while the parent moved to x = 1.
        assert!(out.x < -0.5, "expected lag, got {out:?}");
    }

    #[test]
    fn delta_is_clamped() {
        let bone = translation(0.0, 0.0, 2.0);
        let parent = translation(0.0, 0.0, 1.0);
        let root = Matrix4::identity();
        let mut ctx = SpringContext::default();
        let mut out = Vector3::zeros();
        let config = PhysicsConfig::default();
        let run = |ctx: &mut SpringContext, out: &mut Vector3<f32>, gravity| {
            SpringPhysicsJob {
                stiffness: 10.0,
                damping: 1.0,
                mass: 1.0,
                gravity,
                bone_transform: &bone,
                parent_transform: &parent,
                root_transform: &root,
                config,
                context: ctx,
                position_output: out,
            }
            .run()
        };
        assert!(run(&mut ctx, &mut out, Vector3::zeros()));
        ctx.advance(10.0);
        assert!(run(&mut ctx, &mut out, Vector3::new(0.0, 0.0, -9.8)));
        assert_eq!(ctx.delta_time, 0.0);
        // A 10 s hitch integrates like 50 ms: gravity moves the bone only slightly.
        assert!(out.z < 1.0 && out.z > 0.9, "unexpected offset {out:?}");
    }
}
