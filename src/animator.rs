//! Per-tick scene animation.
//!
//! Periodic motion (bounce, spotlight orbit) is evaluated from absolute elapsed
//! time so it never drifts with frame jitter. Ball spin is the only motion that
//! integrates `dt`, which keeps it frame-rate independent and monotonic.

use glam::{Vec2, Vec3};

use crate::clock::FrameTime;
use crate::params::{ParamId, ParameterStore};
use crate::scene::Scene;

/// Ball spin in radians per second around X and Y.
pub const BALL_SPIN_RATE: Vec2 = Vec2::new(0.6, 0.8);

/// Height of the ball's base at time `t`: a floor bounce in
/// `[base, base + amplitude]` with period `π / frequency`.
#[inline]
pub fn bounce_height(t: f32, base: f32, amplitude: f32, frequency: f32) -> f32 {
    base + (t * frequency).sin().abs() * amplitude
}

/// Spotlight position on its orbit at time `t`.
#[inline]
pub fn orbit_position(t: f32, radius: f32, speed: f32, height: f32) -> Vec3 {
    let (sin, cos) = (t * speed).sin_cos();
    Vec3::new(cos * radius, height, sin * radius)
}

#[derive(Debug, Clone)]
pub struct Animator {
    spin_rate: Vec2,
}

impl Default for Animator {
    fn default() -> Self {
        Self::new()
    }
}

impl Animator {
    pub fn new() -> Self {
        Self::with_spin_rate(BALL_SPIN_RATE)
    }

    pub fn with_spin_rate(spin_rate: Vec2) -> Self {
        Self { spin_rate }
    }

    /// Advance the scene by one tick. Mutates transforms in place and nothing else.
    pub fn update<T>(&self, frame: FrameTime, params: &ParameterStore<T>, scene: &mut Scene) {
        let t = frame.elapsed;

        scene.spot.position = orbit_position(
            t,
            params.get(ParamId::OrbitRadius),
            params.get(ParamId::OrbitSpeed),
            params.get(ParamId::OrbitHeight),
        );

        let height = bounce_height(
            t,
            params.get(ParamId::BaseHeight),
            params.get(ParamId::BounceAmplitude),
            params.get(ParamId::BounceFrequency),
        );

        // Ball still loading: the light keeps aiming at its placeholder.
        if let Some(ball) = scene.ball_mut() {
            let transform = &mut ball.transform;
            transform.position.y = height;
            transform.rotation.x += self.spin_rate.x * frame.dt;
            transform.rotation.y += self.spin_rate.y * frame.dt;

            let ball_position = transform.position;
            scene.spot.target_transform.position = ball_position;
        }

        scene.spot.refresh_direction();
    }
}
