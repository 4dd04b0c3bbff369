//! The tick pipeline, independent of any window or GPU.
//!
//! The host calls [`DemoCore::frame`] once per display refresh with its monotonic
//! timestamp. The core runs clock, animator and camera to completion, hands the
//! result to the [`RenderDriver`], and answers whether the host should schedule
//! another tick.

use glam::Vec3;

use crate::animator::Animator;
use crate::camera::{Camera, OrbitControls};
use crate::clock::{Clock, FrameTime};
use crate::params::{unpack_rgb, ParamId, ParameterStore, Preset};
use crate::scene::{EntityId, Scene, Transform};
use crate::viewport::{RenderOutput, ViewportManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// Draws one frame of the current scene. Failures are the driver's business; a
/// driver that can no longer draw reports it through `is_fatal`.
pub trait RenderDriver {
    fn draw(&mut self, camera: &Camera, scene: &Scene);

    fn is_fatal(&self) -> bool {
        false
    }
}

/// Route one-shot parameters straight into the scene.
pub fn wire_scene_listeners(params: &mut ParameterStore<Scene>) {
    params.on_change(ParamId::BallSize, |scene, v| scene.set_ball_size(v));
    params.on_change(ParamId::GroundSize, |scene, v| scene.set_ground_size(v));
    params.on_change(ParamId::LightIntensity, |scene, v| scene.spot.intensity = v);
    params.on_change(ParamId::LightAngle, |scene, v| scene.spot.angle = v);
    params.on_change(ParamId::LightPenumbra, |scene, v| scene.spot.penumbra = v);
    params.on_change(ParamId::LightColor, |scene, v| scene.spot.color = unpack_rgb(v));
}

pub struct DemoCore {
    pub params: ParameterStore<Scene>,
    pub scene: Scene,
    pub camera: Camera,
    pub controls: OrbitControls,
    pub viewport: ViewportManager,
    clock: Clock,
    animator: Animator,
    preset: Preset,
    running: bool,
    frame_count: u64,
    last_frame: FrameTime,
}

impl DemoCore {
    pub fn new(preset: Preset, start_timestamp: f64) -> Self {
        Self::with_clock(preset, Clock::new(start_timestamp), ViewportManager::default())
    }

    pub fn with_clock(preset: Preset, clock: Clock, viewport: ViewportManager) -> Self {
        let mut params = ParameterStore::new(preset);
        wire_scene_listeners(&mut params);

        let mut scene = Scene::new();
        params.notify_all(&mut scene);

        let camera = Camera::new(1.0);
        let controls = OrbitControls::from_camera(&camera);

        Self {
            params,
            scene,
            camera,
            controls,
            viewport,
            clock,
            animator: Animator::new(),
            preset,
            running: true,
            frame_count: 0,
            last_frame: FrameTime { dt: 0.0, elapsed: 0.0 },
        }
    }

    /// One tick: clock, animation, camera, draw.
    pub fn frame(&mut self, now: f64, driver: &mut dyn RenderDriver) -> LoopControl {
        if !self.running {
            return LoopControl::Stop;
        }

        let frame = self.clock.tick(now);
        self.animator.update(frame, &self.params, &mut self.scene);
        self.controls.update(&mut self.camera, frame.dt);
        self.last_frame = frame;
        self.frame_count += 1;

        driver.draw(&self.camera, &self.scene);

        if driver.is_fatal() {
            log::error!("render driver failed; stopping after frame {}", self.frame_count);
            self.running = false;
            return LoopControl::Stop;
        }
        LoopControl::Continue
    }

    /// First resize after the render output exists. Always reaches the output,
    /// even if a size was recorded earlier, so surface and camera agree before
    /// the first draw.
    pub fn start<O: RenderOutput + ?Sized>(
        &mut self,
        physical_width: u32,
        physical_height: u32,
        scale_factor: f64,
        output: &mut O,
    ) {
        self.viewport.invalidate();
        self.viewport
            .on_physical_resize(physical_width, physical_height, scale_factor, &mut self.camera, output);
    }

    /// Host resize in logical pixels.
    pub fn resize<O: RenderOutput + ?Sized>(&mut self, width: f32, height: f32, pixel_ratio: f32, output: &mut O) {
        self.viewport.on_resize(width, height, pixel_ratio, &mut self.camera, output);
    }

    /// Entry point for the parameter UI.
    pub fn set_param(&mut self, id: ParamId, value: f32) -> f32 {
        self.params.set(id, value, &mut self.scene)
    }

    /// Completion step for the ball load: attach it at its resting height and let
    /// the one-shot size parameter reach it.
    pub fn attach_ball(&mut self) -> EntityId {
        let rest = Vec3::new(0.0, self.params.get(ParamId::BaseHeight), 0.0);
        let id = self.scene.attach_ball(Transform::from_position(rest));
        self.params.notify(ParamId::BallSize, &mut self.scene);
        log::info!("ball attached as entity {:?}", id);
        id
    }

    /// Outcome of the ball load. On success the ball is attached and the payload
    /// handed back for upload; on failure the error is logged, the ball stays
    /// absent, and ticks carry on without it.
    pub fn ball_loaded<P, E: std::fmt::Display>(&mut self, path: &str, result: Result<P, E>) -> Option<P> {
        match result {
            Ok(payload) => {
                self.attach_ball();
                Some(payload)
            }
            Err(e) => {
                log::error!("failed to load ball from {path}: {e}");
                None
            }
        }
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn preset(&self) -> Preset {
        self.preset
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn last_frame(&self) -> FrameTime {
        self.last_frame
    }
}

/// Drive the core from a list of host timestamps until it asks to stop.
/// Returns the number of ticks that ran.
pub fn drive<I>(core: &mut DemoCore, driver: &mut dyn RenderDriver, timestamps: I) -> usize
where
    I: IntoIterator<Item = f64>,
{
    let mut ticks = 0;
    for now in timestamps {
        let control = core.frame(now, driver);
        ticks += 1;
        if control == LoopControl::Stop {
            break;
        }
    }
    ticks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingDriver {
        draws: usize,
        fail_after: Option<usize>,
    }

    impl RenderDriver for CountingDriver {
        fn draw(&mut self, _camera: &Camera, _scene: &Scene) {
            self.draws += 1;
        }

        fn is_fatal(&self) -> bool {
            self.fail_after.is_some_and(|n| self.draws >= n)
        }
    }

    #[test]
    fn test_each_tick_draws_once() {
        let mut core = DemoCore::new(Preset::Marble, 0.0);
        let mut driver = CountingDriver::default();
        let ticks = drive(&mut core, &mut driver, (1..=30).map(|i| i as f64 * 16.0));
        assert_eq!(ticks, 30);
        assert_eq!(driver.draws, 30);
        assert_eq!(core.frame_count(), 30);
    }

    #[test]
    fn test_fatal_driver_stops_loop() {
        let mut core = DemoCore::new(Preset::Marble, 0.0);
        let mut driver = CountingDriver { draws: 0, fail_after: Some(3) };
        let ticks = drive(&mut core, &mut driver, (1..=10).map(|i| i as f64 * 16.0));
        assert_eq!(ticks, 3);
        assert!(!core.is_running());
        assert_eq!(core.frame(1000.0, &mut driver), LoopControl::Stop);
        assert_eq!(driver.draws, 3);
    }

    #[test]
    fn test_one_shot_params_reach_scene() {
        let mut core = DemoCore::new(Preset::Golf, 0.0);
        core.set_param(ParamId::LightColor, 0xFF_00_00 as f32);
        core.set_param(ParamId::LightIntensity, 12.0);
        core.set_param(ParamId::GroundSize, 10.0);
        assert_eq!(core.scene.spot.color, [1.0, 0.0, 0.0]);
        assert_eq!(core.scene.spot.intensity, 12.0);
        assert_eq!(core.scene.ground().transform.scale, Vec3::new(10.0, 10.0, 1.0));
    }

    #[test]
    fn test_defaults_applied_at_startup() {
        let core = DemoCore::new(Preset::Marble, 0.0);
        assert_eq!(core.scene.ground().transform.scale, Vec3::new(8.0, 8.0, 1.0));
        assert_eq!(core.scene.spot.intensity, 7.5);
    }

    #[test]
    fn test_failed_ball_load_keeps_ball_absent() {
        let mut core = DemoCore::new(Preset::Golf, 0.0);
        let payload: Option<()> = core.ball_loaded("models/golf_ball.glb", Err("HTTP 404"));
        assert!(payload.is_none());
        assert!(core.scene.ball().is_none());
        assert_eq!(core.scene.spot.target, None);

        let loaded = core.ball_loaded("sphere", Ok::<_, String>(7));
        assert_eq!(loaded, Some(7));
        assert!(core.scene.ball().is_some());
    }

    #[test]
    fn test_attach_applies_current_size() {
        let mut core = DemoCore::new(Preset::Marble, 0.0);
        core.set_param(ParamId::BallSize, 1.5);
        core.attach_ball();
        assert_eq!(core.scene.ball().map(|b| b.transform.scale), Some(Vec3::splat(1.5)));
        assert_eq!(core.scene.ball().map(|b| b.transform.position.y), Some(3.4));
    }
}
