use std::cell::RefCell;
use std::f32::consts::{FRAC_PI_4, PI};
use std::rc::Rc;

use glam::Vec3;
use wscene::camera::Camera;
use wscene::frame_loop::drive;
use wscene::viewport::OutputSize;
use wscene::{AssetError, Clock, DemoCore, LoopControl, ParamId, Preset, RenderDriver, RenderOutput, Scene, ViewportManager};

const EPS: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
struct DrawRecord {
    aspect: f32,
    ball: Option<Vec3>,
    spot: Vec3,
    target: Vec3,
}

/// Remembers what every draw call saw.
#[derive(Default)]
struct RecordingDriver {
    draws: Vec<DrawRecord>,
    fail_after: Option<usize>,
}

impl RenderDriver for RecordingDriver {
    fn draw(&mut self, camera: &Camera, scene: &Scene) {
        self.draws.push(DrawRecord {
            aspect: camera.aspect,
            ball: scene.ball().map(|b| b.transform.position),
            spot: scene.spot.position,
            target: scene.spot.target_transform.position,
        });
    }

    fn is_fatal(&self) -> bool {
        self.fail_after.is_some_and(|n| self.draws.len() >= n)
    }
}

#[derive(Default)]
struct RecordingOutput {
    sizes: Vec<OutputSize>,
}

impl RenderOutput for RecordingOutput {
    fn resize_output(&mut self, size: OutputSize) {
        self.sizes.push(size);
    }
}

fn core_at_zero(preset: Preset) -> DemoCore {
    DemoCore::with_clock(preset, Clock::new(0.0), ViewportManager::default())
}

fn frames(count: usize, step_ms: f64) -> impl Iterator<Item = f64> {
    (0..count).map(move |i| i as f64 * step_ms)
}

#[test]
fn test_ball_absent_then_attached() {
    let mut core = core_at_zero(Preset::Marble);
    let mut driver = RecordingDriver::default();

    assert_eq!(drive(&mut core, &mut driver, frames(30, 16.0)), 30);
    assert!(driver.draws.iter().all(|d| d.ball.is_none()));
    assert!(driver.draws.iter().all(|d| d.target == Vec3::ZERO));

    core.attach_ball();
    drive(&mut core, &mut driver, (30..60).map(|i| i as f64 * 16.0));

    for draw in &driver.draws[30..] {
        let ball = draw.ball.expect("ball attached");
        assert_eq!(draw.target, ball);
        assert_eq!(ball.x, 0.0);
        assert_eq!(ball.z, 0.0);
    }
}

#[test]
fn test_ball_stays_within_bounce_band() {
    let mut core = core_at_zero(Preset::Golf);
    let mut driver = RecordingDriver::default();
    core.attach_ball();

    drive(&mut core, &mut driver, frames(600, 16.6));

    let base = core.params.get(ParamId::BaseHeight);
    let amplitude = core.params.get(ParamId::BounceAmplitude);
    for draw in &driver.draws {
        let y = draw.ball.expect("ball attached").y;
        assert!(y >= base - EPS && y <= base + amplitude + EPS, "height {y} out of band");
    }
}

#[test]
fn test_peak_height_at_quarter_period() {
    let mut core = core_at_zero(Preset::Marble);
    let mut driver = RecordingDriver::default();
    core.attach_ball();

    // Marble bounces at 2 rad/s, so sin(t * 2) = 1 at t = pi/4 seconds.
    let peak_ms = (FRAC_PI_4 as f64) * 1000.0;
    core.frame(peak_ms, &mut driver);

    let ball = driver.draws[0].ball.expect("ball attached");
    assert!((ball.y - 3.6).abs() < EPS, "peak height {}", ball.y);
}

#[test]
fn test_light_starts_on_orbit_and_closes_loop() {
    let mut core = core_at_zero(Preset::Marble);
    let mut driver = RecordingDriver::default();

    core.frame(0.0, &mut driver);
    let start = driver.draws[0].spot;
    assert!((start - Vec3::new(5.0, 10.0, 0.0)).length() < EPS);

    // One full revolution at 0.5 rad/s.
    let period_ms = (2.0 * PI / 0.5) as f64 * 1000.0;
    core.frame(period_ms, &mut driver);
    let end = driver.draws[1].spot;
    assert!((end - start).length() < 1e-3, "orbit drifted to {end}");
}

#[test]
fn test_long_stall_is_clamped() {
    let mut core = core_at_zero(Preset::Marble);
    let mut driver = RecordingDriver::default();

    core.frame(16.0, &mut driver);
    core.frame(5_000.0, &mut driver);

    let frame = core.last_frame();
    assert!((frame.dt - 0.033).abs() < 1e-6);
    // Elapsed time still follows the wall clock.
    assert!((frame.elapsed - 5.0).abs() < EPS);
}

#[test]
fn test_parameter_edits_show_up_next_frame() {
    let mut core = core_at_zero(Preset::Golf);
    let mut driver = RecordingDriver::default();
    core.attach_ball();

    core.frame(0.0, &mut driver);
    assert!((driver.draws[0].ball.expect("ball").y - 3.4).abs() < EPS);

    core.set_param(ParamId::BaseHeight, 5.0);
    core.set_param(ParamId::OrbitRadius, 2.0);
    core.frame(0.0, &mut driver);

    let draw = &driver.draws[1];
    assert!((draw.ball.expect("ball").y - 5.0).abs() < EPS);
    assert!((draw.spot - Vec3::new(2.0, 10.0, 0.0)).length() < EPS);
}

#[test]
fn test_resize_updates_aspect_once() {
    let mut core = core_at_zero(Preset::Marble);
    let mut driver = RecordingDriver::default();
    let mut output = RecordingOutput::default();

    core.resize(800.0, 600.0, 1.0, &mut output);
    core.frame(0.0, &mut driver);
    core.resize(1600.0, 900.0, 1.0, &mut output);
    core.resize(1600.0, 900.0, 1.0, &mut output);
    core.frame(16.0, &mut driver);

    assert!((driver.draws[0].aspect - 4.0 / 3.0).abs() < EPS);
    assert!((driver.draws[1].aspect - 16.0 / 9.0).abs() < EPS);
    assert_eq!(
        output.sizes,
        vec![
            OutputSize { width: 800, height: 600 },
            OutputSize { width: 1600, height: 900 },
        ]
    );
}

#[test]
fn test_fatal_driver_ends_the_loop() {
    let mut core = core_at_zero(Preset::Marble);
    let mut driver = RecordingDriver {
        fail_after: Some(3),
        ..Default::default()
    };

    assert_eq!(drive(&mut core, &mut driver, frames(100, 16.0)), 3);
    assert!(!core.is_running());
    assert_eq!(core.frame(1_000.0, &mut driver), LoopControl::Stop);
    assert_eq!(driver.draws.len(), 3);
}

#[test]
fn test_failed_ball_load_keeps_ticking_without_ball() {
    let mut core = core_at_zero(Preset::Golf);
    let mut driver = RecordingDriver::default();

    let failure: Result<(), AssetError> = Err(AssetError::Fetch {
        path: "static/models/golf_ball.glb".into(),
        reason: "HTTP 404".into(),
    });
    assert!(core.ball_loaded("models/golf_ball.glb", failure).is_none());

    assert_eq!(drive(&mut core, &mut driver, frames(20, 16.0)), 20);
    assert!(core.is_running());
    assert!(core.scene.ball().is_none());
    assert!(driver.draws.iter().all(|d| d.ball.is_none() && d.target == Vec3::ZERO));
}

#[derive(Debug, Clone, PartialEq)]
enum HostCall {
    Resize(OutputSize),
    Draw,
}

/// Output and driver sharing one call log, to check ordering between them.
struct SharedLog(Rc<RefCell<Vec<HostCall>>>);

impl RenderOutput for SharedLog {
    fn resize_output(&mut self, size: OutputSize) {
        self.0.borrow_mut().push(HostCall::Resize(size));
    }
}

impl RenderDriver for SharedLog {
    fn draw(&mut self, _camera: &Camera, _scene: &Scene) {
        self.0.borrow_mut().push(HostCall::Draw);
    }
}

#[test]
fn test_startup_resize_precedes_first_draw() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut output = SharedLog(calls.clone());
    let mut driver = SharedLog(calls.clone());
    let mut core = core_at_zero(Preset::Marble);

    // A size seen before startup must not suppress the startup push.
    core.resize(1280.0, 800.0, 2.0, &mut RecordingOutput::default());
    core.start(2560, 1600, 2.0, &mut output);
    core.frame(16.0, &mut driver);

    assert_eq!(
        *calls.borrow(),
        vec![HostCall::Resize(OutputSize { width: 2560, height: 1600 }), HostCall::Draw]
    );
    assert!((core.camera.aspect - 1.6).abs() < EPS);
}
