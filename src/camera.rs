use glam::{Mat4, Vec3};

const CAMERA_START: Vec3 = Vec3::new(3.0, 2.0, 4.0);
const CAMERA_FOV_DEGREES: f32 = 60.0;
const CAMERA_NEAR: f32 = 0.1;
const CAMERA_FAR: f32 = 100.0;
// Orbit controls
const ORBIT_ROTATE_SPEED: f32 = 0.005; // radians per pixel dragged
const ORBIT_ZOOM_SPEED: f32 = 0.95; // distance multiplier per wheel line
const ORBIT_DAMPING: f32 = 0.05; // fraction of velocity kept per 60 Hz frame is 1 - this
const ORBIT_MIN_DISTANCE: f32 = 1.0;
const ORBIT_MAX_DISTANCE: f32 = 40.0;
const ORBIT_PITCH_LIMIT: f32 = 1.55;
const REFERENCE_FRAME: f32 = 1.0 / 60.0;

/// Perspective camera. Projection is rebuilt whenever aspect changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    projection: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Camera {
    pub fn new(aspect: f32) -> Self {
        let mut camera = Self {
            position: CAMERA_START,
            target: Vec3::ZERO,
            fov: CAMERA_FOV_DEGREES.to_radians(),
            aspect,
            near: CAMERA_NEAR,
            far: CAMERA_FAR,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection();
        camera
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.update_projection();
    }

    pub fn update_projection(&mut self) {
        self.projection = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view()
    }
}

/// Damped orbit around the camera target. Input adds angular velocity, which
/// decays every tick, so releasing the mouse lets the camera glide to a stop.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    yaw: f32,
    pitch: f32,
    distance: f32,
    yaw_velocity: f32,
    pitch_velocity: f32,
    dragging: bool,
    last_cursor: Option<(f32, f32)>,
}

impl OrbitControls {
    /// Start from wherever the camera currently sits.
    pub fn from_camera(camera: &Camera) -> Self {
        let offset = camera.position - camera.target;
        let distance = offset.length().max(ORBIT_MIN_DISTANCE);
        Self {
            yaw: offset.x.atan2(offset.z),
            pitch: (offset.y / distance).clamp(-1.0, 1.0).asin(),
            distance,
            yaw_velocity: 0.0,
            pitch_velocity: 0.0,
            dragging: false,
            last_cursor: None,
        }
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
        if !dragging {
            self.last_cursor = None;
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn cursor_moved(&mut self, x: f32, y: f32) {
        if self.dragging {
            if let Some((last_x, last_y)) = self.last_cursor {
                self.rotate(x - last_x, y - last_y);
            }
        }
        self.last_cursor = Some((x, y));
    }

    /// Queue a rotation in screen pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw_velocity -= dx * ORBIT_ROTATE_SPEED;
        self.pitch_velocity += dy * ORBIT_ROTATE_SPEED;
    }

    /// Positive lines zoom in.
    pub fn zoom(&mut self, lines: f32) {
        self.distance = (self.distance * ORBIT_ZOOM_SPEED.powf(lines))
            .clamp(ORBIT_MIN_DISTANCE, ORBIT_MAX_DISTANCE);
    }

    pub fn update(&mut self, camera: &mut Camera, dt: f32) {
        self.yaw += self.yaw_velocity;
        self.pitch = (self.pitch + self.pitch_velocity).clamp(-ORBIT_PITCH_LIMIT, ORBIT_PITCH_LIMIT);

        let keep = (1.0 - ORBIT_DAMPING).powf(dt / REFERENCE_FRAME);
        self.yaw_velocity *= keep;
        self.pitch_velocity *= keep;

        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let offset = Vec3::new(sin_yaw * cos_pitch, sin_pitch, cos_yaw * cos_pitch) * self.distance;
        camera.position = camera.target + offset;
    }
}
