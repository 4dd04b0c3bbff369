//! Scene graph state: the ground, the (eventually loaded) ball, and the lights.
//!
//! Entities live in a flat list addressed by [`EntityId`]. The ball is absent
//! until its asset finishes loading, so it is held as an `Option<EntityId>` and
//! every consumer has to handle the not-yet-loaded case.

use glam::{EulerRot, Mat4, Quat, Vec3};

pub const GROUND_UV_REPEAT: f32 = 4.0;
pub const BALL_UV_REPEAT: f32 = 1.0;
const SPOT_DISTANCE: f32 = 30.0;
const SPOT_DECAY: f32 = 1.0;
const SPOT_START_POSITION: Vec3 = Vec3::new(0.0, 10.0, 0.0);
const AMBIENT_INTENSITY: f32 = 0.5;
const BALL_ROUGHNESS: f32 = 0.7;
const GROUND_ROUGHNESS: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    /// Euler angles in radians, applied X then Y then Z.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z);
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(u32);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Ground,
    Ball,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub kind: EntityKind,
    pub transform: Transform,
    pub uv_repeat: f32,
    /// Scales the roughness map.
    pub roughness: f32,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: [f32; 3],
    pub intensity: f32,
}

/// Shadow map parameters for the spotlight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    pub map_size: u32,
    /// Depth offset applied in light clip space. Negative pulls receivers toward the light.
    pub bias: f32,
    /// World-space offset along the receiver normal before projecting.
    pub normal_bias: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            map_size: 2048,
            bias: -0.0006,
            normal_bias: 0.02,
            near: 0.5,
            far: SPOT_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    /// Entity the light follows. `None` while the ball is still loading.
    pub target: Option<EntityId>,
    /// Independent transform the light aims at. Holds the placeholder origin until
    /// the animator starts copying the ball's position into it.
    pub target_transform: Transform,
    /// Unit vector from `position` toward the target, refreshed every tick.
    pub direction: Vec3,
    pub intensity: f32,
    /// Cone half-angle in radians.
    pub angle: f32,
    pub penumbra: f32,
    pub color: [f32; 3],
    pub distance: f32,
    pub decay: f32,
    pub shadow: ShadowSettings,
}

impl Default for SpotLight {
    fn default() -> Self {
        let mut light = Self {
            position: SPOT_START_POSITION,
            target: None,
            target_transform: Transform::default(),
            direction: Vec3::NEG_Y,
            intensity: 7.5,
            angle: std::f32::consts::PI / 9.0,
            penumbra: 0.25,
            color: [1.0, 1.0, 1.0],
            distance: SPOT_DISTANCE,
            decay: SPOT_DECAY,
            shadow: ShadowSettings::default(),
        };
        light.refresh_direction();
        light
    }
}

impl SpotLight {
    /// Recompute the aim from the current position and target transform.
    pub fn refresh_direction(&mut self) {
        self.direction = (self.target_transform.position - self.position).normalize_or(Vec3::NEG_Y);
    }

    /// Cosines of the inner and outer cone edges, as the shader consumes them.
    pub fn cone_cosines(&self) -> (f32, f32) {
        let outer = self.angle;
        let inner = outer * (1.0 - self.penumbra.clamp(0.0, 1.0));
        (inner.cos(), outer.cos())
    }

    /// View-projection of the shadow camera: a square frustum covering the full
    /// cone, looking along `direction`.
    pub fn shadow_view_proj(&self) -> Mat4 {
        let fov = (self.angle * 2.0).clamp(0.01, std::f32::consts::PI - 0.01);
        let projection = Mat4::perspective_rh(fov, 1.0, self.shadow.near, self.shadow.far);
        // look_at degenerates when the aim is parallel to the up vector.
        let up = if self.direction.dot(Vec3::Y).abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_at_rh(self.position, self.position + self.direction, up);
        projection * view
    }
}

#[derive(Debug, Clone)]
pub struct Scene {
    entities: Vec<Entity>,
    ground: EntityId,
    ball: Option<EntityId>,
    pub spot: SpotLight,
    pub ambient: AmbientLight,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Build the synchronous part of the scene: ground plane and lights.
    pub fn new() -> Self {
        let ground = Entity {
            kind: EntityKind::Ground,
            transform: Transform {
                rotation: Vec3::new(-std::f32::consts::FRAC_PI_2, 0.0, 0.0),
                ..Default::default()
            },
            uv_repeat: GROUND_UV_REPEAT,
            roughness: GROUND_ROUGHNESS,
            cast_shadow: false,
            receive_shadow: true,
        };

        Self {
            entities: vec![ground],
            ground: EntityId(0),
            ball: None,
            spot: SpotLight::default(),
            ambient: AmbientLight {
                color: [1.0, 1.0, 1.0],
                intensity: AMBIENT_INTENSITY,
            },
        }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.index())
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id.index())
    }

    pub fn ground(&self) -> &Entity {
        &self.entities[self.ground.index()]
    }

    pub fn ground_mut(&mut self) -> &mut Entity {
        &mut self.entities[self.ground.index()]
    }

    pub fn ball_id(&self) -> Option<EntityId> {
        self.ball
    }

    pub fn ball(&self) -> Option<&Entity> {
        self.ball.and_then(|id| self.get(id))
    }

    pub fn ball_mut(&mut self) -> Option<&mut Entity> {
        let id = self.ball?;
        self.entities.get_mut(id.index())
    }

    /// Attach the loaded ball and make it the spotlight's target.
    ///
    /// The ball is attached at most once per run; a second call only replaces the
    /// transform of the existing entity.
    pub fn attach_ball(&mut self, transform: Transform) -> EntityId {
        if let Some(id) = self.ball {
            log::warn!("ball already attached; replacing its transform");
            self.entities[id.index()].transform = transform;
            return id;
        }

        let id = EntityId(self.entities.len() as u32);
        self.entities.push(Entity {
            kind: EntityKind::Ball,
            transform,
            uv_repeat: BALL_UV_REPEAT,
            roughness: BALL_ROUGHNESS,
            cast_shadow: true,
            receive_shadow: false,
        });
        self.ball = Some(id);
        self.spot.target = Some(id);
        id
    }

    /// Ball size applies uniformly. A no-op while the ball is loading.
    pub fn set_ball_size(&mut self, size: f32) {
        if let Some(ball) = self.ball_mut() {
            ball.transform.scale = Vec3::splat(size);
        }
    }

    /// The plane lies in its local XY before the -90° X rotation, so Z stays 1.
    pub fn set_ground_size(&mut self, size: f32) {
        self.ground_mut().transform.scale = Vec3::new(size, size, 1.0);
    }
}
