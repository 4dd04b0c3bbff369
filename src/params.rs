//! User-tunable parameters.
//!
//! Every parameter is a bounded scalar addressed by [`ParamId`]. Values written
//! through [`ParameterStore::set`] are quantized to the parameter's step and
//! clamped to its bounds, then every listener registered for that id runs in
//! registration order. Listeners receive a mutable reference to the caller's
//! target (the scene in the running app), so the store never owns what it edits.

use std::f32::consts::PI;

pub const PARAM_COUNT: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamId {
    BallSize,
    BaseHeight,
    BounceAmplitude,
    BounceFrequency,
    GroundSize,
    OrbitRadius,
    OrbitSpeed,
    OrbitHeight,
    LightIntensity,
    LightAngle,
    LightPenumbra,
    LightColor,
}

impl ParamId {
    pub const ALL: [ParamId; PARAM_COUNT] = [
        ParamId::BallSize,
        ParamId::BaseHeight,
        ParamId::BounceAmplitude,
        ParamId::BounceFrequency,
        ParamId::GroundSize,
        ParamId::OrbitRadius,
        ParamId::OrbitSpeed,
        ParamId::OrbitHeight,
        ParamId::LightIntensity,
        ParamId::LightAngle,
        ParamId::LightPenumbra,
        ParamId::LightColor,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamId::BallSize => "ball_size",
            ParamId::BaseHeight => "base_height",
            ParamId::BounceAmplitude => "bounce_amplitude",
            ParamId::BounceFrequency => "bounce_frequency",
            ParamId::GroundSize => "ground_size",
            ParamId::OrbitRadius => "orbit_radius",
            ParamId::OrbitSpeed => "orbit_speed",
            ParamId::OrbitHeight => "orbit_height",
            ParamId::LightIntensity => "light_intensity",
            ParamId::LightAngle => "light_angle",
            ParamId::LightPenumbra => "light_penumbra",
            ParamId::LightColor => "light_color",
        }
    }

    pub fn from_name(name: &str) -> Option<ParamId> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }
}

/// A named, bounded scalar.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Parameter {
    pub id: ParamId,
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Parameter {
    pub const fn new(id: ParamId, value: f32, min: f32, max: f32, step: f32) -> Self {
        Self { id, value, min, max, step }
    }

    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    /// Out-of-range input lands exactly on the nearest bound. Anything strictly
    /// inside snaps onto the step grid anchored at `min`.
    pub fn quantize(&self, value: f32) -> f32 {
        if value >= self.max {
            return self.max;
        }
        if value <= self.min {
            return self.min;
        }
        if self.step <= 0.0 {
            return value;
        }
        let snapped = self.min + ((value - self.min) / self.step).round() * self.step;
        snapped.clamp(self.min, self.max)
    }
}

/// Which demo variant the parameters start from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Preset {
    /// Procedural marble sphere, no tuning panel.
    #[default]
    Marble,
    /// Golf-ball model with the tuning panel shown.
    Golf,
}

impl Preset {
    pub fn from_name(name: &str) -> Option<Preset> {
        match name.trim().to_ascii_lowercase().as_str() {
            "marble" | "sphere" => Some(Preset::Marble),
            "golf" | "golf-ball" | "golfball" => Some(Preset::Golf),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::Marble => "marble",
            Preset::Golf => "golf",
        }
    }

    pub fn panel_visible(self) -> bool {
        matches!(self, Preset::Golf)
    }

    pub fn parameters(self) -> [Parameter; PARAM_COUNT] {
        let (amplitude, frequency) = match self {
            Preset::Marble => (0.2, 2.0),
            Preset::Golf => (0.6, 3.0),
        };

        [
            Parameter::new(ParamId::BallSize, 1.0, 0.1, 3.0, 0.05),
            Parameter::new(ParamId::BaseHeight, 3.4, 0.0, 10.0, 0.1),
            Parameter::new(ParamId::BounceAmplitude, amplitude, 0.0, 5.0, 0.05),
            Parameter::new(ParamId::BounceFrequency, frequency, 0.0, 10.0, 0.1),
            Parameter::new(ParamId::GroundSize, 8.0, 1.0, 50.0, 0.5),
            Parameter::new(ParamId::OrbitRadius, 5.0, 0.0, 20.0, 0.1),
            Parameter::new(ParamId::OrbitSpeed, 0.5, 0.0, 5.0, 0.05),
            Parameter::new(ParamId::OrbitHeight, 10.0, 1.0, 30.0, 0.5),
            Parameter::new(ParamId::LightIntensity, 7.5, 0.0, 20.0, 0.1),
            Parameter::new(ParamId::LightAngle, PI / 9.0, 0.0, PI / 2.0, 0.01),
            Parameter::new(ParamId::LightPenumbra, 0.25, 0.0, 1.0, 0.01),
            Parameter::new(ParamId::LightColor, 0xFF_FF_FF as f32, 0.0, 0xFF_FF_FF as f32, 1.0),
        ]
    }
}

pub type ChangeCallback<T> = Box<dyn FnMut(&mut T, f32)>;

pub struct ParameterStore<T> {
    params: [Parameter; PARAM_COUNT],
    listeners: [Vec<ChangeCallback<T>>; PARAM_COUNT],
}

impl<T> ParameterStore<T> {
    pub fn new(preset: Preset) -> Self {
        Self::from_parameters(preset.parameters())
    }

    pub fn from_parameters(params: [Parameter; PARAM_COUNT]) -> Self {
        debug_assert!(params.iter().enumerate().all(|(i, p)| p.id.index() == i));
        Self {
            params,
            listeners: std::array::from_fn(|_| Vec::new()),
        }
    }

    #[inline]
    pub fn get(&self, id: ParamId) -> f32 {
        self.params[id.index()].value
    }

    pub fn parameter(&self, id: ParamId) -> &Parameter {
        &self.params[id.index()]
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Look a value up by its external name.
    ///
    /// # Panics
    /// If `name` is not a known parameter.
    pub fn get_by_name(&self, name: &str) -> f32 {
        self.get(Self::lookup(name))
    }

    /// Register a listener that runs after every committed edit of `id`.
    pub fn on_change(&mut self, id: ParamId, callback: impl FnMut(&mut T, f32) + 'static) {
        self.listeners[id.index()].push(Box::new(callback));
    }

    /// Commit a new value and notify listeners. Returns the stored value after
    /// quantizing and clamping. NaN is ignored and leaves the parameter untouched.
    pub fn set(&mut self, id: ParamId, value: f32, target: &mut T) -> f32 {
        if value.is_nan() {
            log::warn!("ignoring NaN for parameter {}", id.name());
            return self.get(id);
        }

        let committed = self.params[id.index()].quantize(value);
        self.params[id.index()].value = committed;
        self.notify(id, target);
        committed
    }

    /// Write by external name, as the panel does.
    ///
    /// # Panics
    /// If `name` is not a known parameter. That is a wiring bug, not user input.
    pub fn set_by_name(&mut self, name: &str, value: f32, target: &mut T) -> f32 {
        self.set(Self::lookup(name), value, target)
    }

    /// Move a parameter by a whole number of steps.
    pub fn nudge(&mut self, id: ParamId, steps: i32, target: &mut T) -> f32 {
        let param = self.params[id.index()];
        self.set(id, param.value + param.step * steps as f32, target)
    }

    /// Re-run the listeners for `id` with its current value.
    pub fn notify(&mut self, id: ParamId, target: &mut T) {
        let value = self.get(id);
        for callback in self.listeners[id.index()].iter_mut() {
            callback(target, value);
        }
    }

    /// Push every current value through its listeners. Used once at startup so
    /// one-shot properties start out matching the store.
    pub fn notify_all(&mut self, target: &mut T) {
        for id in ParamId::ALL {
            self.notify(id, target);
        }
    }

    fn lookup(name: &str) -> ParamId {
        ParamId::from_name(name).unwrap_or_else(|| panic!("unknown parameter `{name}`"))
    }
}

/// Split a packed `0xRRGGBB` value into linear-ish `[r, g, b]` in `0..=1`.
pub fn unpack_rgb(packed: f32) -> [f32; 3] {
    let bits = packed.clamp(0.0, 0xFF_FF_FF as f32) as u32;
    [
        ((bits >> 16) & 0xFF) as f32 / 255.0,
        ((bits >> 8) & 0xFF) as f32 / 255.0,
        (bits & 0xFF) as f32 / 255.0,
    ]
}
