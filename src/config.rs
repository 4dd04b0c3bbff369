use crate::assets::TextureMap;
use crate::clock::MAX_STEP;
use crate::params::Preset;
use crate::viewport::MAX_PIXEL_RATIO;

pub const DIMX: u32 = 1280;
pub const DIMY: u32 = 800;
pub const DEFAULT_ASSET_ROOT: &str = "static";
pub const PRESET_ENV: &str = "WSCENE_PRESET";
pub const ASSET_ROOT_ENV: &str = "WSCENE_ASSET_ROOT";

// Asset paths, relative to the asset root.
pub const MARBLE_TEXTURES: [(TextureMap, &str); 4] = [
    (TextureMap::Color, "textures/marble/marble_0003_color_1k.jpg"),
    (TextureMap::Normal, "textures/marble/marble_0003_normal_opengl_1k.png"),
    (TextureMap::Roughness, "textures/marble/marble_0003_roughness_1k.jpg"),
    (TextureMap::Occlusion, "textures/marble/marble_0003_ao_1k.jpg"),
];
pub const GRASS_TEXTURES: [(TextureMap, &str); 4] = [
    (TextureMap::Color, "textures/grass/color.jpg"),
    (TextureMap::Normal, "textures/grass/normal.jpg"),
    (TextureMap::Roughness, "textures/grass/roughness.jpg"),
    (TextureMap::Occlusion, "textures/grass/ambientOcclusion.jpg"),
];
pub const GOLF_BALL_MODEL: &str = "models/golf_ball.glb";

#[derive(Debug, Clone, PartialEq)]
pub struct DemoConfig {
    pub preset: Preset,
    pub asset_root: String,
    pub window_size: (u32, u32),
    pub max_step: f32,
    pub max_pixel_ratio: f32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            preset: Preset::default(),
            asset_root: DEFAULT_ASSET_ROOT.to_string(),
            window_size: (DIMX, DIMY),
            max_step: MAX_STEP,
            max_pixel_ratio: MAX_PIXEL_RATIO,
        }
    }
}

pub const PRESET_QUERY: &str = "preset";
pub const ASSET_ROOT_QUERY: &str = "assets";

impl DemoConfig {
    /// Defaults overridden by whatever the host provides: environment variables
    /// natively, the page's query string on the web.
    pub fn from_host() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let query = web_sys::window()
                    .and_then(|w| w.location().search().ok())
                    .and_then(|search| web_sys::UrlSearchParams::new_with_str(&search).ok());
                Self::from_query(|key| query.as_ref().and_then(|q| q.get(key)))
            } else {
                Self::from_lookup(|key| std::env::var(key).ok())
            }
        }
    }

    /// Environment-style lookup keyed by `WSCENE_*` names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self::with_overrides(lookup(PRESET_ENV), lookup(ASSET_ROOT_ENV))
    }

    /// Query-string lookup keyed by `preset` and `assets`. Values arrive decoded.
    pub fn from_query(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self::with_overrides(lookup(PRESET_QUERY), lookup(ASSET_ROOT_QUERY))
    }

    fn with_overrides(preset: Option<String>, asset_root: Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = preset {
            match Preset::from_name(&name) {
                Some(preset) => config.preset = preset,
                None => log::warn!("unknown preset `{name}`, using {}", config.preset.name()),
            }
        }
        if let Some(root) = asset_root.filter(|r| !r.trim().is_empty()) {
            config.asset_root = root;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = DemoConfig::default();
        assert_eq!(config.preset, Preset::Marble);
        assert_eq!(config.asset_root, "static");
        assert_eq!(config.max_step, 0.033);
        assert_eq!(config.max_pixel_ratio, 2.0);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [(PRESET_ENV, "golf"), (ASSET_ROOT_ENV, "/opt/wscene/dist")].into();
        let config = DemoConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.preset, Preset::Golf);
        assert_eq!(config.asset_root, "/opt/wscene/dist");
    }

    #[test]
    fn test_bad_env_values_fall_back() {
        let env: HashMap<&str, &str> = [(PRESET_ENV, "cube"), (ASSET_ROOT_ENV, "  ")].into();
        let config = DemoConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config, DemoConfig::default());
    }

    #[test]
    fn test_query_overrides() {
        let query: HashMap<&str, &str> = [("preset", "golf"), ("assets", "cdn/my static")].into();
        let config = DemoConfig::from_query(|k| query.get(k).map(|v| v.to_string()));
        assert_eq!(config.preset, Preset::Golf);
        assert_eq!(config.asset_root, "cdn/my static");

        // Env-style keys mean nothing in a query string.
        let query: HashMap<&str, &str> = [(PRESET_ENV, "golf")].into();
        let config = DemoConfig::from_query(|k| query.get(k).map(|v| v.to_string()));
        assert_eq!(config, DemoConfig::default());
    }
}
