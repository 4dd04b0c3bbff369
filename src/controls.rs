//! Keyboard tuning panel.
//!
//! `Tab` walks the parameter list, `Up`/`Down` step the selected value (hold
//! shift for ten steps), `H` shows or hides the panel. Edits only go through
//! while the panel is visible. On the web the panel is mirrored into a DOM
//! overlay; natively every edit is logged.

use winit::keyboard::KeyCode;

use crate::params::{ParamId, Parameter, ParameterStore};
use crate::scene::Scene;

const FAST_STEPS: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelAction {
    None,
    Selected(ParamId),
    Changed(ParamId, f32),
    Toggled(bool),
    Quit,
}

#[derive(Debug, Clone)]
pub struct TuningPanel {
    selected: usize,
    visible: bool,
    shift: bool,
}

impl TuningPanel {
    pub fn new(visible: bool) -> Self {
        Self {
            selected: 0,
            visible,
            shift: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn selected(&self) -> ParamId {
        ParamId::ALL[self.selected]
    }

    pub fn handle_key(
        &mut self,
        key: KeyCode,
        pressed: bool,
        params: &mut ParameterStore<Scene>,
        scene: &mut Scene,
    ) -> PanelAction {
        if matches!(key, KeyCode::ShiftLeft | KeyCode::ShiftRight) {
            self.shift = pressed;
            return PanelAction::None;
        }
        if !pressed {
            return PanelAction::None;
        }

        match key {
            KeyCode::Escape => PanelAction::Quit,
            KeyCode::KeyH => {
                self.visible = !self.visible;
                PanelAction::Toggled(self.visible)
            }
            _ if !self.visible => PanelAction::None,
            KeyCode::Tab => {
                let count = ParamId::ALL.len();
                self.selected = if self.shift {
                    (self.selected + count - 1) % count
                } else {
                    (self.selected + 1) % count
                };
                PanelAction::Selected(self.selected())
            }
            KeyCode::ArrowUp | KeyCode::ArrowDown => {
                let direction = if key == KeyCode::ArrowUp { 1 } else { -1 };
                let steps = if self.shift { direction * FAST_STEPS } else { direction };
                let id = self.selected();
                let value = params.nudge(id, steps, scene);
                PanelAction::Changed(id, value)
            }
            _ => PanelAction::None,
        }
    }

    /// One line per parameter, the selected one marked.
    pub fn describe<T>(&self, params: &ParameterStore<T>) -> String {
        params
            .parameters()
            .enumerate()
            .map(|(i, p)| {
                let marker = if i == self.selected { '>' } else { ' ' };
                format!("{marker} {:<17} {}", p.name(), format_value(p))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn format_value(param: &Parameter) -> String {
    match param.id {
        ParamId::LightColor => format!("#{:06X}", param.value as u32),
        _ => format!("{:.2}  [{} .. {}]", param.value, param.min, param.max),
    }
}

/// Where the panel text ends up: a DOM overlay on the web, the log natively.
pub struct PanelView {
    #[cfg(target_arch = "wasm32")]
    element: Option<web_sys::HtmlElement>,
}

impl PanelView {
    pub fn new() -> Self {
        Self {
            #[cfg(target_arch = "wasm32")]
            element: create_overlay(),
        }
    }

    pub fn show(&mut self, panel: &TuningPanel, text: &str) {
        #[cfg(target_arch = "wasm32")]
        {
            if let Some(element) = &self.element {
                let display = if panel.is_visible() { "block" } else { "none" };
                let _ = element.style().set_property("display", display);
                element.set_inner_text(text);
            }
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            if panel.is_visible() {
                log::debug!("tuning panel\n{text}");
            }
        }
    }
}

impl Default for PanelView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_arch = "wasm32")]
fn create_overlay() -> Option<web_sys::HtmlElement> {
    use wasm_bindgen::JsCast;

    let document = web_sys::window()?.document()?;
    let container = document
        .get_element_by_id("app")
        .or_else(|| document.body().map(Into::into))?;
    if let Some(app) = container.dyn_ref::<web_sys::HtmlElement>() {
        let _ = app.style().set_property("position", "relative");
    }

    let element: web_sys::HtmlElement = document.create_element("pre").ok()?.dyn_into().ok()?;
    element.set_id("wscene-panel");
    let style = element.style();
    for (name, value) in [
        ("position", "absolute"),
        ("top", "10px"),
        ("right", "10px"),
        ("z-index", "1000"),
        ("margin", "0"),
        ("background", "rgba(0,0,0,0.8)"),
        ("color", "white"),
        ("padding", "10px"),
        ("font-family", "monospace"),
        ("font-size", "12px"),
        ("border-radius", "4px"),
    ] {
        let _ = style.set_property(name, value);
    }
    container.append_child(&element).ok()?;
    Some(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_loop::wire_scene_listeners;
    use crate::params::Preset;

    fn setup() -> (TuningPanel, ParameterStore<Scene>, Scene) {
        let mut params = ParameterStore::new(Preset::Golf);
        wire_scene_listeners(&mut params);
        (TuningPanel::new(true), params, Scene::new())
    }

    #[test]
    fn test_tab_cycles_selection() {
        let (mut panel, mut params, mut scene) = setup();
        assert_eq!(panel.selected(), ParamId::BallSize);
        panel.handle_key(KeyCode::Tab, true, &mut params, &mut scene);
        assert_eq!(panel.selected(), ParamId::BaseHeight);

        panel.handle_key(KeyCode::ShiftLeft, true, &mut params, &mut scene);
        panel.handle_key(KeyCode::Tab, true, &mut params, &mut scene);
        panel.handle_key(KeyCode::Tab, true, &mut params, &mut scene);
        assert_eq!(panel.selected(), ParamId::LightColor);
    }

    #[test]
    fn test_arrows_edit_selected_parameter() {
        let (mut panel, mut params, mut scene) = setup();
        for _ in 0..8 {
            panel.handle_key(KeyCode::Tab, true, &mut params, &mut scene);
        }
        assert_eq!(panel.selected(), ParamId::LightIntensity);

        let action = panel.handle_key(KeyCode::ArrowUp, true, &mut params, &mut scene);
        assert!(matches!(action, PanelAction::Changed(ParamId::LightIntensity, v) if (v - 7.6).abs() < 1e-4));
        assert!((scene.spot.intensity - 7.6).abs() < 1e-4);
    }

    #[test]
    fn test_hidden_panel_ignores_edits() {
        let (_, mut params, mut scene) = setup();
        let mut panel = TuningPanel::new(false);
        let action = panel.handle_key(KeyCode::ArrowUp, true, &mut params, &mut scene);
        assert_eq!(action, PanelAction::None);
        assert_eq!(params.get(ParamId::BallSize), 1.0);

        assert_eq!(
            panel.handle_key(KeyCode::KeyH, true, &mut params, &mut scene),
            PanelAction::Toggled(true)
        );
        assert!(panel.is_visible());
    }

    #[test]
    fn test_release_and_escape() {
        let (mut panel, mut params, mut scene) = setup();
        assert_eq!(panel.handle_key(KeyCode::Tab, false, &mut params, &mut scene), PanelAction::None);
        assert_eq!(panel.handle_key(KeyCode::Escape, true, &mut params, &mut scene), PanelAction::Quit);
    }

    #[test]
    fn test_describe_marks_selection() {
        let (panel, params, _) = setup();
        let text = panel.describe(&params);
        let first = text.lines().next().unwrap_or_default();
        assert!(first.starts_with("> ball_size"));
        assert!(text.contains("#FFFFFF"));
        assert_eq!(text.lines().count(), ParamId::ALL.len());
    }
}
