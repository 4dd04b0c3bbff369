pub mod animator;
pub mod assets;
pub mod camera;
pub mod clock;
pub mod config;
pub mod controls;
pub mod frame_loop;
pub mod mesh;
pub mod params;
pub mod renderer;
pub mod scene;
pub mod viewport;

use std::sync::Arc;

use bitflags::bitflags;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy},
    keyboard::PhysicalKey,
    window::{Window, WindowId},
};

pub use assets::{AssetError, AssetEvent, AssetLoader, AssetRequest};
pub use clock::{Clock, FrameTime, HostTimer};
pub use config::DemoConfig;
pub use frame_loop::{DemoCore, LoopControl, RenderDriver};
pub use params::{ParamId, ParameterStore, Preset};
pub use renderer::{Renderer, RendererError};
pub use scene::{EntityId, Scene};
pub use viewport::{RenderOutput, ViewportManager};

use assets::{AssetKind, AssetPayload, AssetSlot, TextureMap};
use controls::{PanelAction, PanelView, TuningPanel};
use scene::EntityKind;

// Pixels of trackpad scroll that count as one wheel line.
const PIXELS_PER_LINE: f32 = 50.0;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateFlags: u32 {
        const RENDERER_PENDING = 1 << 0;
        const RUNNING          = 1 << 1;
        const SHOULD_EXIT      = 1 << 2;
    }
}

/// Events posted into the winit loop from outside the handler.
pub enum AppEvent {
    Asset(AssetEvent),
    /// Web only: the renderer finished its async setup.
    #[cfg(target_arch = "wasm32")]
    RendererReady(Box<Result<Renderer, RendererError>>),
}

pub struct DemoApp {
    config: DemoConfig,
    core: DemoCore,
    timer: HostTimer,
    loader: AssetLoader,
    proxy: EventLoopProxy<AppEvent>,
    panel: TuningPanel,
    panel_view: Option<PanelView>,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    flags: StateFlags,
}

impl DemoApp {
    pub fn new(config: DemoConfig, proxy: EventLoopProxy<AppEvent>) -> Self {
        let timer = HostTimer::new();
        let core = DemoCore::with_clock(
            config.preset,
            Clock::with_max_step(timer.now_ms(), config.max_step),
            ViewportManager::new(config.max_pixel_ratio),
        );

        Self {
            loader: AssetLoader::new(config.asset_root.clone()),
            panel: TuningPanel::new(config.preset.panel_visible()),
            panel_view: None,
            config,
            core,
            timer,
            proxy,
            window: None,
            renderer: None,
            flags: StateFlags::empty(),
        }
    }

    fn on_renderer_ready(&mut self, mut renderer: Renderer) {
        let window = renderer.window.clone();
        let size = window.inner_size();
        self.core.start(size.width, size.height, window.scale_factor(), &mut renderer);

        self.renderer = Some(renderer);
        self.flags.remove(StateFlags::RENDERER_PENDING);
        self.flags.insert(StateFlags::RUNNING);
        self.start_loading();
        self.refresh_panel();
        window.request_redraw();
    }

    fn start_loading(&self) {
        let map_request = |target: EntityKind, (map, path): (TextureMap, &str)| AssetRequest {
            slot: AssetSlot::Map { target, map },
            path: path.into(),
            kind: AssetKind::Texture,
        };

        let mut requests = Vec::new();
        match self.core.preset() {
            Preset::Marble => {
                requests.push(AssetRequest {
                    slot: AssetSlot::BallModel,
                    path: "sphere".into(),
                    kind: AssetKind::Sphere { radius: 1.0 },
                });
                requests.extend(config::MARBLE_TEXTURES.map(|entry| map_request(EntityKind::Ball, entry)));
            }
            Preset::Golf => {
                requests.push(AssetRequest {
                    slot: AssetSlot::BallModel,
                    path: config::GOLF_BALL_MODEL.into(),
                    kind: AssetKind::Model { fit_radius: 1.0 },
                });
            }
        }
        requests.extend(config::GRASS_TEXTURES.map(|entry| map_request(EntityKind::Ground, entry)));

        for request in requests {
            let proxy = self.proxy.clone();
            self.loader.request(request, move |event| {
                if proxy.send_event(AppEvent::Asset(event)).is_err() {
                    log::debug!("event loop closed before an asset finished loading");
                }
            });
        }
    }

    fn on_asset(&mut self, event: AssetEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            log::warn!("asset {} arrived without a renderer, dropping it", event.path);
            return;
        };

        if event.slot == AssetSlot::BallModel {
            // The core decides whether the ball joins the scene.
            let Some(payload) = self.core.ball_loaded(&event.path, event.result) else {
                return;
            };
            match payload {
                AssetPayload::Model { mesh, texture } => {
                    renderer.set_ball_mesh(&mesh);
                    if let Some(texture) = texture {
                        renderer.set_texture(EntityKind::Ball, TextureMap::Color, &texture);
                    }
                }
                AssetPayload::Texture(_) => {
                    log::warn!("{} resolved to a texture, expected a model", event.path);
                    return;
                }
            }
            log::info!("loaded {}", event.path);
            return;
        }

        let payload = match event.result {
            Ok(payload) => payload,
            Err(e) => {
                // The surface keeps its neutral fallback map.
                log::error!("failed to load {}: {e}", event.path);
                return;
            }
        };

        match (event.slot, payload) {
            (AssetSlot::Map { target, map }, AssetPayload::Texture(texture)) => {
                renderer.set_texture(target, map, &texture);
            }
            (slot, _) => {
                log::warn!("unexpected payload for {slot:?} from {}", event.path);
                return;
            }
        }
        log::info!("loaded {}", event.path);
    }

    fn on_key(&mut self, code: winit::keyboard::KeyCode, pressed: bool) {
        let action = self
            .panel
            .handle_key(code, pressed, &mut self.core.params, &mut self.core.scene);
        match action {
            PanelAction::None => return,
            PanelAction::Quit => {
                self.flags.insert(StateFlags::SHOULD_EXIT);
                return;
            }
            PanelAction::Changed(id, value) => log::info!("{} = {value}", id.name()),
            PanelAction::Selected(id) => log::debug!("selected {}", id.name()),
            PanelAction::Toggled(visible) => log::debug!("panel visible: {visible}"),
        }
        self.refresh_panel();
    }

    fn refresh_panel(&mut self) {
        let text = self.panel.describe(&self.core.params);
        if let Some(view) = self.panel_view.as_mut() {
            view.show(&self.panel, &text);
        }
    }

    fn update(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        let control = self.core.frame(self.timer.now_ms(), renderer);
        if control == LoopControl::Stop || self.flags.contains(StateFlags::SHOULD_EXIT) {
            self.flags.remove(StateFlags::RUNNING);
            self.core.stop();
            log::info!("stopping after {} frames", self.core.frame_count());
            event_loop.exit();
            return;
        }

        renderer.window().request_redraw();
    }
}

impl ApplicationHandler<AppEvent> for DemoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let (width, height) = self.config.window_size;
        let attributes = Window::default_attributes()
            .with_title(format!("wscene ({})", self.config.preset.name()))
            .with_inner_size(winit::dpi::LogicalSize::new(width, height))
            .with_resizable(true);
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        #[cfg(target_arch = "wasm32")]
        {
            use winit::platform::web::WindowExtWebSys;

            if let (Some(canvas), Some(document)) =
                (window.canvas(), web_sys::window().and_then(|w| w.document()))
            {
                let container = document
                    .get_element_by_id("app")
                    .or_else(|| document.body().map(Into::into));
                let style = canvas.style();
                let _ = style.set_property("width", "100%");
                let _ = style.set_property("height", "100%");
                let _ = style.set_property("display", "block");
                if let Some(container) = container {
                    if container.append_child(&web_sys::Element::from(canvas)).is_err() {
                        log::error!("couldn't append canvas to document");
                    }
                }
            }

            self.panel_view = Some(PanelView::new());
            self.flags.insert(StateFlags::RENDERER_PENDING);

            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let result = Renderer::new(window).await;
                if proxy.send_event(AppEvent::RendererReady(Box::new(result))).is_err() {
                    log::error!("event loop closed during renderer setup");
                }
            });
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            self.panel_view = Some(PanelView::new());
            match pollster::block_on(Renderer::new(window)) {
                Ok(renderer) => self.on_renderer_ready(renderer),
                Err(e) => {
                    log::error!("failed to initialize renderer: {e}");
                    event_loop.exit();
                }
            }
        }
    }

    #[cfg_attr(not(target_arch = "wasm32"), allow(unused_variables))]
    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::Asset(event) => self.on_asset(event),
            #[cfg(target_arch = "wasm32")]
            AppEvent::RendererReady(result) => match *result {
                Ok(renderer) => self.on_renderer_ready(renderer),
                Err(e) => {
                    log::error!("failed to initialize renderer: {e}");
                    event_loop.exit();
                }
            },
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match &self.window {
            Some(window) if window.id() == id => {}
            _ => return,
        }

        match event {
            WindowEvent::Resized(size) => {
                if let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) {
                    self.core.viewport.on_physical_resize(
                        size.width,
                        size.height,
                        window.scale_factor(),
                        &mut self.core.camera,
                        renderer,
                    );
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.on_key(code, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                self.core.controls.set_dragging(state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.core.controls.cursor_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                self.core.controls.zoom(lines);
            }
            WindowEvent::CloseRequested => {
                self.flags.insert(StateFlags::SHOULD_EXIT);
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => self.update(event_loop),
            _ => {}
        }
    }
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(start))]
pub fn run() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            if console_log::init_with_level(log::Level::Info).is_err() {
                web_sys::console::error_1(&"couldn't initialize logger".into());
            }
        } else {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        }
    }

    let config = DemoConfig::from_host();
    log::info!(
        "Started wscene v{} (preset: {}, assets: {})",
        env!("CARGO_PKG_VERSION"),
        config.preset.name(),
        config.asset_root
    );

    let event_loop = match EventLoop::<AppEvent>::with_user_event().build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("failed to create event loop: {e}");
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = DemoApp::new(config, event_loop.create_proxy());
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("event loop error: {e}");
    }
}
