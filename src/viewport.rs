//! Resize handling: keeps the camera aspect and the render output size in step
//! with the host window.

use crate::camera::Camera;

/// Device pixel ratios above this are rendered at this ratio instead.
pub const MAX_PIXEL_RATIO: f32 = 2.0;

/// Physical size of the render output in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

/// Anything that owns a drawable surface and must follow the window size.
pub trait RenderOutput {
    fn resize_output(&mut self, size: OutputSize);
}

#[derive(Debug, Clone)]
pub struct ViewportManager {
    max_pixel_ratio: f32,
    logical: (f32, f32),
    pixel_ratio: f32,
    output: OutputSize,
}

impl Default for ViewportManager {
    fn default() -> Self {
        Self::new(MAX_PIXEL_RATIO)
    }
}

impl ViewportManager {
    pub fn new(max_pixel_ratio: f32) -> Self {
        Self {
            max_pixel_ratio: max_pixel_ratio.max(1.0),
            logical: (0.0, 0.0),
            pixel_ratio: 1.0,
            output: OutputSize::default(),
        }
    }

    /// React to a host resize. `width`/`height` are logical (CSS) pixels.
    ///
    /// Zero-sized viewports (minimized windows) are ignored. The output is only
    /// pushed when its size actually changes, so repeated calls with the same
    /// arguments leave camera and renderer exactly as they were.
    pub fn on_resize<O: RenderOutput + ?Sized>(
        &mut self,
        width: f32,
        height: f32,
        device_pixel_ratio: f32,
        camera: &mut Camera,
        output: &mut O,
    ) {
        if !(width > 0.0 && height > 0.0) {
            log::debug!("ignoring empty viewport {width}x{height}");
            return;
        }

        let pixel_ratio = if device_pixel_ratio > 0.0 {
            device_pixel_ratio.min(self.max_pixel_ratio)
        } else {
            1.0
        };

        self.logical = (width, height);
        self.pixel_ratio = pixel_ratio;
        camera.set_aspect(width / height);

        let size = OutputSize {
            width: ((width * pixel_ratio).round() as u32).max(1),
            height: ((height * pixel_ratio).round() as u32).max(1),
        };
        if size != self.output {
            log::debug!(
                "viewport {}x{} @{:.2} -> output {}x{}",
                width, height, pixel_ratio, size.width, size.height
            );
            self.output = size;
            output.resize_output(size);
        }
    }

    /// Forget the last pushed size so the next resize reaches the output.
    pub fn invalidate(&mut self) {
        self.output = OutputSize::default();
    }

    /// Same as [`on_resize`](Self::on_resize) for hosts that report physical pixels.
    pub fn on_physical_resize<O: RenderOutput + ?Sized>(
        &mut self,
        physical_width: u32,
        physical_height: u32,
        scale_factor: f64,
        camera: &mut Camera,
        output: &mut O,
    ) {
        let scale = if scale_factor > 0.0 { scale_factor as f32 } else { 1.0 };
        self.on_resize(
            physical_width as f32 / scale,
            physical_height as f32 / scale,
            scale,
            camera,
            output,
        );
    }

    pub fn output(&self) -> OutputSize {
        self.output
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn logical_size(&self) -> (f32, f32) {
        self.logical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        sizes: Vec<OutputSize>,
    }

    impl RenderOutput for Recorder {
        fn resize_output(&mut self, size: OutputSize) {
            self.sizes.push(size);
        }
    }

    #[test]
    fn test_resize_updates_aspect() {
        let mut viewport = ViewportManager::default();
        let mut camera = Camera::new(1.0);
        let mut out = Recorder::default();

        viewport.on_resize(800.0, 600.0, 1.0, &mut camera, &mut out);
        assert!((camera.aspect - 4.0 / 3.0).abs() < 1e-6);

        viewport.on_resize(1600.0, 900.0, 1.0, &mut camera, &mut out);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
        assert_eq!(out.sizes.last(), Some(&OutputSize { width: 1600, height: 900 }));
    }

    #[test]
    fn test_resize_is_idempotent() {
        let mut viewport = ViewportManager::default();
        let mut camera = Camera::new(1.0);
        let mut out = Recorder::default();

        viewport.on_resize(1024.0, 768.0, 1.5, &mut camera, &mut out);
        let camera_after_first = camera.clone();
        let output_after_first = viewport.output();

        viewport.on_resize(1024.0, 768.0, 1.5, &mut camera, &mut out);
        assert_eq!(camera, camera_after_first);
        assert_eq!(viewport.output(), output_after_first);
        assert_eq!(out.sizes.len(), 1);
    }

    #[test]
    fn test_pixel_ratio_is_capped() {
        let mut viewport = ViewportManager::default();
        let mut camera = Camera::new(1.0);
        let mut out = Recorder::default();

        viewport.on_resize(500.0, 400.0, 3.0, &mut camera, &mut out);
        assert_eq!(viewport.pixel_ratio(), 2.0);
        assert_eq!(viewport.output(), OutputSize { width: 1000, height: 800 });
    }

    #[test]
    fn test_empty_viewport_is_ignored() {
        let mut viewport = ViewportManager::default();
        let mut camera = Camera::new(1.0);
        let mut out = Recorder::default();

        viewport.on_resize(800.0, 600.0, 1.0, &mut camera, &mut out);
        viewport.on_resize(800.0, 0.0, 1.0, &mut camera, &mut out);
        assert!((camera.aspect - 4.0 / 3.0).abs() < 1e-6);
        assert_eq!(out.sizes.len(), 1);
    }

    #[test]
    fn test_physical_resize_converts_units() {
        let mut viewport = ViewportManager::default();
        let mut camera = Camera::new(1.0);
        let mut out = Recorder::default();

        viewport.on_physical_resize(2560, 1440, 2.0, &mut camera, &mut out);
        assert_eq!(viewport.logical_size(), (1280.0, 720.0));
        assert_eq!(viewport.output(), OutputSize { width: 2560, height: 1440 });

        // A 3x display renders at 2x.
        viewport.on_physical_resize(3840, 2160, 3.0, &mut camera, &mut out);
        assert_eq!(viewport.output(), OutputSize { width: 2560, height: 1440 });
        assert_eq!(out.sizes.len(), 1);
    }

    #[test]
    fn test_invalidate_forces_next_push() {
        let mut viewport = ViewportManager::default();
        let mut camera = Camera::new(1.0);
        let mut out = Recorder::default();

        viewport.on_resize(640.0, 480.0, 1.0, &mut camera, &mut out);
        viewport.invalidate();
        viewport.on_resize(640.0, 480.0, 1.0, &mut camera, &mut out);
        assert_eq!(out.sizes.len(), 2);
        assert_eq!(viewport.output(), OutputSize { width: 640, height: 480 });
    }
}
