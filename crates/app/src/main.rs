//! vge demo
//!
//! Opens a window and spins two textured quads, printing the measured frame
//! rate in the title bar. Settings come from `vge.toml` in the working
//! directory when present.

mod scene;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vge_core::config::DEFAULT_CONFIG_FILE;
use vge_core::{EngineConfig, FpsCounter, Timer};
use vge_platform::Window;
use vge_renderer::Renderer;

struct App {
    config: EngineConfig,
    window: Option<Window>,
    renderer: Option<Renderer>,
    timer: Timer,
    fps: FpsCounter,
    angle: f32,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            timer: Timer::new(),
            fps: FpsCounter::default(),
            angle: 0.0,
            error: None,
        }
    }

    /// Creates the window, the renderer and the demo scene.
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window =
            Window::new(event_loop, &self.config.window).context("Failed to create window")?;
        let mut renderer =
            Renderer::new(&window, &self.config).context("Failed to create renderer")?;

        let texture_path = self.config.assets.texture_path(&self.config.assets.texture);
        let first_texture = renderer
            .add_texture(&texture_path)
            .with_context(|| format!("Failed to load texture {}", texture_path.display()))?;
        let second_texture = renderer.add_texture(&texture_path)?;

        renderer.add_mesh(&scene::first_quad(), &scene::QUAD_INDICES, first_texture)?;
        renderer.add_mesh(&scene::second_quad(), &scene::QUAD_INDICES, second_texture)?;

        info!("Initialization complete, entering main loop");
        self.timer.reset();
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    /// Advances the animation and draws one frame.
    fn frame(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return Ok(());
        };

        let delta = self.timer.tick();
        self.angle = scene::advance_angle(self.angle, delta.as_secs_f32());

        for (index, model) in scene::model_matrices(self.angle).into_iter().enumerate() {
            renderer.update_model(index, model);
        }
        renderer.draw()?;

        if let Some(fps) = self.fps.record(delta) {
            window.show_fps(fps.round() as u32);
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    self.fail(event_loop, e.context("Render error"));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // The renderer waits for the device and must go before its surface's window.
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    vge_core::init_logging();
    info!("Starting vge");

    let config = EngineConfig::load(Path::new(DEFAULT_CONFIG_FILE))
        .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG_FILE))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_app_starts_without_window() {
        let app = App::new(EngineConfig::default());
        assert!(app.window.is_none());
        assert!(app.renderer.is_none());
        assert_eq!(app.angle, 0.0);
        assert!(app.error.is_none());
    }

    #[test]
    fn test_fps_counter_reports_once_per_second() {
        let mut app = App::new(EngineConfig::default());
        let frame = Duration::from_millis(250);
        assert!(app.fps.record(frame).is_none());
        assert!(app.fps.record(frame).is_none());
        assert!(app.fps.record(frame).is_none());
        let fps = app.fps.record(frame).expect("window elapsed");
        assert_eq!(fps.round() as u32, 4);
    }
}
