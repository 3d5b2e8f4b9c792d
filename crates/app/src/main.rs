//! forge - textured quad demo on top of the engine core.
//!
//! Opens a window, builds the renderer and one render state for a spinning
//! textured quad, then drives the frame sequence once per redraw.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use tracing::{debug, error, info, warn};

use forge_core::{EngineConfig, FrameTimer};
use forge_platform::{
    ActiveEventLoop, ApplicationHandler, ControlFlow, EventLoop, Window, WindowEvent, WindowId,
};
use forge_renderer::{
    CameraMatrices, FrameOutcome, Mesh, MeshData, PixelData, RenderStateBuilder, Renderer,
    Texture,
};
use forge_rhi::pipeline::GraphicsPipelineBuilder;
use forge_scene::{Camera, Transform};

const SHADER_NAME: &str = "quad";
const SPIN_RADIANS_PER_SECOND: f32 = std::f32::consts::FRAC_PI_2;

#[derive(Parser, Debug)]
#[command(name = "forge", about = "Vulkan engine core demo")]
struct Cli {
    /// Engine configuration file
    #[arg(short, long, default_value = "forge.toml")]
    config: PathBuf,

    /// Force the Khronos validation layer on
    #[arg(long)]
    validation: bool,

    /// Texture image for the quad (overrides the config)
    #[arg(short, long)]
    texture: Option<PathBuf>,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if self.validation {
            config.graphics.validation = true;
        }
        if let Some(texture) = &self.texture {
            config.scene.texture = Some(texture.clone());
        }
        Ok(config)
    }
}

fn checkerboard() -> PixelData {
    PixelData::checkerboard(256, 32, [230, 230, 230, 255], [40, 40, 40, 255])
}

/// Decodes the configured texture, or falls back to the checkerboard.
fn load_pixels(path: Option<&Path>) -> Result<PixelData> {
    let Some(path) = path else {
        debug!("No texture configured, using checkerboard");
        return Ok(checkerboard());
    };

    let rgba = match image::open(path) {
        Ok(decoded) => decoded.to_rgba8(),
        Err(e) => {
            warn!("Failed to decode {} ({}), using checkerboard", path.display(), e);
            return Ok(checkerboard());
        }
    };
    let (width, height) = rgba.dimensions();
    info!("Loaded texture {} ({}x{})", path.display(), width, height);
    Ok(PixelData::new(width, height, rgba.into_raw())?)
}

/// Builds the renderer and registers the textured quad.
fn build_renderer(window: &Window, config: &EngineConfig) -> Result<Renderer> {
    let mut renderer = Renderer::new(window, config).context("creating renderer")?;
    let device = Arc::clone(renderer.device());

    let pipeline = GraphicsPipelineBuilder::color_depth_rasterizer(
        renderer.render_pass(),
        &config.graphics.shader_dir,
        SHADER_NAME,
    )
    .build(&device)
    .context("building pipeline")?;

    let mesh = Mesh::new(&device, &MeshData::quad()).context("uploading quad")?;
    let pixels = load_pixels(config.scene.texture.as_deref())?;
    let texture = Texture::from_pixels(&device, &pixels).context("uploading texture")?;

    let state = RenderStateBuilder::textured_mesh(
        Arc::new(pipeline),
        Arc::new(mesh),
        Arc::new(texture),
        renderer.image_count(),
    )
    .build(&device)
    .context("building render state")?;
    renderer.register(state)?;

    Ok(renderer)
}

struct App {
    config: EngineConfig,
    // Declared before `window` so the renderer is dropped first.
    renderer: Option<Renderer>,
    window: Option<Window>,
    camera: Camera,
    timer: FrameTimer,
    frames: u64,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        let camera = Camera::perspective(
            config.scene.fov_y_degrees,
            1.0,
            config.scene.near,
            config.scene.far,
        )
        .with_position(Vec3::new(0.0, 0.0, 2.0))
        .look_at(Vec3::ZERO);

        Self {
            config,
            renderer: None,
            window: None,
            camera,
            timer: FrameTimer::new(),
            frames: 0,
        }
    }

    fn draw(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        self.timer.mark_frame();
        let model =
            Transform::spinning(Vec3::Z, SPIN_RADIANS_PER_SECOND, self.timer.elapsed_secs())
                .matrix();
        for state in renderer.render_states_mut() {
            state.set_model(model);
        }

        let camera = CameraMatrices {
            view: self.camera.view_matrix(),
            proj: self.camera.projection_matrix(),
        };
        match renderer.render_frame(&camera)? {
            FrameOutcome::Presented(status) => {
                self.frames += 1;
                if self.frames % 600 == 0 {
                    debug!(
                        "Frame {} ({:?}), {:.1} fps",
                        self.frames,
                        status,
                        self.timer.frame_rate()
                    );
                }
            }
            FrameOutcome::Skipped => warn!("Swapchain out of date, frame skipped"),
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match build_renderer(&window, &self.config) {
            Ok(renderer) => {
                self.camera.set_aspect(window.aspect_ratio());
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                window.request_redraw();
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to create renderer: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.renderer = None;
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.draw() {
                    error!("Render error: {:#}", e);
                    event_loop.exit();
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let logging = forge_core::init_logging(None);
    let cli = Cli::parse();
    let config = cli.engine_config()?;
    if let Some(logging) = &logging {
        logging.apply(config.graphics.log_filter.as_deref())?;
    }
    info!("Starting forge");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
