
// Don't spawn a terminal window on windows
//#![windows_subsystem = "windows"]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

pub use ember as em;
pub use ember_loader as eml;

mod input;
mod ui;
pub use input::*;
pub use ui::*;

#[derive(Parser, Debug)]
#[command(about = "Interactive hardware ray traced mesh viewer")]
struct CmdLineArgs
{
    /// Renderer configuration file (JSON). Defaults are used if it's missing.
    #[arg(long, default_value = em::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Meshes to load at startup (.obj, .gltf, .glb).
    meshes: Vec<PathBuf>,
}

struct Viewer
{
    window: Arc<Window>,
    renderer: em::WgpuRenderer,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    overlay: EguiOverlay,
    input: Input,
    ui: ViewerUI,
}

impl Viewer
{
    fn new(event_loop: &ActiveEventLoop, config: &em::RendererConfig, meshes: &[PathBuf]) -> anyhow::Result<Self>
    {
        let window_attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_visible(false);
        let window = Arc::new(event_loop.create_window(window_attributes).context("Failed to create window")?);

        let size = window.inner_size();
        let mut renderer = em::WgpuRenderer::create(window.clone(), size.width.max(1), size.height.max(1), config.clone())
            .context("Failed to initialize the renderer")?;

        let egui_ctx = egui::Context::default();
        let viewport_id = egui_ctx.viewport_id();
        let egui_state = egui_winit::State::new(egui_ctx.clone(), viewport_id, &window, Some(window.scale_factor() as f32), None, None);
        let overlay = EguiOverlay::new(&renderer.backend().device, renderer.backend().surface_format());

        let mut ui = ViewerUI::new();
        for path in meshes {
            ui.open_mesh(&mut renderer, path);
        }

        window.set_visible(true);

        return Ok(Self {
            window,
            renderer,
            egui_ctx,
            egui_state,
            overlay,
            input: Input::default(),
            ui,
        });
    }

    fn update_and_render(&mut self) -> anyhow::Result<()>
    {
        // Camera controls, ignored while egui is using the mouse.
        let ui_wants_mouse = self.egui_ctx.is_using_pointer() || self.egui_ctx.is_pointer_over_area();
        self.renderer.apply_camera_input(&camera_input(&self.input, ui_wants_mouse));

        if self.input.keys[Key::R].pressed && !self.egui_ctx.wants_keyboard_input() {
            reset_camera(&mut self.renderer);
        }
        if self.input.keys[Key::ESCAPE].pressed
        {
            if self.renderer.render_sequence().is_some() {
                self.renderer.cancel_render_sequence();
            } else {
                self.renderer.cancel_render_job();
            }
        }

        // Consume the accumulated egui inputs
        let egui_input = self.egui_state.take_egui_input(&self.window);

        // Update UI
        let egui_output = self.egui_ctx.run(egui_input, |ctx|
        {
            self.ui.update_ui(ctx, &mut self.renderer);
        });

        let egui::FullOutput { platform_output, textures_delta, shapes, pixels_per_point, .. } = egui_output;
        self.egui_state.handle_platform_output(&self.window, platform_output);
        self.overlay.prepare(&self.egui_ctx, shapes, textures_delta, pixels_per_point);

        // The scene is rendered to the right of the side panel.
        let size = self.window.inner_size();
        let panel_width = self.ui.panel_width.min(size.width.saturating_sub(2));
        self.renderer.set_render_viewport(panel_width, 0, size.width.saturating_sub(panel_width), size.height);

        self.renderer.draw(Some(&mut self.overlay as &mut dyn em::OverlayPass))?;

        let status = self.renderer.poll();
        self.ui.on_sequence_status(status);

        begin_input_events(&mut self.input);
        return Ok(());
    }
}

struct App
{
    args: CmdLineArgs,
    config: em::RendererConfig,
    viewer: Option<Viewer>,
    error: Option<anyhow::Error>,
}

impl App
{
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error)
    {
        self.error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop)
    {
        if self.viewer.is_some() { return; }

        match Viewer::new(event_loop, &self.config, &self.args.meshes)
        {
            Ok(viewer) => { self.viewer = Some(viewer); }
            Err(err)   => { self.fail(event_loop, err); }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent)
    {
        let Some(viewer) = self.viewer.as_mut() else { return; };

        // Collect inputs
        let _ = viewer.egui_state.on_window_event(&viewer.window, &event);
        process_window_event(&mut viewer.input, &event);

        match event
        {
            WindowEvent::Resized(new_size) =>
            {
                viewer.renderer.resize(new_size.width, new_size.height);
                viewer.window.request_redraw();
            },
            WindowEvent::CloseRequested =>
            {
                event_loop.exit();
            },
            WindowEvent::RedrawRequested =>
            {
                if let Err(err) = viewer.update_and_render() {
                    self.fail(event_loop, err);
                    return;
                }

                // Continuously request drawing messages to let the main loop continue
                viewer.window.request_redraw();
            },
            _ => {},
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent)
    {
        if let Some(viewer) = self.viewer.as_mut() {
            process_device_event(&mut viewer.input, &event);
        }
    }
}

fn run() -> anyhow::Result<()>
{
    let args = CmdLineArgs::parse();
    let config = em::RendererConfig::load(&args.config)
        .with_context(|| format!("Failed to read config '{}'", args.config.display()))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App { args, config, viewer: None, error: None };
    event_loop.run_app(&mut app)?;

    return match app.error
    {
        Some(err) => Err(err),
        None      => Ok(()),
    };
}

fn main()
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run()
    {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
}
