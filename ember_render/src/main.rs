
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

pub use ember as em;
pub use ember_loader as eml;

/// Renders a time range of a scene to numbered PNG files.
#[derive(Parser, Debug)]
#[command(about = "Offline hardware ray traced sequence renderer")]
struct CmdLineArgs
{
    /// Renderer configuration file (JSON). Defaults are used if it's missing.
    #[arg(long, default_value = em::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Meshes making up the scene (.obj, .gltf, .glb).
    #[arg(required = true)]
    meshes: Vec<PathBuf>,

    /// Output folder for the numbered frames.
    #[arg(long, default_value = "renders")]
    out: PathBuf,

    #[arg(long, default_value_t = 0.0)]
    t_min: f32,
    #[arg(long, default_value_t = 1.0)]
    t_max: f32,
    #[arg(long, default_value_t = 0.25)]
    step: f32,

    /// Samples per pixel for each frame.
    #[arg(long, default_value_t = 256)]
    samples: u64,

    /// Camera position, as x,y,z.
    #[arg(long, value_delimiter = ',')]
    eye: Option<Vec<f32>>,
    /// Camera target, as x,y,z.
    #[arg(long, value_delimiter = ',')]
    target: Option<Vec<f32>>,

    /// Show the window while rendering.
    #[arg(long, default_value_t = false)]
    visible: bool,
}

struct RenderContext
{
    window: Arc<Window>,
    renderer: em::WgpuRenderer,
}

pub struct App
{
    cmd_line_args: CmdLineArgs,
    config: em::RendererConfig,
    ctx: Option<RenderContext>,
    result: Option<anyhow::Result<()>>,
}

impl App
{
    fn init(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<RenderContext>
    {
        let args = &self.cmd_line_args;

        let window_attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false)
            .with_visible(args.visible);
        let window = Arc::new(event_loop.create_window(window_attributes).context("Failed to create window")?);

        let mut renderer = em::WgpuRenderer::create(window.clone(), self.config.width, self.config.height, self.config.clone())
            .context("Failed to initialize the renderer")?;

        for path in &args.meshes
        {
            let meshes = eml::load_mesh(path).with_context(|| format!("Failed to load '{}'", path.display()))?;
            for mesh in meshes
            {
                renderer.upload_mesh_data(&mesh.vertices, &mesh.indices)
                    .with_context(|| format!("Rejected mesh '{}' of '{}'", mesh.name, path.display()))?;
            }
        }

        let eye    = args.eye.as_deref().map(|v| to_vec3("eye", v)).transpose()?;
        let target = args.target.as_deref().map(|v| to_vec3("target", v)).transpose()?;
        renderer.camera_set_pose(eye, target, None, None);

        renderer.begin_render_sequence(&args.out, args.t_min, args.t_max, args.step, args.samples)?;

        if let Some(seq) = renderer.render_sequence() {
            log::info!("Rendering {} frame(s) to '{}'", seq.frame_count, args.out.display());
        }

        return Ok(RenderContext { window, renderer });
    }

    fn finish(&mut self, event_loop: &ActiveEventLoop, result: anyhow::Result<()>)
    {
        println!();
        self.ctx = None;
        self.result.get_or_insert(result);
        event_loop.exit();
    }
}

impl ApplicationHandler for App
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop)
    {
        if self.ctx.is_some() { return; }

        match self.init(event_loop)
        {
            Ok(ctx) =>
            {
                ctx.window.request_redraw();
                self.ctx = Some(ctx);
            }
            Err(err) => { self.finish(event_loop, Err(err)); }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent)
    {
        match event
        {
            WindowEvent::CloseRequested =>
            {
                self.finish(event_loop, Err(anyhow::anyhow!("Window closed before the sequence completed")));
            },
            WindowEvent::RedrawRequested =>
            {
                self.update_and_render(event_loop);
            },
            _ => (),
        }
    }

    // Hidden windows don't always receive redraw requests.
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop)
    {
        if !self.cmd_line_args.visible && self.ctx.is_some() {
            self.update_and_render(event_loop);
        }
    }
}

impl App
{
    fn update_and_render(&mut self, event_loop: &ActiveEventLoop)
    {
        let Some(ctx) = self.ctx.as_mut() else { return; };

        if let Err(err) = ctx.renderer.draw(None)
        {
            self.finish(event_loop, Err(err.into()));
            return;
        }

        match ctx.renderer.poll()
        {
            em::SequenceStatus::Rendering { frame, count } =>
            {
                let stats = ctx.renderer.stats();
                let target = self.cmd_line_args.samples;
                print!("\rFrame {}/{}: {}/{} samples ", frame + 1, count, stats.total_samples.min(target), target);
                let _ = std::io::stdout().flush();
            }
            em::SequenceStatus::Saved { frame } =>
            {
                log::debug!("Frame {} saved", frame);
            }
            em::SequenceStatus::Completed =>
            {
                self.finish(event_loop, Ok(()));
                return;
            }
            em::SequenceStatus::Aborted | em::SequenceStatus::Idle =>
            {
                self.finish(event_loop, Err(anyhow::anyhow!("Render sequence aborted")));
                return;
            }
        }

        if self.cmd_line_args.visible {
            ctx.window.request_redraw();
        }
    }
}

fn to_vec3(name: &str, v: &[f32]) -> anyhow::Result<em::Vec3>
{
    let &[x, y, z] = v else {
        anyhow::bail!("--{} takes three comma separated values, got {}", name, v.len());
    };
    return Ok(em::Vec3::new(x, y, z));
}

fn run() -> anyhow::Result<()>
{
    let cmd_line_args = CmdLineArgs::parse();
    let config = em::RendererConfig::load(&cmd_line_args.config)
        .with_context(|| format!("Failed to read config '{}'", cmd_line_args.config.display()))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App { cmd_line_args, config, ctx: None, result: None };
    event_loop.run_app(&mut app)?;

    return app.result.unwrap_or_else(|| Err(anyhow::anyhow!("Event loop exited before rendering")));
}

fn main()
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run()
    {
        Ok(()) => { log::info!("Done."); }
        Err(err) =>
        {
            log::error!("{:#}", err);
            std::process::exit(1);
        }
    }
}
