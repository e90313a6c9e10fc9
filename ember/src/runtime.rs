
use std::path::Path;

use crate::base::*;
use crate::error::*;
use crate::backend::*;
use crate::config::*;
use crate::geometry::{GeometryStore, Transform, Vertex};
use crate::materials::{MaterialRecord, MaterialTable};
use crate::accel::AccelerationBuilder;
use crate::camera::{CameraInput, CameraPose, CameraRig, RenderSettings, Viewport};
use crate::accumulation::AccumulationController;
use crate::auto_spp::{AutoSppController, MIN_SPP, MAX_SPP};
use crate::frame::*;
use crate::sequence::*;
use crate::tonemapping::ToneMapMode;
use crate::export::write_png_rgba16;
use crate::wgpu_backend::WgpuBackend;

pub type WgpuRenderer = Renderer<WgpuBackend>;

#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct FrameStats
{
    pub accum_frame: u32,
    pub total_samples: u64,
    pub samples_per_pixel: u32,
    pub frame_ms: f32,
    pub gpu_ms: Option<f32>,
    pub resets: u64,
    pub presented_frames: u64,
    /// Frames dropped because the swapchain was out of date.
    pub skipped_frames: u64,
    pub mode: RenderMode,
}

pub struct Renderer<B: RenderBackend>
{
    config: RendererConfig,
    backend: B,
    scene: SceneState,
    frames: FrameSequencer,
    sequence: RenderSequenceDriver,
}

impl Renderer<WgpuBackend>
{
    /// Creates the wgpu backend for `window` and a renderer on top of it.
    pub fn create(window: impl Into<wgpu::SurfaceTarget<'static>>, width: u32, height: u32, config: RendererConfig) -> Result<Self>
    {
        let config = config.validated();
        let backend = WgpuBackend::new(window, width, height, &config)?;
        return Ok(Self::new(config, backend));
    }
}

impl<B: RenderBackend> Renderer<B>
{
    pub fn new(config: RendererConfig, backend: B) -> Self
    {
        let config = config.validated();
        let (width, height) = backend.framebuffer_size();

        let scene = SceneState {
            store: GeometryStore::new(),
            accel: AccelerationBuilder::new(),
            materials: MaterialTable::new(),
            camera: CameraRig::new(width, height),
            accum: AccumulationController::new(),
            auto_spp: AutoSppController::new(&config.auto_spp),
            settings: RenderSettings {
                samples_per_pixel: config.samples_per_pixel,
                max_bounces: config.max_bounces,
                tonemap: config.tonemap,
                time_min: 0.0,
                time_max: 0.0,
            },
            mode: RenderMode::Progressive,
        };

        let frames = FrameSequencer::new(backend.frames_in_flight());
        return Self { config, backend, scene, frames, sequence: RenderSequenceDriver::new() };
    }

    pub fn config(&self) -> &RendererConfig
    {
        return &self.config;
    }

    pub fn backend(&self) -> &B
    {
        return &self.backend;
    }

    pub fn backend_mut(&mut self) -> &mut B
    {
        return &mut self.backend;
    }

    pub fn scene(&self) -> &SceneState
    {
        return &self.scene;
    }

    /// The window was resized. Applied at the next present.
    pub fn resize(&mut self, width: u32, height: u32)
    {
        self.frames.request_resize(width, height);
    }

    ////////
    // Frame

    pub fn begin_frame(&mut self) -> Result<FrameStatus>
    {
        return self.frames.begin_frame(&mut self.backend, &mut self.scene);
    }

    pub fn update_scene(&mut self) -> Result<()>
    {
        return self.frames.update_scene(&mut self.backend, &mut self.scene);
    }

    pub fn trace(&mut self, overlay: Option<&mut B::Overlay>) -> Result<()>
    {
        return self.frames.trace(&mut self.backend, &mut self.scene, overlay);
    }

    pub fn present(&mut self) -> Result<()>
    {
        return self.frames.present(&mut self.backend, &mut self.scene);
    }

    pub fn end_frame(&mut self) -> Result<()>
    {
        return self.frames.end_frame(&mut self.backend, &mut self.scene);
    }

    pub fn draw(&mut self, overlay: Option<&mut B::Overlay>) -> Result<FrameStatus>
    {
        return self.frames.draw(&mut self.backend, &mut self.scene, overlay);
    }

    /// Advances the active render sequence, if any. Call after each frame.
    pub fn poll(&mut self) -> SequenceStatus
    {
        let mut driver = std::mem::take(&mut self.sequence);
        let status = driver.poll(self);
        self.sequence = driver;
        return status;
    }

    ////////
    // Meshes

    /// Adds a mesh instance and rebuilds the acceleration structures.
    /// Returns the new instance's index.
    pub fn upload_mesh_data(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<usize>
    {
        let index = self.scene.store.upload_mesh(vertices, indices)
            .inspect_err(|err| log::warn!("Rejected mesh upload: {}", err))?;

        self.rebuild_topology()?;
        log::info!("Uploaded mesh {} ({} vertices, {} triangles{})", index, vertices.len(), indices.len() / 3,
                   if self.scene.store.owns_geometry(index) == Some(false) { ", shared" } else { "" });
        return Ok(index);
    }

    pub fn remove_mesh(&mut self, index: usize) -> Result<()>
    {
        self.scene.store.check_index(index).inspect_err(|err| log::warn!("Cannot remove mesh: {}", err))?;

        self.scene.store.remove_mesh(index)?;
        self.rebuild_topology()?;
        log::info!("Removed mesh {} ({} left)", index, self.scene.store.len());
        return Ok(());
    }

    pub fn mesh_count(&self) -> u32
    {
        return self.scene.store.mesh_count();
    }

    pub fn set_mesh_transform(&mut self, index: usize, transform: Transform) -> Result<()>
    {
        if !transform.position.is_finite() || !transform.rotation.is_finite() || !transform.scale.is_finite()
        {
            log::warn!("Ignoring non-finite transform for mesh {}", index);
            return Err(Error::InvalidState("non-finite transform"));
        }

        let changed = self.scene.store.set_transform(index, transform)
            .inspect_err(|err| log::warn!("Cannot set transform: {}", err))?;
        if changed
        {
            self.scene.accel.mark_tlas_dirty();
            self.scene.accum.invalidate();
        }
        return Ok(());
    }

    pub fn mesh_transform(&self, index: usize) -> Result<Transform>
    {
        self.scene.store.check_index(index)?;
        return Ok(self.scene.store.instances()[index].transform);
    }

    pub fn set_mesh_material(&mut self, index: usize, material: MaterialRecord) -> Result<()>
    {
        let changed = self.scene.store.set_material(index, material)
            .inspect_err(|err| log::warn!("Cannot set material: {}", err))?;
        if changed
        {
            self.scene.materials.mark_dirty();
            self.scene.accum.invalidate();
        }
        return Ok(());
    }

    pub fn mesh_material(&self, index: usize) -> Result<MaterialRecord>
    {
        self.scene.store.check_index(index)?;
        return Ok(self.scene.store.instances()[index].material);
    }

    fn rebuild_topology(&mut self) -> Result<()>
    {
        let scene = &mut self.scene;
        return scene.accel.rebuild_topology(&mut self.backend, &mut scene.store, &mut scene.materials, &mut scene.accum);
    }

    ////////
    // Camera

    /// A zero or 1x1 rect selects the whole framebuffer.
    pub fn set_render_viewport(&mut self, x: u32, y: u32, w: u32, h: u32) -> bool
    {
        let changed = self.scene.camera.set_viewport(x, y, w, h);
        if changed { self.scene.accum.invalidate(); }
        return changed;
    }

    pub fn render_viewport(&self) -> Viewport
    {
        return self.scene.camera.viewport();
    }

    pub fn camera_set_pose(&mut self, position: Option<Vec3>, target: Option<Vec3>, up: Option<Vec3>, vfov: Option<f32>) -> bool
    {
        let changed = self.scene.camera.set_pose(position, target, up, vfov);
        if changed { self.scene.accum.invalidate(); }
        return changed;
    }

    pub fn camera_get_pose(&self) -> CameraPose
    {
        return self.scene.camera.pose();
    }

    pub fn apply_camera_input(&mut self, input: &CameraInput) -> bool
    {
        let changed = self.scene.camera.apply_orbit_pan_zoom(input);
        if changed { self.scene.accum.invalidate(); }
        return changed;
    }

    pub fn invalidate_accumulation(&mut self)
    {
        self.scene.accum.invalidate();
    }

    ////////
    // Settings

    pub fn samples_per_pixel(&self) -> u32
    {
        return self.scene.settings.samples_per_pixel;
    }

    pub fn set_samples_per_pixel(&mut self, spp: u32)
    {
        let spp = spp.clamp(MIN_SPP, MAX_SPP);
        if spp == self.scene.settings.samples_per_pixel { return; }

        self.scene.settings.samples_per_pixel = spp;
        self.scene.accum.invalidate();
        self.scene.auto_spp.fast_adapt();
    }

    pub fn auto_spp_enabled(&self) -> bool
    {
        return self.scene.auto_spp.is_enabled();
    }

    pub fn set_auto_spp_enabled(&mut self, enabled: bool)
    {
        if self.scene.auto_spp.set_enabled(enabled) {
            log::info!("Auto SPP {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    pub fn auto_spp_target_fps(&self) -> f32
    {
        return self.scene.auto_spp.target_fps();
    }

    pub fn set_auto_spp_target_fps(&mut self, fps: f32)
    {
        if !fps.is_finite() || fps <= 0.0
        {
            log::warn!("Ignoring invalid auto SPP target of {} FPS", fps);
            return;
        }
        self.scene.auto_spp.set_target_fps(fps);
    }

    pub fn max_bounces(&self) -> u32
    {
        return self.scene.settings.max_bounces;
    }

    pub fn set_max_bounces(&mut self, bounces: u32)
    {
        let bounces = bounces.clamp(1, MAX_BOUNCES);
        if bounces == self.scene.settings.max_bounces { return; }

        self.scene.settings.max_bounces = bounces;
        self.scene.accum.invalidate();
    }

    pub fn tone_mapping_mode(&self) -> ToneMapMode
    {
        return self.scene.settings.tonemap;
    }

    pub fn set_tone_mapping_mode(&mut self, mode: ToneMapMode)
    {
        if mode == self.scene.settings.tonemap { return; }

        self.scene.settings.tonemap = mode;
        self.scene.accum.invalidate();
    }

    pub fn time_range(&self) -> (f32, f32)
    {
        return (self.scene.settings.time_min, self.scene.settings.time_max);
    }

    pub fn set_time_range(&mut self, min: f32, max: f32)
    {
        if !min.is_finite() || !max.is_finite()
        {
            log::warn!("Ignoring non-finite time range [{}, {}]", min, max);
            return;
        }

        let max = max.max(min);
        if (min, max) == self.time_range() { return; }

        self.scene.settings.time_min = min;
        self.scene.settings.time_max = max;
        self.scene.accum.invalidate();
    }

    ////////
    // Jobs and export

    pub fn render_mode(&self) -> RenderMode
    {
        return self.scene.mode;
    }

    /// Accumulates from scratch until `target_samples` samples per pixel
    /// are reached, then stops tracing.
    pub fn start_render_job(&mut self, target_samples: u64)
    {
        let target_samples = target_samples.max(1);
        self.scene.mode = RenderMode::Job { target_samples };
        self.scene.accum.invalidate();
        log::info!("Render job started ({} samples)", target_samples);
    }

    /// Goes back to progressive rendering. An active sequence aborts at
    /// its next poll.
    pub fn cancel_render_job(&mut self)
    {
        if self.scene.mode == RenderMode::Progressive { return; }

        self.scene.mode = RenderMode::Progressive;
        log::info!("Render job cancelled");
    }

    pub fn begin_render_sequence(&mut self, folder: &Path, time_min: f32, time_max: f32, time_step: f32, target_samples: u64) -> Result<()>
    {
        let mut driver = std::mem::take(&mut self.sequence);
        let res = driver.begin_sequence(self, folder, time_min, time_max, time_step, target_samples);
        self.sequence = driver;
        return res.inspect_err(|err| log::warn!("Cannot start render sequence: {}", err));
    }

    pub fn cancel_render_sequence(&mut self)
    {
        if !self.sequence.is_active() { return; }

        self.sequence.cancel();
        self.cancel_render_job();
    }

    pub fn render_sequence(&self) -> Option<&ActiveSequence>
    {
        return self.sequence.active();
    }

    /// Writes the current output, cropped to the render viewport, as a
    /// 16-bit RGBA PNG.
    pub fn save_current_render_png(&mut self, path: &Path) -> Result<()>
    {
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidPath);
        }

        self.backend.wait_idle()?;
        let viewport = self.scene.camera.viewport();
        let pixels = self.backend.read_output(viewport)?;
        write_png_rgba16(path, viewport.w, viewport.h, &pixels)?;

        log::info!("Saved '{}' ({}x{}, {} samples)", path.display(), viewport.w, viewport.h, self.scene.accum.total_samples());
        return Ok(());
    }

    pub fn stats(&self) -> FrameStats
    {
        let timing = self.frames.timing();
        return FrameStats {
            accum_frame: self.scene.accum.accum_frame(),
            total_samples: self.scene.accum.total_samples(),
            samples_per_pixel: self.scene.settings.samples_per_pixel,
            frame_ms: timing.frame_ms,
            gpu_ms: timing.gpu_ms,
            resets: self.scene.accum.reset_count(),
            presented_frames: self.frames.presented_frames(),
            skipped_frames: self.frames.skipped_frames(),
            mode: self.scene.mode,
        };
    }
}

impl<B: RenderBackend> SequenceTarget for Renderer<B>
{
    fn set_time_range(&mut self, min: f32, max: f32)
    {
        Renderer::set_time_range(self, min, max);
    }

    fn start_render_job(&mut self, target_samples: u64)
    {
        Renderer::start_render_job(self, target_samples);
    }

    fn render_mode(&self) -> RenderMode
    {
        return Renderer::render_mode(self);
    }

    fn save_current_render_png(&mut self, path: &Path) -> Result<()>
    {
        return Renderer::save_current_render_png(self, path);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::geometry::tests::triangle;

    fn renderer() -> Renderer<MockBackend>
    {
        return Renderer::new(RendererConfig::default(), MockBackend::new(64, 64));
    }

    fn renderer_with_meshes(count: usize) -> Renderer<MockBackend>
    {
        let mut r = renderer();
        for i in 0..count
        {
            let (verts, indices) = triangle(i as f32 * 2.0);
            r.upload_mesh_data(&verts, &indices).unwrap();
        }
        return r;
    }

    /// Draws until some samples have accumulated.
    fn settle(r: &mut Renderer<MockBackend>)
    {
        r.draw(None).unwrap();
        r.draw(None).unwrap();
        assert!(r.stats().total_samples > 0);
        assert!(!r.scene().accum.needs_reset());
    }

    #[test]
    fn test_every_invalidation_source_resets()
    {
        type R = Renderer<MockBackend>;
        let edits: Vec<(&str, fn(&mut R))> = vec![
            ("transform", |r: &mut R| {
                let t = Transform { position: Vec3::new(1.0, 2.0, 3.0), ..Default::default() };
                r.set_mesh_transform(0, t).unwrap();
            }),
            ("material", |r: &mut R| {
                let m = MaterialRecord { roughness: 0.1, ..Default::default() };
                r.set_mesh_material(0, m).unwrap();
            }),
            ("pose", |r: &mut R| { assert!(r.camera_set_pose(Some(Vec3::new(3.0, 3.0, 3.0)), None, None, None)); }),
            ("viewport", |r: &mut R| { assert!(r.set_render_viewport(8, 8, 32, 32)); }),
            ("spp", |r: &mut R| r.set_samples_per_pixel(16)),
            ("tonemap", |r: &mut R| r.set_tone_mapping_mode(ToneMapMode::Filmic)),
            ("time", |r: &mut R| r.set_time_range(0.0, 0.5)),
            ("bounces", |r: &mut R| r.set_max_bounces(12)),
            ("explicit", |r: &mut R| r.invalidate_accumulation()),
        ];

        for (name, edit) in edits
        {
            let mut r = renderer_with_meshes(1);
            settle(&mut r);
            let resets = r.stats().resets;

            edit(&mut r);
            r.draw(None).unwrap();

            let stats = r.stats();
            assert_eq!(stats.accum_frame, 0, "{}", name);
            assert_eq!(stats.total_samples, 0, "{}", name);
            assert_eq!(stats.resets, resets + 1, "{}", name);
            assert!(r.backend().submitted.last().unwrap().clear_accumulation, "{}", name);
        }
    }

    #[test]
    fn test_unchanged_setters_do_nothing()
    {
        let mut r = renderer_with_meshes(1);
        settle(&mut r);

        r.set_mesh_transform(0, Transform::default()).unwrap();
        r.set_mesh_material(0, MaterialRecord::default()).unwrap();
        r.set_samples_per_pixel(r.samples_per_pixel());
        r.set_tone_mapping_mode(r.tone_mapping_mode());
        r.set_time_range(0.0, 0.0);
        r.set_render_viewport(0, 0, 0, 0);
        assert!(!r.camera_set_pose(None, None, None, None));

        assert!(!r.scene().accum.needs_reset());
        assert!(!r.scene().accel.needs_tlas_rebuild());
    }

    #[test]
    fn test_transform_edits_batch_into_one_tlas_build()
    {
        let mut r = renderer_with_meshes(2);
        settle(&mut r);
        let builds = r.backend().tlas_builds;
        let waits = r.backend().wait_idles;

        for i in 0..10
        {
            let t = Transform { position: Vec3::new(i as f32, 0.0, 0.0), ..Default::default() };
            r.set_mesh_transform(i % 2, t).unwrap();
        }
        assert_eq!(r.backend().tlas_builds, builds);

        r.draw(None).unwrap();
        assert_eq!(r.backend().tlas_builds, builds + 1);
        assert_eq!(r.backend().wait_idles, waits + 1);

        r.draw(None).unwrap();
        assert_eq!(r.backend().tlas_builds, builds + 1);
    }

    #[test]
    fn test_bad_index_leaves_state_untouched()
    {
        let mut r = renderer_with_meshes(2);
        settle(&mut r);
        let rebuilds = r.scene().accel.stats().topology_rebuilds;

        assert!(matches!(r.remove_mesh(2), Err(Error::MeshIndexOutOfRange { index: 2, count: 2 })));
        assert!(matches!(r.set_mesh_transform(5, Transform::default()), Err(Error::MeshIndexOutOfRange { .. })));
        assert!(matches!(r.set_mesh_material(5, MaterialRecord::default()), Err(Error::MeshIndexOutOfRange { .. })));
        assert!(r.mesh_transform(5).is_err());
        assert!(r.mesh_material(5).is_err());

        assert_eq!(r.mesh_count(), 2);
        assert_eq!(r.scene().accel.stats().topology_rebuilds, rebuilds);
        assert!(!r.scene().accum.needs_reset());
        assert!(!r.scene().materials.is_dirty());
    }

    #[test]
    fn test_rejected_upload_does_not_rebuild()
    {
        let mut r = renderer();
        assert!(matches!(r.upload_mesh_data(&[], &[]), Err(Error::EmptyMesh)));
        assert_eq!(r.mesh_count(), 0);
        assert_eq!(r.scene().accel.stats().topology_rebuilds, 0);
        assert_eq!(r.backend().geometry_uploads, 0);
    }

    #[test]
    fn test_shared_mesh_removal_keeps_blas_alive()
    {
        let mut r = renderer();
        let (verts, indices) = triangle(0.0);
        r.upload_mesh_data(&verts, &indices).unwrap();
        r.upload_mesh_data(&verts, &indices).unwrap();
        assert_eq!(r.backend().live_blas.len(), 1);
        assert_eq!(r.backend().tlas.as_ref().unwrap().len(), 2);

        r.remove_mesh(0).unwrap();
        assert_eq!(r.mesh_count(), 1);
        assert_eq!(r.scene().store.owns_geometry(0), Some(true));
        assert_eq!(r.backend().live_blas.len(), 1);
        assert_eq!(r.backend().tlas.as_ref().unwrap().len(), 1);

        r.remove_mesh(0).unwrap();
        assert_eq!(r.mesh_count(), 0);
        assert!(r.backend().live_blas.is_empty());
        assert!(r.backend().tlas.is_none());

        // Empty scene still presents.
        r.draw(None).unwrap();
        assert!(!r.backend().submitted.last().unwrap().dispatch_trace);
    }

    #[test]
    fn test_render_sequence_writes_every_frame()
    {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("seq");
        let mut r = renderer_with_meshes(1);

        r.begin_render_sequence(&folder, 0.0, 1.0, 0.25, 8).unwrap();
        let mut times = Vec::new();
        let mut completed = false;
        for _ in 0..200
        {
            r.draw(None).unwrap();
            let time = r.time_range().1;
            match r.poll()
            {
                SequenceStatus::Saved { .. } => times.push(time),
                SequenceStatus::Completed => { times.push(time); completed = true; break; }
                SequenceStatus::Aborted => panic!("sequence aborted"),
                _ => {}
            }
        }

        assert!(completed);
        assert!(r.render_sequence().is_none());
        assert_eq!(times, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        for i in 0..5
        {
            let img = image::open(folder.join(format!("{:04}.png", i))).unwrap().into_rgba16();
            assert_eq!(img.dimensions(), (64, 64));
        }
        assert!(!folder.join("0005.png").exists());
    }

    #[test]
    fn test_cancel_sequence_returns_to_progressive()
    {
        let dir = tempfile::tempdir().unwrap();
        let mut r = renderer_with_meshes(1);
        r.begin_render_sequence(dir.path(), 0.0, 1.0, 0.5, 1000).unwrap();
        r.draw(None).unwrap();
        assert!(matches!(r.render_mode(), RenderMode::Job { .. }));

        r.cancel_render_sequence();
        assert_eq!(r.render_mode(), RenderMode::Progressive);
        assert_eq!(r.poll(), SequenceStatus::Idle);
    }

    #[test]
    fn test_save_png_crops_to_viewport()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let mut r = renderer_with_meshes(1);
        r.set_render_viewport(4, 4, 16, 8);
        r.draw(None).unwrap();

        r.save_current_render_png(&path).unwrap();
        let img = image::open(&path).unwrap().into_rgba16();
        assert_eq!(img.dimensions(), (16, 8));

        assert!(matches!(r.save_current_render_png(Path::new("")), Err(Error::InvalidPath)));
    }
}
