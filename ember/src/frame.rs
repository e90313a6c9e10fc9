
use std::time::Instant;

use crate::error::*;
use crate::backend::*;
use crate::geometry::GeometryStore;
use crate::accel::AccelerationBuilder;
use crate::materials::MaterialTable;
use crate::camera::{CameraRig, RenderSettings};
use crate::accumulation::AccumulationController;
use crate::auto_spp::AutoSppController;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode
{
    /// Accumulate indefinitely.
    #[default]
    Progressive,
    /// Accumulate until `target_samples` samples per pixel are reached.
    Job { target_samples: u64 },
    /// The job reached its target, tracing is paused.
    Finished { target_samples: u64 },
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState
{
    #[default]
    Idle,
    Acquired,
    Traced,
    Presented,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus
{
    /// The frame went (or can go) through all stages.
    Ready,
    /// The swapchain was out of date. It was recreated and the frame dropped.
    Skipped,
}

/// Everything a frame reads or mutates, apart from the backend.
#[derive(Debug)]
pub struct SceneState
{
    pub store: GeometryStore,
    pub accel: AccelerationBuilder,
    pub materials: MaterialTable,
    pub camera: CameraRig,
    pub accum: AccumulationController,
    pub auto_spp: AutoSppController,
    pub settings: RenderSettings,
    pub mode: RenderMode,
}

#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct FrameTiming
{
    /// Host wall-clock time between the last two presents.
    pub frame_ms: f32,
    /// GPU time of the trace pass, when timestamps are available.
    pub gpu_ms: Option<f32>,
}

#[derive(Debug)]
pub struct FrameSequencer
{
    state: FrameState,
    slot: usize,
    frames_in_flight: usize,
    pending_resize: Option<(u32, u32)>,

    // Per-frame
    reset_this_frame: bool,
    dispatched: bool,
    submitted: bool,
    traced_spp: u32,

    last_present: Option<Instant>,
    timing: FrameTiming,
    presented_frames: u64,
    skipped_frames: u64,
}

impl FrameSequencer
{
    pub fn new(frames_in_flight: usize) -> Self
    {
        return Self {
            state: FrameState::Idle,
            slot: 0,
            frames_in_flight: frames_in_flight.max(1),
            pending_resize: None,
            reset_this_frame: false,
            dispatched: false,
            submitted: false,
            traced_spp: 0,
            last_present: None,
            timing: FrameTiming::default(),
            presented_frames: 0,
            skipped_frames: 0,
        };
    }

    pub fn state(&self) -> FrameState
    {
        return self.state;
    }

    pub fn slot(&self) -> usize
    {
        return self.slot;
    }

    pub fn timing(&self) -> FrameTiming
    {
        return self.timing;
    }

    pub fn presented_frames(&self) -> u64
    {
        return self.presented_frames;
    }

    pub fn skipped_frames(&self) -> u64
    {
        return self.skipped_frames;
    }

    /// The window was resized. The swapchain is recreated at the next
    /// present or out-of-date acquire.
    pub fn request_resize(&mut self, width: u32, height: u32)
    {
        self.pending_resize = Some((width.max(1), height.max(1)));
    }

    pub fn begin_frame<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, scene: &mut SceneState) -> Result<FrameStatus>
    {
        if self.state != FrameState::Idle {
            return Err(Error::InvalidState("begin_frame called while a frame is in progress"));
        }

        backend.wait_slot(self.slot)?;
        if let Some(gpu_ms) = backend.gpu_frame_time_ms(self.slot) {
            self.timing.gpu_ms = Some(gpu_ms);
        }

        scene.accel.rebuild_tlas_if_needed(backend, &scene.store, &mut scene.accum)?;

        match backend.acquire()?
        {
            AcquireOutcome::Acquired =>
            {
                self.state = FrameState::Acquired;
                self.reset_this_frame = false;
                self.dispatched = false;
                self.submitted = false;
                return Ok(FrameStatus::Ready);
            }
            AcquireOutcome::OutOfDate =>
            {
                log::warn!("Swapchain out of date, recreating and skipping the frame");
                self.recreate_swapchain(backend, scene)?;
                self.skipped_frames += 1;
                self.state = FrameState::Idle;
                return Ok(FrameStatus::Skipped);
            }
        }
    }

    /// Uploads material edits. Never blocks.
    pub fn update_scene<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, scene: &mut SceneState) -> Result<()>
    {
        if !scene.materials.is_dirty() { return Ok(()); }

        let packed = scene.materials.rebuild(&scene.store);
        backend.upload_materials(&packed)?;
        backend.update_descriptors()?;
        return Ok(());
    }

    pub fn trace<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, scene: &mut SceneState, overlay: Option<&mut B::Overlay>) -> Result<()>
    {
        if self.state != FrameState::Acquired {
            return Err(Error::InvalidState("trace requires an acquired swapchain image"));
        }

        self.reset_this_frame = scene.accum.begin_frame_reset();
        let dispatch = backend.descriptors_ready() && !matches!(scene.mode, RenderMode::Finished { .. });

        let uniform = scene.camera.scene_uniform(&scene.settings, scene.accum.gpu_frame(),
                                                 scene.accum.accum_frame(), scene.accum.total_samples());
        let record = FrameRecord {
            slot: self.slot,
            clear_accumulation: self.reset_this_frame,
            dispatch_trace: dispatch,
            uniform,
            viewport: scene.camera.viewport(),
        };

        backend.submit(&record, overlay)?;
        self.submitted = true;
        self.dispatched = dispatch;
        self.traced_spp = scene.settings.samples_per_pixel;
        self.state = FrameState::Traced;
        return Ok(());
    }

    pub fn present<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, scene: &mut SceneState) -> Result<()>
    {
        if self.state != FrameState::Traced {
            return Err(Error::InvalidState("present requires a traced frame"));
        }

        let outcome = backend.present()?;
        self.state = FrameState::Presented;

        if outcome == PresentOutcome::NeedsRecreate || self.pending_resize.is_some()
        {
            if outcome == PresentOutcome::NeedsRecreate {
                log::warn!("Swapchain suboptimal, recreating");
            }
            self.recreate_swapchain(backend, scene)?;
        }
        return Ok(());
    }

    pub fn end_frame<B: RenderBackend + ?Sized>(&mut self, _backend: &mut B, scene: &mut SceneState) -> Result<()>
    {
        if self.state == FrameState::Presented
        {
            let now = Instant::now();
            if let Some(last) = self.last_present
            {
                let frame_ms = now.duration_since(last).as_secs_f32() * 1000.0;
                self.timing.frame_ms = frame_ms;
                if let Some(new_spp) = scene.auto_spp.on_frame(frame_ms, scene.settings.samples_per_pixel) {
                    scene.settings.samples_per_pixel = new_spp;
                }
            }
            self.last_present = Some(now);
            self.presented_frames += 1;

            if self.dispatched && !self.reset_this_frame
            {
                scene.accum.record_traced_frame(self.traced_spp);
                scene.accum.advance_gpu_frame();
            }

            if let RenderMode::Job { target_samples } = scene.mode
            {
                if scene.accum.total_samples() >= target_samples
                {
                    log::info!("Render job finished ({} samples)", scene.accum.total_samples());
                    scene.mode = RenderMode::Finished { target_samples };
                }
            }
        }

        if self.submitted {
            self.slot = (self.slot + 1) % self.frames_in_flight;
        }

        self.state = FrameState::Idle;
        self.reset_this_frame = false;
        self.dispatched = false;
        self.submitted = false;
        return Ok(());
    }

    /// Runs a whole frame, stopping early if it had to be skipped.
    pub fn draw<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, scene: &mut SceneState, overlay: Option<&mut B::Overlay>) -> Result<FrameStatus>
    {
        if self.begin_frame(backend, scene)? == FrameStatus::Skipped {
            return Ok(FrameStatus::Skipped);
        }

        self.update_scene(backend, scene)?;
        self.trace(backend, scene, overlay)?;
        self.present(backend, scene)?;
        self.end_frame(backend, scene)?;
        return Ok(FrameStatus::Ready);
    }

    fn recreate_swapchain<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, scene: &mut SceneState) -> Result<()>
    {
        let (width, height) = self.pending_resize.take().unwrap_or_else(|| backend.framebuffer_size());

        backend.wait_idle()?;
        let (width, height) = backend.recreate_swapchain(width, height)?;
        scene.camera.set_framebuffer_size(width, height);
        scene.accum.invalidate();
        scene.auto_spp.fast_adapt();
        self.last_present = None;

        log::info!("Swapchain recreated ({}x{})", width, height);
        return Ok(());
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::config::AutoSppConfig;
    use crate::geometry::tests::triangle;
    use crate::tonemapping::ToneMapMode;

    fn scene(width: u32, height: u32) -> SceneState
    {
        return SceneState {
            store: GeometryStore::new(),
            accel: AccelerationBuilder::new(),
            materials: MaterialTable::new(),
            camera: CameraRig::new(width, height),
            accum: AccumulationController::new(),
            auto_spp: AutoSppController::new(&AutoSppConfig::default()),
            settings: RenderSettings {
                samples_per_pixel: 4,
                max_bounces: 4,
                tonemap: ToneMapMode::Aces,
                time_min: 0.0,
                time_max: 0.0,
            },
            mode: RenderMode::Progressive,
        };
    }

    fn scene_with_mesh(backend: &mut MockBackend) -> SceneState
    {
        let mut scene = scene(64, 64);
        let (verts, indices) = triangle(0.0);
        scene.store.upload_mesh(&verts, &indices).unwrap();
        scene.accel.rebuild_topology(backend, &mut scene.store, &mut scene.materials, &mut scene.accum).unwrap();
        return scene;
    }

    #[test]
    fn test_full_frame_advances_slot()
    {
        let mut backend = MockBackend::new(64, 64);
        let mut scene = scene_with_mesh(&mut backend);
        let mut frames = FrameSequencer::new(2);

        assert_eq!(frames.draw(&mut backend, &mut scene, None).unwrap(), FrameStatus::Ready);
        assert_eq!(frames.slot(), 1);
        assert_eq!(frames.state(), FrameState::Idle);
        assert_eq!(backend.submitted.len(), 1);
        assert!(backend.submitted[0].clear_accumulation);
        assert!(backend.submitted[0].dispatch_trace);

        frames.draw(&mut backend, &mut scene, None).unwrap();
        frames.draw(&mut backend, &mut scene, None).unwrap();
        assert_eq!(frames.slot(), 1);
        assert_eq!(backend.slot_waits, vec![0, 1, 0]);
        // The reset frame doesn't count towards accumulation.
        assert_eq!(scene.accum.accum_frame(), 2);
        assert_eq!(scene.accum.total_samples(), 8);
    }

    #[test]
    fn test_out_of_date_skips_frame()
    {
        let mut backend = MockBackend::new(64, 64);
        let mut scene = scene_with_mesh(&mut backend);
        let mut frames = FrameSequencer::new(2);
        frames.draw(&mut backend, &mut scene, None).unwrap();
        frames.draw(&mut backend, &mut scene, None).unwrap();
        assert_eq!(scene.accum.total_samples(), 4);

        backend.acquire_script.push_back(AcquireOutcome::OutOfDate);
        assert_eq!(frames.draw(&mut backend, &mut scene, None).unwrap(), FrameStatus::Skipped);
        assert_eq!(backend.swapchain_recreations, 1);
        assert_eq!(frames.skipped_frames(), 1);
        assert_eq!(frames.slot(), 0);
        assert_eq!(frames.state(), FrameState::Idle);
        assert_eq!(backend.submitted.len(), 2);
        assert!(scene.accum.needs_reset());

        frames.draw(&mut backend, &mut scene, None).unwrap();
        assert_eq!(scene.accum.total_samples(), 0);
        assert!(backend.submitted[2].clear_accumulation);
    }

    #[test]
    fn test_suboptimal_present_recreates()
    {
        let mut backend = MockBackend::new(64, 64);
        let mut scene = scene_with_mesh(&mut backend);
        let mut frames = FrameSequencer::new(2);
        frames.draw(&mut backend, &mut scene, None).unwrap();

        backend.suboptimal_next_present = true;
        assert_eq!(frames.draw(&mut backend, &mut scene, None).unwrap(), FrameStatus::Ready);
        assert_eq!(backend.swapchain_recreations, 1);
        assert!(scene.accum.needs_reset());
    }

    #[test]
    fn test_pending_resize_applies_on_present()
    {
        let mut backend = MockBackend::new(64, 64);
        let mut scene = scene_with_mesh(&mut backend);
        let mut frames = FrameSequencer::new(2);

        frames.request_resize(128, 32);
        frames.draw(&mut backend, &mut scene, None).unwrap();
        assert_eq!(backend.framebuffer, (128, 32));
        assert_eq!(scene.camera.viewport().w, 128);
        assert_eq!(scene.camera.viewport().h, 32);
    }

    #[test]
    fn test_empty_scene_presents_without_tracing()
    {
        let mut backend = MockBackend::new(64, 64);
        let mut scene = scene(64, 64);
        let mut frames = FrameSequencer::new(2);

        frames.draw(&mut backend, &mut scene, None).unwrap();
        assert_eq!(backend.presents, 1);
        assert!(!backend.submitted[0].dispatch_trace);
        assert_eq!(scene.accum.gpu_frame(), 0);
    }

    #[test]
    fn test_job_finishes_and_stops_dispatch()
    {
        let mut backend = MockBackend::new(64, 64);
        let mut scene = scene_with_mesh(&mut backend);
        let mut frames = FrameSequencer::new(2);
        scene.mode = RenderMode::Job { target_samples: 8 };

        for _ in 0..3 {
            frames.draw(&mut backend, &mut scene, None).unwrap();
        }
        assert_eq!(scene.mode, RenderMode::Finished { target_samples: 8 });

        frames.draw(&mut backend, &mut scene, None).unwrap();
        assert!(!backend.submitted.last().unwrap().dispatch_trace);
        assert_eq!(scene.accum.total_samples(), 8);
    }

    #[test]
    fn test_lost_device_is_fatal()
    {
        let mut backend = MockBackend::new(64, 64);
        let mut scene = scene_with_mesh(&mut backend);
        let mut frames = FrameSequencer::new(2);
        frames.draw(&mut backend, &mut scene, None).unwrap();

        backend.device_lost = true;
        assert!(matches!(frames.draw(&mut backend, &mut scene, None), Err(Error::DeviceLost(_))));
        assert_eq!(backend.submitted.len(), 1);
        assert_eq!(backend.presents, 1);
        assert_eq!(frames.state(), FrameState::Idle);
    }

    #[test]
    fn test_out_of_order_calls_are_rejected()
    {
        let mut backend = MockBackend::new(64, 64);
        let mut scene = scene(64, 64);
        let mut frames = FrameSequencer::new(2);

        assert!(matches!(frames.trace(&mut backend, &mut scene, None), Err(Error::InvalidState(_))));
        assert!(matches!(frames.present(&mut backend, &mut scene), Err(Error::InvalidState(_))));
        frames.begin_frame(&mut backend, &mut scene).unwrap();
        assert!(matches!(frames.begin_frame(&mut backend, &mut scene), Err(Error::InvalidState(_))));
    }
}
