
use std::path::{Path, PathBuf};

use crate::error::*;
use crate::frame::RenderMode;

/// What the driver needs from the renderer.
pub trait SequenceTarget
{
    fn set_time_range(&mut self, min: f32, max: f32);
    fn start_render_job(&mut self, target_samples: u64);
    fn render_mode(&self) -> RenderMode;
    fn save_current_render_png(&mut self, path: &Path) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceStatus
{
    Idle,
    Rendering { frame: u32, count: u32 },
    Saved { frame: u32 },
    Completed,
    Aborted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActiveSequence
{
    pub frame_index: u32,
    pub frame_count: u32,
    pub time_min: f32,
    pub time_max: f32,
    pub time_step: f32,
    pub target_samples: u64,
    pub folder: PathBuf,
}

impl ActiveSequence
{
    pub fn frame_time(&self, index: u32) -> f32
    {
        return (self.time_min + index as f32 * self.time_step).min(self.time_max);
    }

    pub fn frame_path(&self, index: u32) -> PathBuf
    {
        return self.folder.join(format!("{:04}.png", index));
    }
}

/// Renders a time range to numbered PNG files, one render job per frame.
#[derive(Default, Debug)]
pub struct RenderSequenceDriver
{
    active: Option<ActiveSequence>,
}

/// Number of frames covering `[min, max]` in steps of `step`, after
/// sanitizing the range. Returns `(min, max, step, count)`.
pub fn sanitize_time_range(min: f32, max: f32, step: f32) -> (f32, f32, f32, u32)
{
    let min = if min.is_finite() { min } else { 0.0 };
    let max = if max.is_finite() { max } else { 0.0 };
    let max = max.max(min);

    if !step.is_finite() || step <= 0.0 {
        return (min, max, 0.0, 1);
    }

    // Float to int casts saturate, so an infinite ratio lands on the cap.
    let count = (((max - min) / step).ceil() as u32).min(u32::MAX - 1);
    return (min, max, step, count + 1);
}

impl RenderSequenceDriver
{
    pub fn new() -> Self
    {
        return Self::default();
    }

    pub fn is_active(&self) -> bool
    {
        return self.active.is_some();
    }

    pub fn active(&self) -> Option<&ActiveSequence>
    {
        return self.active.as_ref();
    }

    pub fn begin_sequence<T: SequenceTarget + ?Sized>(&mut self, target: &mut T, folder: &Path,
                                                      time_min: f32, time_max: f32, time_step: f32,
                                                      target_samples: u64) -> Result<()>
    {
        if folder.as_os_str().is_empty() {
            return Err(Error::InvalidPath);
        }
        std::fs::create_dir_all(folder)?;

        let (time_min, time_max, time_step, frame_count) = sanitize_time_range(time_min, time_max, time_step);
        let sequence = ActiveSequence {
            frame_index: 0,
            frame_count,
            time_min,
            time_max,
            time_step,
            target_samples: target_samples.max(1),
            folder: folder.to_path_buf(),
        };

        log::info!("Render sequence: {} frames over [{}, {}] into '{}'", frame_count, time_min, time_max, folder.display());

        target.set_time_range(time_min, sequence.frame_time(0));
        target.start_render_job(sequence.target_samples);
        self.active = Some(sequence);
        return Ok(());
    }

    pub fn cancel(&mut self)
    {
        if self.active.take().is_some() {
            log::info!("Render sequence cancelled");
        }
    }

    /// Call once per frame, after presenting.
    pub fn poll<T: SequenceTarget + ?Sized>(&mut self, target: &mut T) -> SequenceStatus
    {
        let Some(seq) = self.active.as_mut() else { return SequenceStatus::Idle; };

        match target.render_mode()
        {
            RenderMode::Job { .. } =>
            {
                return SequenceStatus::Rendering { frame: seq.frame_index, count: seq.frame_count };
            }
            RenderMode::Progressive =>
            {
                log::warn!("Render job cancelled externally, aborting sequence at frame {}", seq.frame_index);
                self.active = None;
                return SequenceStatus::Aborted;
            }
            RenderMode::Finished { .. } => {}
        }

        let frame = seq.frame_index;
        let path = seq.frame_path(frame);
        if let Err(err) = target.save_current_render_png(&path)
        {
            log::error!("Failed to save '{}': {}, aborting sequence", path.display(), err);
            self.active = None;
            return SequenceStatus::Aborted;
        }

        seq.frame_index += 1;
        if seq.frame_index >= seq.frame_count
        {
            log::info!("Render sequence completed ({} frames)", seq.frame_count);
            self.active = None;
            return SequenceStatus::Completed;
        }

        target.set_time_range(seq.time_min, seq.frame_time(seq.frame_index));
        target.start_render_job(seq.target_samples);
        return SequenceStatus::Saved { frame };
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[derive(Default)]
    struct FakeRenderer
    {
        mode: RenderMode,
        time_ranges: Vec<(f32, f32)>,
        saved: Vec<PathBuf>,
        fail_saves: bool,
    }

    impl FakeRenderer
    {
        fn finish_job(&mut self)
        {
            if let RenderMode::Job { target_samples } = self.mode {
                self.mode = RenderMode::Finished { target_samples };
            }
        }
    }

    impl SequenceTarget for FakeRenderer
    {
        fn set_time_range(&mut self, min: f32, max: f32)
        {
            self.time_ranges.push((min, max));
        }

        fn start_render_job(&mut self, target_samples: u64)
        {
            self.mode = RenderMode::Job { target_samples };
        }

        fn render_mode(&self) -> RenderMode
        {
            return self.mode;
        }

        fn save_current_render_png(&mut self, path: &Path) -> Result<()>
        {
            if self.fail_saves {
                return Err(Error::InvalidPath);
            }
            self.saved.push(path.to_path_buf());
            return Ok(());
        }
    }

    #[test]
    fn test_frame_count()
    {
        assert_eq!(sanitize_time_range(0.0, 1.0, 0.25).3, 5);
        assert_eq!(sanitize_time_range(0.0, 1.0, 0.3).3, 5);
        assert_eq!(sanitize_time_range(0.0, 0.0, 0.1).3, 1);
        assert_eq!(sanitize_time_range(2.0, 1.0, 0.1), (2.0, 2.0, 0.1, 1));
        assert_eq!(sanitize_time_range(0.0, 1.0, 0.0).3, 1);
        assert_eq!(sanitize_time_range(0.0, 1.0, f32::NAN).3, 1);
        assert_eq!(sanitize_time_range(f32::NAN, f32::INFINITY, 0.5), (0.0, 0.0, 0.5, 1));

        // Huge and infinite frame counts are capped instead of overflowing.
        assert_eq!(sanitize_time_range(0.0, 1e10, 1.0).3, u32::MAX);
        assert_eq!(sanitize_time_range(0.0, 1.0, 1e-39).3, u32::MAX);
        assert_eq!(sanitize_time_range(-3e38, 3e38, 1.0).3, u32::MAX);
    }

    #[test]
    fn test_sequence_saves_every_frame()
    {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("frames");
        let mut renderer = FakeRenderer::default();
        let mut driver = RenderSequenceDriver::new();

        driver.begin_sequence(&mut renderer, &folder, 0.0, 1.0, 0.25, 16).unwrap();
        assert!(folder.is_dir());
        assert_eq!(renderer.mode, RenderMode::Job { target_samples: 16 });

        // Not done yet.
        assert_eq!(driver.poll(&mut renderer), SequenceStatus::Rendering { frame: 0, count: 5 });
        assert!(renderer.saved.is_empty());

        let mut statuses = Vec::new();
        for _ in 0..5
        {
            renderer.finish_job();
            statuses.push(driver.poll(&mut renderer));
        }

        assert_eq!(statuses.last(), Some(&SequenceStatus::Completed));
        assert_eq!(statuses[0], SequenceStatus::Saved { frame: 0 });
        assert!(!driver.is_active());
        assert_eq!(driver.poll(&mut renderer), SequenceStatus::Idle);

        let names: Vec<String> = renderer.saved.iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0000.png", "0001.png", "0002.png", "0003.png", "0004.png"]);

        let times: Vec<f32> = renderer.time_ranges.iter().map(|r| r.1).collect();
        assert_eq!(times, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(renderer.time_ranges.iter().all(|r| r.0 == 0.0));
    }

    #[test]
    fn test_last_frame_is_clamped_to_max()
    {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = FakeRenderer::default();
        let mut driver = RenderSequenceDriver::new();
        driver.begin_sequence(&mut renderer, dir.path(), 0.0, 1.0, 0.3, 1).unwrap();
        while driver.is_active()
        {
            renderer.finish_job();
            driver.poll(&mut renderer);
        }
        assert_eq!(renderer.time_ranges.last().unwrap().1, 1.0);
        assert_eq!(renderer.saved.len(), 5);
    }

    #[test]
    fn test_save_failure_aborts()
    {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = FakeRenderer { fail_saves: true, ..Default::default() };
        let mut driver = RenderSequenceDriver::new();
        driver.begin_sequence(&mut renderer, dir.path(), 0.0, 1.0, 0.5, 4).unwrap();
        renderer.finish_job();
        assert_eq!(driver.poll(&mut renderer), SequenceStatus::Aborted);
        assert!(!driver.is_active());
    }

    #[test]
    fn test_external_cancel_aborts()
    {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = FakeRenderer::default();
        let mut driver = RenderSequenceDriver::new();
        driver.begin_sequence(&mut renderer, dir.path(), 0.0, 1.0, 0.5, 4).unwrap();
        renderer.mode = RenderMode::Progressive;
        assert_eq!(driver.poll(&mut renderer), SequenceStatus::Aborted);
        assert!(renderer.saved.is_empty());
    }

    #[test]
    fn test_empty_folder_is_rejected()
    {
        let mut renderer = FakeRenderer::default();
        let mut driver = RenderSequenceDriver::new();
        let res = driver.begin_sequence(&mut renderer, Path::new(""), 0.0, 1.0, 0.5, 4);
        assert!(matches!(res, Err(Error::InvalidPath)));
        assert!(!driver.is_active());
    }
}
