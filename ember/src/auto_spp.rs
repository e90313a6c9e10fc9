
use crate::config::AutoSppConfig;

pub const MIN_SPP: u32 = 1;
pub const MAX_SPP: u32 = 2048;

/// Relative error below which no adjustment is made.
const DEAD_BAND: f32 = 0.05;
/// Frames slower than this multiple of the target are treated as hitches.
const OUTLIER_FACTOR: f32 = 10.0;
const MIN_STEP: f32 = 0.5;
const MAX_STEP: f32 = 2.0;

/// Feedback loop steering samples per pixel towards a target frame time.
#[derive(Debug, Clone)]
pub struct AutoSppController
{
    enabled: bool,
    target_fps: f32,
    target_ms: f32,
    window: u32,
    fast_window: u32,

    error_ms: f32,
    frames_in_window: u32,
    countdown: u32,
}

impl AutoSppController
{
    pub fn new(config: &AutoSppConfig) -> Self
    {
        let target_fps = sanitize_fps(config.target_fps);
        let window = config.adjust_window_frames.max(1);
        return Self {
            enabled: config.enabled,
            target_fps,
            target_ms: 1000.0 / target_fps,
            window,
            fast_window: config.fast_adapt_frames.max(1),
            error_ms: 0.0,
            frames_in_window: 0,
            countdown: window,
        };
    }

    pub fn is_enabled(&self) -> bool
    {
        return self.enabled;
    }

    pub fn target_fps(&self) -> f32
    {
        return self.target_fps;
    }

    pub fn target_ms(&self) -> f32
    {
        return self.target_ms;
    }

    pub fn set_enabled(&mut self, enabled: bool) -> bool
    {
        if self.enabled == enabled { return false; }
        self.enabled = enabled;
        self.restart(self.fast_window);
        return true;
    }

    pub fn set_target_fps(&mut self, fps: f32) -> bool
    {
        let fps = sanitize_fps(fps);
        if fps == self.target_fps { return false; }
        self.target_fps = fps;
        self.target_ms = 1000.0 / fps;
        self.restart(self.fast_window);
        return true;
    }

    /// Re-arms with the short window, after a resize or a manual SPP change.
    pub fn fast_adapt(&mut self)
    {
        self.restart(self.fast_window);
    }

    /// Feeds one presented frame's time. Returns the new SPP when it changes.
    pub fn on_frame(&mut self, frame_ms: f32, current_spp: u32) -> Option<u32>
    {
        if !self.enabled { return None; }
        if !frame_ms.is_finite() || frame_ms <= 0.0 || frame_ms > self.target_ms * OUTLIER_FACTOR {
            return None;
        }

        self.error_ms += frame_ms - self.target_ms;
        self.frames_in_window += 1;
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 { return None; }

        let mean_error = self.error_ms / self.frames_in_window as f32;
        self.restart(self.window);

        if mean_error.abs() <= self.target_ms * DEAD_BAND { return None; }

        let step = (self.target_ms / (self.target_ms + mean_error)).clamp(MIN_STEP, MAX_STEP);
        let current = current_spp.clamp(MIN_SPP, MAX_SPP);
        let mut new_spp = (current as f32 * step).round() as u32;

        // Always move at least one sample in the direction of the error.
        if mean_error > 0.0 {
            new_spp = new_spp.min(current.saturating_sub(1));
        } else {
            new_spp = new_spp.max(current + 1);
        }

        let new_spp = new_spp.clamp(MIN_SPP, MAX_SPP);
        if new_spp == current_spp { return None; }

        log::debug!("Auto SPP: {} -> {} (mean frame error {:.2}ms)", current_spp, new_spp, mean_error);
        return Some(new_spp);
    }

    fn restart(&mut self, countdown: u32)
    {
        self.error_ms = 0.0;
        self.frames_in_window = 0;
        self.countdown = countdown;
    }
}

fn sanitize_fps(fps: f32) -> f32
{
    if !fps.is_finite() || fps <= 0.0 {
        return AutoSppConfig::default().target_fps;
    }
    return fps.clamp(1.0, 1000.0);
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn controller() -> AutoSppController
    {
        let config = AutoSppConfig { enabled: true, ..Default::default() };
        return AutoSppController::new(&config);
    }

    fn feed(ctrl: &mut AutoSppController, spp: &mut u32, frame_ms: f32, frames: u32) -> Vec<u32>
    {
        let mut history = Vec::new();
        for _ in 0..frames
        {
            if let Some(new_spp) = ctrl.on_frame(frame_ms, *spp)
            {
                *spp = new_spp;
                history.push(new_spp);
            }
        }
        return history;
    }

    #[test]
    fn test_disabled_does_nothing()
    {
        let mut ctrl = AutoSppController::new(&AutoSppConfig::default());
        let mut spp = 8;
        assert!(feed(&mut ctrl, &mut spp, 100.0, 200).is_empty());
        assert_eq!(spp, 8);
    }

    #[test]
    fn test_slow_frames_decrease_to_min()
    {
        let mut ctrl = controller();
        let mut spp = 64;
        let target = ctrl.target_ms();
        // Twice the target frame time.
        let history = feed(&mut ctrl, &mut spp, target * 2.0, 30 * 40);
        assert!(history.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(spp, MIN_SPP);
    }

    #[test]
    fn test_fast_frames_increase_to_max()
    {
        let mut ctrl = controller();
        let mut spp = 1;
        let target = ctrl.target_ms();
        let history = feed(&mut ctrl, &mut spp, target * 0.25, 30 * 40);
        assert!(history.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(spp, MAX_SPP);
    }

    #[test]
    fn test_dead_band_holds_steady()
    {
        let mut ctrl = controller();
        let mut spp = 16;
        let target = ctrl.target_ms();
        assert!(feed(&mut ctrl, &mut spp, target * 1.02, 300).is_empty());
    }

    #[test]
    fn test_outliers_are_ignored()
    {
        let mut ctrl = controller();
        let mut spp = 16;
        let target = ctrl.target_ms();
        for bad in [f32::NAN, f32::INFINITY, -1.0, 0.0, target * 20.0] {
            assert!(feed(&mut ctrl, &mut spp, bad, 100).is_empty());
        }
        assert_eq!(spp, 16);
    }

    #[test]
    fn test_step_is_bounded()
    {
        let mut ctrl = controller();
        let target = ctrl.target_ms();
        let mut result = None;
        for _ in 0..30 {
            result = result.or(ctrl.on_frame(target * 9.0, 100));
        }
        assert_eq!(result, Some(50));
    }

    #[test]
    fn test_fast_adapt_window_after_target_change()
    {
        let mut ctrl = controller();
        assert!(ctrl.set_target_fps(30.0));
        assert!(!ctrl.set_target_fps(30.0));

        let target = ctrl.target_ms();
        let mut changes = 0;
        for _ in 0..4
        {
            if ctrl.on_frame(target * 2.0, 32).is_some() {
                changes += 1;
            }
        }
        assert_eq!(changes, 1);
    }

    #[test]
    fn test_small_error_still_moves_one_sample()
    {
        let mut ctrl = controller();
        let target = ctrl.target_ms();
        let mut result = None;
        for _ in 0..30 {
            result = result.or(ctrl.on_frame(target * 1.1, 2));
        }
        assert_eq!(result, Some(1));
    }
}
