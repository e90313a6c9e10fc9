
use crate::base::*;
use crate::tonemapping::ToneMapMode;

pub const ORBIT_SPEED: f32 = 0.005;
pub const PAN_SPEED: f32   = 0.0015;
pub const ZOOM_SPEED: f32  = 0.1;

const MAX_PITCH: f32 = (90.0 - 0.1) * DEG_TO_RAD;
const MIN_DISTANCE: f32 = 0.01;
const NEAR: f32 = 0.01;
const FAR: f32  = 1000.0;

/// Pixel rect inside the framebuffer.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport
{
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Viewport
{
    pub fn full(width: u32, height: u32) -> Self
    {
        return Self { x: 0, y: 0, w: width.max(1), h: height.max(1) };
    }

    pub fn aspect(&self) -> f32
    {
        return self.w.max(1) as f32 / self.h.max(1) as f32;
    }

    /// Fits a requested rect into the framebuffer. Degenerate requests
    /// fall back to the whole framebuffer.
    pub fn clamped(request: Viewport, fb_width: u32, fb_height: u32) -> Self
    {
        let fb_width  = fb_width.max(1);
        let fb_height = fb_height.max(1);
        if request.w <= 1 || request.h <= 1 {
            return Self::full(fb_width, fb_height);
        }

        let x = request.x.min(fb_width - 1);
        let y = request.y.min(fb_height - 1);
        let w = request.w.min(fb_width - x);
        let h = request.h.min(fb_height - y);
        if w <= 1 || h <= 1 {
            return Self::full(fb_width, fb_height);
        }
        return Self { x, y, w, h };
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose
{
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub vfov: f32,
}

impl Default for CameraPose
{
    fn default() -> Self
    {
        return Self {
            position: Vec3::new(0.0, 1.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::UP,
            vfov: 60.0,
        };
    }
}

/// Mouse deltas of one frame, in pixels.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct CameraInput
{
    pub orbit_dx: f32,
    pub orbit_dy: f32,
    pub pan_dx: f32,
    pub pan_dy: f32,
    pub scroll: f32,
    pub ui_wants_mouse: bool,
}

/// Per-frame values that aren't owned by the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings
{
    pub samples_per_pixel: u32,
    pub max_bounces: u32,
    pub tonemap: ToneMapMode,
    pub time_min: f32,
    pub time_max: f32,
}

// NOTE: Coupled to shader.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct SceneUniform
{
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    pub viewport: [u32; 4],
    pub frame: u32,
    pub accum_frame: u32,
    pub samples_per_pixel: u32,
    pub max_bounces: u32,
    pub tonemap_mode: u32,
    pub total_samples: u32,
    pub time_base: f32,
    pub time_step: f32,
}

static_assert!(std::mem::size_of::<SceneUniform>() % 16 == 0);

#[derive(Debug, Clone)]
pub struct CameraRig
{
    pose: CameraPose,
    inv_view: Mat4,
    inv_proj: Mat4,
    viewport_request: Viewport,
    viewport: Viewport,
    framebuffer: (u32, u32),
}

impl CameraRig
{
    pub fn new(fb_width: u32, fb_height: u32) -> Self
    {
        let viewport = Viewport::full(fb_width, fb_height);
        let mut rig = Self {
            pose: CameraPose::default(),
            inv_view: Mat4::IDENTITY,
            inv_proj: Mat4::IDENTITY,
            viewport_request: Viewport::default(),
            viewport,
            framebuffer: (viewport.w, viewport.h),
        };
        rig.recompute_view();
        rig.recompute_projection();
        return rig;
    }

    pub fn pose(&self) -> CameraPose
    {
        return self.pose;
    }

    pub fn viewport(&self) -> Viewport
    {
        return self.viewport;
    }

    pub fn inv_view(&self) -> Mat4
    {
        return self.inv_view;
    }

    pub fn inv_proj(&self) -> Mat4
    {
        return self.inv_proj;
    }

    /// Omitted values are kept. Returns whether the pose changed.
    pub fn set_pose(&mut self, position: Option<Vec3>, target: Option<Vec3>, up: Option<Vec3>, vfov: Option<f32>) -> bool
    {
        let mut pose = self.pose;
        if let Some(p) = position.filter(|p| p.is_finite()) { pose.position = p; }
        if let Some(t) = target.filter(|t| t.is_finite()) { pose.target = t; }
        if let Some(u) = up.filter(|u| u.is_finite() && !u.is_zero()) { pose.up = normalize_vec3(u); }
        if let Some(f) = vfov.filter(|f| f.is_finite()) { pose.vfov = f.clamp(1.0, 179.0); }

        if pose == self.pose { return false; }

        if approx_eq_vec3(pose.position, pose.target, 1e-6)
        {
            log::warn!("Camera position and target coincide, pose unchanged");
            return false;
        }

        let view_changed = pose.position != self.pose.position || pose.target != self.pose.target || pose.up != self.pose.up;
        let fov_changed = pose.vfov != self.pose.vfov;
        self.pose = pose;
        if view_changed { self.recompute_view(); }
        if fov_changed { self.recompute_projection(); }
        return true;
    }

    /// Orbit, pan and zoom from mouse input. Returns whether the pose changed.
    pub fn apply_orbit_pan_zoom(&mut self, input: &CameraInput) -> bool
    {
        if input.ui_wants_mouse { return false; }

        let mut changed = false;
        if input.orbit_dx != 0.0 || input.orbit_dy != 0.0 {
            changed |= self.orbit(input.orbit_dx, input.orbit_dy);
        }
        if input.pan_dx != 0.0 || input.pan_dy != 0.0 {
            changed |= self.pan(input.pan_dx, input.pan_dy);
        }
        if input.scroll != 0.0 {
            changed |= self.zoom(input.scroll);
        }
        return changed;
    }

    fn orbit(&mut self, dx: f32, dy: f32) -> bool
    {
        let offset = self.pose.position - self.pose.target;
        let dist = length_vec3(offset);
        if dist <= 0.0 { return false; }

        let yaw = offset.x.atan2(offset.z) - dx * ORBIT_SPEED;
        let pitch = ((offset.y / dist).clamp(-1.0, 1.0).asin() + dy * ORBIT_SPEED).clamp(-MAX_PITCH, MAX_PITCH);

        let new_offset = Vec3::new(pitch.cos() * yaw.sin(), pitch.sin(), pitch.cos() * yaw.cos()) * dist;
        return self.set_pose(Some(self.pose.target + new_offset), None, None, None);
    }

    fn pan(&mut self, dx: f32, dy: f32) -> bool
    {
        let (right, up, _forward, dist) = self.basis();
        let delta = (right * -dx + up * dy) * (dist * PAN_SPEED);
        return self.set_pose(Some(self.pose.position + delta), Some(self.pose.target + delta), None, None);
    }

    fn zoom(&mut self, scroll: f32) -> bool
    {
        let (_right, _up, forward, dist) = self.basis();
        let new_dist = (dist - scroll * ZOOM_SPEED * dist).max(MIN_DISTANCE);
        let new_pos = self.pose.target - forward * new_dist;
        return self.set_pose(Some(new_pos), None, None, None);
    }

    fn basis(&self) -> (Vec3, Vec3, Vec3, f32)
    {
        let to_target = self.pose.target - self.pose.position;
        let dist = length_vec3(to_target);
        let forward = normalize_vec3(to_target);
        let right = normalize_vec3(cross_vec3(forward, self.pose.up));
        let up = cross_vec3(right, forward);
        return (right, up, forward, dist);
    }

    /// Stores the requested rect, clamped to the framebuffer. A zero or
    /// 1x1 request selects the whole framebuffer. Returns whether the
    /// effective viewport changed.
    pub fn set_viewport(&mut self, x: u32, y: u32, w: u32, h: u32) -> bool
    {
        self.viewport_request = Viewport { x, y, w, h };
        return self.apply_viewport();
    }

    pub fn set_framebuffer_size(&mut self, width: u32, height: u32) -> bool
    {
        self.framebuffer = (width.max(1), height.max(1));
        return self.apply_viewport();
    }

    fn apply_viewport(&mut self) -> bool
    {
        let viewport = Viewport::clamped(self.viewport_request, self.framebuffer.0, self.framebuffer.1);
        if viewport == self.viewport { return false; }

        self.viewport = viewport;
        self.recompute_projection();
        return true;
    }

    fn recompute_view(&mut self)
    {
        self.inv_view = mat4_inverse(look_at(self.pose.position, self.pose.target, self.pose.up));
    }

    fn recompute_projection(&mut self)
    {
        let proj = perspective(self.pose.vfov * DEG_TO_RAD, self.viewport.aspect(), NEAR, FAR);
        self.inv_proj = mat4_inverse(proj);
    }

    pub fn scene_uniform(&self, settings: &RenderSettings, gpu_frame: u32, accum_frame: u32, total_samples: u64) -> SceneUniform
    {
        return SceneUniform {
            inv_view: self.inv_view,
            inv_proj: self.inv_proj,
            viewport: [self.viewport.x, self.viewport.y, self.viewport.w, self.viewport.h],
            frame: gpu_frame,
            accum_frame,
            samples_per_pixel: settings.samples_per_pixel,
            max_bounces: settings.max_bounces,
            tonemap_mode: settings.tonemap.shader_code(),
            total_samples: total_samples.min(u32::MAX as u64) as u32,
            time_base: settings.time_min,
            time_step: settings.time_max - settings.time_min,
        };
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_viewport_clamp()
    {
        let full = Viewport::full(800, 600);
        assert_eq!(Viewport::clamped(Viewport { x: 0, y: 0, w: 0, h: 0 }, 800, 600), full);
        assert_eq!(Viewport::clamped(Viewport { x: 0, y: 0, w: 1, h: 1 }, 800, 600), full);
        assert_eq!(Viewport::clamped(Viewport { x: 0, y: 0, w: 5000, h: 5000 }, 800, 600), full);
        assert_eq!(Viewport::clamped(Viewport { x: 100, y: 50, w: 5000, h: 100 }, 800, 600),
                   Viewport { x: 100, y: 50, w: 700, h: 100 });
        assert_eq!(Viewport::clamped(Viewport { x: 900, y: 0, w: 100, h: 100 }, 800, 600), full);
    }

    #[test]
    fn test_set_viewport_reports_changes()
    {
        let mut rig = CameraRig::new(800, 600);
        assert!(!rig.set_viewport(0, 0, 0, 0));
        assert!(rig.set_viewport(0, 0, 400, 600));
        assert!(!rig.set_viewport(0, 0, 400, 600));
        assert_eq!(rig.viewport().aspect(), 400.0 / 600.0);

        // Shrinking the framebuffer re-clamps the stored request.
        assert!(rig.set_framebuffer_size(300, 600));
        assert_eq!(rig.viewport(), Viewport { x: 0, y: 0, w: 300, h: 600 });
    }

    #[test]
    fn test_set_pose_keeps_omitted_values()
    {
        let mut rig = CameraRig::new(800, 600);
        let before = rig.pose();
        assert!(rig.set_pose(None, Some(Vec3::new(0.0, 1.0, 0.0)), None, None));
        assert_eq!(rig.pose().position, before.position);
        assert_eq!(rig.pose().target, Vec3::new(0.0, 1.0, 0.0));
        assert!(!rig.set_pose(None, Some(Vec3::new(0.0, 1.0, 0.0)), None, None));
        assert!(!rig.set_pose(Some(Vec3::new(0.0, 1.0, 0.0)), None, None, None));
    }

    #[test]
    fn test_orbit_keeps_distance_and_clamps_pitch()
    {
        let mut rig = CameraRig::new(800, 600);
        let dist = length_vec3(rig.pose().position - rig.pose().target);

        assert!(rig.apply_orbit_pan_zoom(&CameraInput { orbit_dx: 40.0, orbit_dy: 100000.0, ..Default::default() }));
        let pose = rig.pose();
        let offset = pose.position - pose.target;
        assert!(approx_eq_f32(length_vec3(offset), dist, 1e-4));
        assert!((offset.y / dist).asin() <= MAX_PITCH + 1e-3);

        // Still off the pole, so the view basis stays well defined.
        let horizontal = (offset.x * offset.x + offset.z * offset.z).sqrt();
        assert!(offset.y / dist < 1.0);
        assert!(horizontal / dist >= MAX_PITCH.cos() * 0.9);
    }

    #[test]
    fn test_zoom_never_crosses_target()
    {
        let mut rig = CameraRig::new(800, 600);
        for _ in 0..10 {
            rig.apply_orbit_pan_zoom(&CameraInput { scroll: 50.0, ..Default::default() });
        }
        let pose = rig.pose();
        let forward = pose.target - pose.position;
        assert!(length_vec3(forward) >= MIN_DISTANCE * 0.5);
        assert!(dot_vec3(forward, Vec3::new(0.0, -1.0, -5.0)) > 0.0);
    }

    #[test]
    fn test_zoom_is_relative_to_distance()
    {
        let mut rig = CameraRig::new(800, 600);
        let dist = length_vec3(rig.pose().position - rig.pose().target);

        assert!(rig.apply_orbit_pan_zoom(&CameraInput { scroll: 1.0, ..Default::default() }));
        let new_dist = length_vec3(rig.pose().position - rig.pose().target);
        assert!(approx_eq_f32(new_dist, dist * (1.0 - ZOOM_SPEED), 1e-4));
    }

    #[test]
    fn test_ui_capture_blocks_input()
    {
        let mut rig = CameraRig::new(800, 600);
        let input = CameraInput { orbit_dx: 10.0, scroll: 1.0, ui_wants_mouse: true, ..Default::default() };
        assert!(!rig.apply_orbit_pan_zoom(&input));
    }

    #[test]
    fn test_pan_moves_target_with_position()
    {
        let mut rig = CameraRig::new(800, 600);
        let before = rig.pose();
        assert!(rig.apply_orbit_pan_zoom(&CameraInput { pan_dx: 10.0, pan_dy: -5.0, ..Default::default() }));
        let after = rig.pose();
        let moved_pos = after.position - before.position;
        let moved_target = after.target - before.target;
        assert!(approx_eq_vec3(moved_pos, moved_target, 1e-5));
        assert!(!moved_pos.is_zero());
    }
}
