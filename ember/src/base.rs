
use std::
{
    future::Future,
    ptr,
    task::{Context, Poll, RawWaker, RawWakerVTable, Waker},
};

#[allow(unused_macros)]
macro_rules! static_assert {
    ($($tt:tt)*) => {
        const _: () = assert!($($tt)*);
    }
}

pub(crate) use static_assert;

////////
// Synchronization

/// Drives a future that is expected to be immediately ready, which is
/// the case for adapter/device requests on native wgpu backends.
pub fn wait_for<F>(f: F) -> F::Output
where
    F: Future,
{
    let waker = noop_waker();
    let mut context = Context::from_waker(&waker);

    let mut t = Box::pin(f);
    let mut t = t.as_mut();

    loop
    {
        match t.as_mut().poll(&mut context)
        {
            Poll::Ready(v) => return v,
            Poll::Pending => std::thread::yield_now(),
        }
    }
}

type WakerData = *const ();

unsafe fn clone(_: WakerData) -> RawWaker { noop_raw_waker() }
unsafe fn wake(_: WakerData) {}
unsafe fn wake_by_ref(_: WakerData) {}
unsafe fn drop(_: WakerData) {}

static NOOP_VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop);

fn noop_raw_waker() -> RawWaker { return RawWaker::new(ptr::null(), &NOOP_VTABLE) }

fn noop_waker() -> Waker { unsafe { return Waker::from_raw(noop_raw_waker()) } }

////////
// Math

pub const DEG_TO_RAD: f32 = 0.017453292;

#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[repr(C)]
pub struct Vec3
{
    pub x: f32,
    pub y: f32,
    pub z: f32
}

impl Vec3
{
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const UP:   Vec3 = Vec3 { x: 0.0, y: 1.0, z: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self
    {
        return Self { x, y, z };
    }

    #[inline]
    pub fn ones() -> Self
    {
        return Self { x: 1.0, y: 1.0, z: 1.0 };
    }

    #[inline]
    pub fn is_zero(&self) -> bool
    {
        return self.x == 0.0 && self.y == 0.0 && self.z == 0.0;
    }

    #[inline]
    pub fn is_finite(&self) -> bool
    {
        return self.x.is_finite() && self.y.is_finite() && self.z.is_finite();
    }

    #[inline]
    pub fn to_array(self) -> [f32; 3]
    {
        return [self.x, self.y, self.z];
    }
}

impl From<[f32; 3]> for Vec3
{
    fn from(v: [f32; 3]) -> Self
    {
        return Vec3 { x: v[0], y: v[1], z: v[2] };
    }
}

impl std::ops::Add for Vec3
{
    type Output = Vec3;

    #[inline]
    fn add(self, rhs: Vec3) -> Vec3
    {
        return Vec3 { x: self.x + rhs.x, y: self.y + rhs.y, z: self.z + rhs.z };
    }
}

impl std::ops::AddAssign<Vec3> for Vec3
{
    #[inline]
    fn add_assign(&mut self, rhs: Vec3)
    {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl std::ops::Sub for Vec3
{
    type Output = Vec3;

    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3
    {
        return Vec3 { x: self.x - rhs.x, y: self.y - rhs.y, z: self.z - rhs.z };
    }
}

impl std::ops::Neg for Vec3
{
    type Output = Vec3;

    #[inline]
    fn neg(self) -> Vec3
    {
        return Vec3 { x: -self.x, y: -self.y, z: -self.z };
    }
}

impl std::ops::Mul<f32> for Vec3
{
    type Output = Vec3;

    #[inline]
    fn mul(self, rhs: f32) -> Vec3
    {
        return Vec3 { x: self.x * rhs, y: self.y * rhs, z: self.z * rhs };
    }
}

impl std::ops::Div<f32> for Vec3
{
    type Output = Vec3;

    #[inline]
    fn div(self, rhs: f32) -> Vec3
    {
        return Vec3 { x: self.x / rhs, y: self.y / rhs, z: self.z / rhs };
    }
}

impl std::fmt::Display for Vec3
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result
    {
        return write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Vec4
{
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32
}

impl Vec4
{
    #[inline]
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self
    {
        return Self { x, y, z, w };
    }
}

#[inline]
pub fn dot_vec3(v1: Vec3, v2: Vec3) -> f32
{
    return v1.x*v2.x + v1.y*v2.y + v1.z*v2.z;
}

#[inline]
pub fn cross_vec3(v1: Vec3, v2: Vec3) -> Vec3
{
    return Vec3 {
        x: v1.y*v2.z - v1.z*v2.y,
        y: v1.z*v2.x - v1.x*v2.z,
        z: v1.x*v2.y - v1.y*v2.x
    };
}

#[inline]
pub fn length_vec3(v: Vec3) -> f32
{
    return dot_vec3(v, v).sqrt();
}

/// Returns the zero vector for zero-length input.
#[inline]
pub fn normalize_vec3(v: Vec3) -> Vec3
{
    let len = length_vec3(v);
    if len <= 0.0 { return Vec3::ZERO; }
    return v / len;
}

#[inline]
pub fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool
{
    return (a - b).abs() <= eps;
}

#[inline]
pub fn approx_eq_vec3(a: Vec3, b: Vec3, eps: f32) -> bool
{
    return approx_eq_f32(a.x, b.x, eps) && approx_eq_f32(a.y, b.y, eps) && approx_eq_f32(a.z, b.z, eps);
}

// Matrices (they are all column major)

#[derive(Debug, Clone, Copy, PartialEq)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Mat4
{
    pub m: [[f32; 4]; 4]
}

impl Default for Mat4
{
    fn default() -> Self
    {
        return Self::IDENTITY;
    }
}

impl Mat4
{
    pub const IDENTITY: Self = Self
    {
        m: [
            [ 1.0, 0.0, 0.0, 0.0 ],
            [ 0.0, 1.0, 0.0, 0.0 ],
            [ 0.0, 0.0, 1.0, 0.0 ],
            [ 0.0, 0.0, 0.0, 1.0 ]
        ]
    };

    pub fn zeros() -> Self
    {
        return Mat4 { m: [[0.0; 4]; 4] };
    }
}

impl std::ops::Mul<Mat4> for Mat4
{
    type Output = Mat4;

    #[inline]
    fn mul(self, rhs: Mat4) -> Mat4
    {
        let mut res = Mat4::zeros();
        for i in 0..4
        {
            for j in 0..4
            {
                for k in 0..4
                {
                    res.m[j][i] += self.m[k][i] * rhs.m[j][k];
                }
            }
        }

        return res;
    }
}

impl std::ops::Mul<Vec4> for Mat4
{
    type Output = Vec4;

    #[inline]
    fn mul(self, rhs: Vec4) -> Vec4
    {
        let res_x = self.m[0][0]*rhs.x + self.m[1][0]*rhs.y + self.m[2][0]*rhs.z + self.m[3][0]*rhs.w;
        let res_y = self.m[0][1]*rhs.x + self.m[1][1]*rhs.y + self.m[2][1]*rhs.z + self.m[3][1]*rhs.w;
        let res_z = self.m[0][2]*rhs.x + self.m[1][2]*rhs.y + self.m[2][2]*rhs.z + self.m[3][2]*rhs.w;
        let res_w = self.m[0][3]*rhs.x + self.m[1][3]*rhs.y + self.m[2][3]*rhs.z + self.m[3][3]*rhs.w;
        return Vec4 { x: res_x, y: res_y, z: res_z, w: res_w };
    }
}

/// Returns the identity for singular matrices.
pub fn mat4_inverse(m: Mat4) -> Mat4
{
    let s0 = m.m[0][0] * m.m[1][1] - m.m[1][0] * m.m[0][1];
    let s1 = m.m[0][0] * m.m[1][2] - m.m[1][0] * m.m[0][2];
    let s2 = m.m[0][0] * m.m[1][3] - m.m[1][0] * m.m[0][3];
    let s3 = m.m[0][1] * m.m[1][2] - m.m[1][1] * m.m[0][2];
    let s4 = m.m[0][1] * m.m[1][3] - m.m[1][1] * m.m[0][3];
    let s5 = m.m[0][2] * m.m[1][3] - m.m[1][2] * m.m[0][3];
    let c5 = m.m[2][2] * m.m[3][3] - m.m[3][2] * m.m[2][3];
    let c4 = m.m[2][1] * m.m[3][3] - m.m[3][1] * m.m[2][3];
    let c3 = m.m[2][1] * m.m[3][2] - m.m[3][1] * m.m[2][2];
    let c2 = m.m[2][0] * m.m[3][3] - m.m[3][0] * m.m[2][3];
    let c1 = m.m[2][0] * m.m[3][2] - m.m[3][0] * m.m[2][2];
    let c0 = m.m[2][0] * m.m[3][1] - m.m[3][0] * m.m[2][1];

    let det = s0 * c5 - s1 * c4 + s2 * c3 + s3 * c2 - s4 * c1 + s5 * c0;
    if det == 0.0 || !det.is_finite() { return Mat4::IDENTITY; }
    let invdet = 1.0 / det;

    let mut b = Mat4::zeros();
    b.m[0][0] = ( m.m[1][1] * c5 - m.m[1][2] * c4 + m.m[1][3] * c3) * invdet;
    b.m[0][1] = (-m.m[0][1] * c5 + m.m[0][2] * c4 - m.m[0][3] * c3) * invdet;
    b.m[0][2] = ( m.m[3][1] * s5 - m.m[3][2] * s4 + m.m[3][3] * s3) * invdet;
    b.m[0][3] = (-m.m[2][1] * s5 + m.m[2][2] * s4 - m.m[2][3] * s3) * invdet;
    b.m[1][0] = (-m.m[1][0] * c5 + m.m[1][2] * c2 - m.m[1][3] * c1) * invdet;
    b.m[1][1] = ( m.m[0][0] * c5 - m.m[0][2] * c2 + m.m[0][3] * c1) * invdet;
    b.m[1][2] = (-m.m[3][0] * s5 + m.m[3][2] * s2 - m.m[3][3] * s1) * invdet;
    b.m[1][3] = ( m.m[2][0] * s5 - m.m[2][2] * s2 + m.m[2][3] * s1) * invdet;
    b.m[2][0] = ( m.m[1][0] * c4 - m.m[1][1] * c2 + m.m[1][3] * c0) * invdet;
    b.m[2][1] = (-m.m[0][0] * c4 + m.m[0][1] * c2 - m.m[0][3] * c0) * invdet;
    b.m[2][2] = ( m.m[3][0] * s4 - m.m[3][1] * s2 + m.m[3][3] * s0) * invdet;
    b.m[2][3] = (-m.m[2][0] * s4 + m.m[2][1] * s2 - m.m[2][3] * s0) * invdet;
    b.m[3][0] = (-m.m[1][0] * c3 + m.m[1][1] * c1 - m.m[1][2] * c0) * invdet;
    b.m[3][1] = ( m.m[0][0] * c3 - m.m[0][1] * c1 + m.m[0][2] * c0) * invdet;
    b.m[3][2] = (-m.m[3][0] * s3 + m.m[3][1] * s1 - m.m[3][2] * s0) * invdet;
    b.m[3][3] = ( m.m[2][0] * s3 - m.m[2][1] * s1 + m.m[2][2] * s0) * invdet;
    return b;
}

/// Right-handed view matrix looking from `eye` to `target`.
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4
{
    let f = normalize_vec3(target - eye);
    let s = normalize_vec3(cross_vec3(f, up));
    let u = cross_vec3(s, f);

    return Mat4 {
        m: [
            [ s.x, u.x, -f.x, 0.0 ],
            [ s.y, u.y, -f.y, 0.0 ],
            [ s.z, u.z, -f.z, 0.0 ],
            [ -dot_vec3(s, eye), -dot_vec3(u, eye), dot_vec3(f, eye), 1.0 ],
        ]
    };
}

/// Right-handed perspective projection with a [0, 1] depth range.
pub fn perspective(vfov_rad: f32, aspect: f32, near: f32, far: f32) -> Mat4
{
    let f = 1.0 / (vfov_rad * 0.5).tan();
    let range = far / (near - far);

    let mut res = Mat4::zeros();
    res.m[0][0] = f / aspect;
    res.m[1][1] = f;
    res.m[2][2] = range;
    res.m[2][3] = -1.0;
    res.m[3][2] = range * near;
    return res;
}

/// The naming follows this convention: MatRxC, where R
/// is the number of rows, and C is the number of columns.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Mat3x4
{
    pub m: [[f32; 3]; 4]
}

impl Default for Mat3x4
{
    fn default() -> Self
    {
        return Self::IDENTITY;
    }
}

impl Mat3x4
{
    pub const IDENTITY: Self = Self
    {
        m: [
            [ 1.0, 0.0, 0.0 ],
            [ 0.0, 1.0, 0.0 ],
            [ 0.0, 0.0, 1.0 ],
            [ 0.0, 0.0, 0.0 ]
        ]
    };

    #[inline]
    pub fn zeros() -> Self
    {
        return Mat3x4 { m: [[0.0; 3]; 4] };
    }

    #[inline]
    pub fn to_mat4(&self) -> Mat4
    {
        return Mat4 {
            m: [
                [ self.m[0][0], self.m[0][1], self.m[0][2], 0.0 ],
                [ self.m[1][0], self.m[1][1], self.m[1][2], 0.0 ],
                [ self.m[2][0], self.m[2][1], self.m[2][2], 0.0 ],
                [ self.m[3][0], self.m[3][1], self.m[3][2], 1.0 ],
            ]
        };
    }

    /// Row-major 3x4 layout, as expected by acceleration structure instances.
    #[inline]
    pub fn to_rows(&self) -> [f32; 12]
    {
        return [
            self.m[0][0], self.m[1][0], self.m[2][0], self.m[3][0],
            self.m[0][1], self.m[1][1], self.m[2][1], self.m[3][1],
            self.m[0][2], self.m[1][2], self.m[2][2], self.m[3][2],
        ];
    }
}

impl std::ops::Mul<Vec3> for Mat3x4
{
    type Output = Vec3;

    #[inline]
    fn mul(self, rhs: Vec3) -> Vec3
    {
        let res_x = self.m[0][0]*rhs.x + self.m[1][0]*rhs.y + self.m[2][0]*rhs.z + self.m[3][0];
        let res_y = self.m[0][1]*rhs.x + self.m[1][1]*rhs.y + self.m[2][1]*rhs.z + self.m[3][1];
        let res_z = self.m[0][2]*rhs.x + self.m[1][2]*rhs.y + self.m[2][2]*rhs.z + self.m[3][2];
        return Vec3 { x: res_x, y: res_y, z: res_z };
    }
}

impl std::ops::Mul<Mat3x4> for Mat3x4
{
    type Output = Mat3x4;

    #[inline]
    fn mul(self, rhs: Mat3x4) -> Mat3x4
    {
        let mut res = Mat3x4::zeros();
        let rhs_mat4 = rhs.to_mat4();
        for i in 0..3
        {
            for j in 0..4
            {
                for k in 0..3
                {
                    res.m[j][i] += self.m[k][i] * rhs_mat4.m[j][k];
                }
                res.m[j][i] += self.m[3][i] * rhs_mat4.m[j][3];
            }
        }

        return res;
    }
}

pub fn rotation_x_matrix(angle: f32) -> Mat3x4
{
    let (s, c) = angle.sin_cos();
    let mut res = Mat3x4::IDENTITY;
    res.m[1][1] = c;
    res.m[1][2] = s;
    res.m[2][1] = -s;
    res.m[2][2] = c;
    return res;
}

pub fn rotation_y_matrix(angle: f32) -> Mat3x4
{
    let (s, c) = angle.sin_cos();
    let mut res = Mat3x4::IDENTITY;
    res.m[0][0] = c;
    res.m[0][2] = -s;
    res.m[2][0] = s;
    res.m[2][2] = c;
    return res;
}

pub fn rotation_z_matrix(angle: f32) -> Mat3x4
{
    let (s, c) = angle.sin_cos();
    let mut res = Mat3x4::IDENTITY;
    res.m[0][0] = c;
    res.m[0][1] = s;
    res.m[1][0] = -s;
    res.m[1][1] = c;
    return res;
}

pub fn scale_matrix(scale: Vec3) -> Mat3x4
{
    let mut res = Mat3x4::zeros();
    res.m[0][0] = scale.x;
    res.m[1][1] = scale.y;
    res.m[2][2] = scale.z;
    return res;
}

pub fn position_matrix(pos: Vec3) -> Mat3x4
{
    let mut res = Mat3x4::IDENTITY;
    res.m[3][0] = pos.x;
    res.m[3][1] = pos.y;
    res.m[3][2] = pos.z;
    return res;
}
