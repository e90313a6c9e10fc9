
//! The seam between the scene/frame logic and the GPU. The wgpu
//! implementation lives in `wgpu_backend`, tests use `mock`.

use crate::error::*;
use crate::geometry::Vertex;
use crate::materials::GpuMaterial;
use crate::accel::MeshInfo;
use crate::camera::{SceneUniform, Viewport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlasHandle(pub u32);

/// Extents of a mesh inside the packed vertex/index buffers.
/// Indices are relative to `vertex_base`.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometrySpan
{
    pub vertex_base: u32,
    pub vertex_count: u32,
    pub index_base: u32,
    pub index_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TlasInstanceDesc
{
    pub blas: BlasHandle,
    /// Row-major 3x4 object-to-world transform.
    pub transform: [f32; 12],
    pub custom_index: u32,
    pub mask: u8,
}

pub trait SceneBackend
{
    /// Blocks until all submitted GPU work has completed. Fails if the
    /// device was lost.
    fn wait_idle(&mut self) -> Result<()>;

    /// Replaces the packed vertex and index buffers.
    fn upload_geometry(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<()>;
    /// Builds one BLAS per span over the packed buffers, in order.
    fn build_blases(&mut self, spans: &[GeometrySpan]) -> Result<Vec<BlasHandle>>;
    fn destroy_blas(&mut self, blas: BlasHandle);

    fn build_tlas(&mut self, instances: &[TlasInstanceDesc]) -> Result<()>;
    fn destroy_tlas(&mut self);

    fn upload_mesh_infos(&mut self, infos: &[MeshInfo]) -> Result<()>;
    fn upload_materials(&mut self, materials: &[GpuMaterial]) -> Result<()>;

    /// Re-wires the trace bindings to the current buffers and TLAS.
    fn update_descriptors(&mut self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome
{
    Acquired,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome
{
    Presented,
    /// Presented, but the swapchain no longer matches the surface.
    NeedsRecreate,
}

/// Everything the backend needs to record one frame's command stream.
#[derive(Clone, Copy, Debug)]
pub struct FrameRecord
{
    pub slot: usize,
    /// Clear both accumulation images and the output before tracing.
    pub clear_accumulation: bool,
    pub dispatch_trace: bool,
    pub uniform: SceneUniform,
    pub viewport: Viewport,
}

pub trait SurfaceBackend
{
    /// Whatever draws on top of the frame (the GUI).
    type Overlay: ?Sized;

    fn frames_in_flight(&self) -> usize;
    /// Waits for the work last submitted from this slot.
    fn wait_slot(&mut self, slot: usize) -> Result<()>;

    fn acquire(&mut self) -> Result<AcquireOutcome>;
    /// Reconfigures the swapchain and resizes the accumulation images.
    /// Returns the new framebuffer size.
    fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<(u32, u32)>;
    fn framebuffer_size(&self) -> (u32, u32);

    /// A TLAS and all buffers are bound, so tracing is possible.
    fn descriptors_ready(&self) -> bool;

    fn submit(&mut self, record: &FrameRecord, overlay: Option<&mut Self::Overlay>) -> Result<()>;
    fn present(&mut self) -> Result<PresentOutcome>;

    /// GPU time of the trace pass last submitted from this slot, if the
    /// adapter supports timestamp queries.
    fn gpu_frame_time_ms(&mut self, slot: usize) -> Option<f32>;

    /// Reads back the output image inside `rect` as RGBA16 values.
    fn read_output(&mut self, rect: Viewport) -> Result<Vec<u16>>;
}

pub trait RenderBackend: SceneBackend + SurfaceBackend {}
impl<T: SceneBackend + SurfaceBackend> RenderBackend for T {}

#[cfg(test)]
pub mod mock
{
    use std::collections::VecDeque;

    use super::*;

    /// Records every call so tests can check what the renderer asked for.
    #[derive(Default, Debug)]
    pub struct MockBackend
    {
        pub wait_idles: u32,
        /// Makes every wait fail as if the device was lost.
        pub device_lost: bool,
        pub geometry_uploads: u32,
        pub blas_builds: u32,
        pub live_blas: Vec<BlasHandle>,
        pub tlas_builds: u32,
        pub tlas: Option<Vec<TlasInstanceDesc>>,
        pub mesh_infos: Vec<MeshInfo>,
        pub materials: Vec<GpuMaterial>,
        pub material_uploads: u32,
        pub descriptor_updates: u32,
        pub uploaded_vertices: Vec<Vertex>,
        pub uploaded_indices: Vec<u32>,

        pub framebuffer: (u32, u32),
        pub frames_in_flight: usize,
        pub slot_waits: Vec<usize>,
        /// Outcomes returned by the next acquires; `Acquired` when empty.
        pub acquire_script: VecDeque<AcquireOutcome>,
        pub suboptimal_next_present: bool,
        pub swapchain_recreations: u32,
        pub submitted: Vec<FrameRecord>,
        pub presents: u32,
        pub gpu_time_ms: Option<f32>,

        next_blas: u32,
    }

    impl MockBackend
    {
        pub fn new(width: u32, height: u32) -> Self
        {
            return Self {
                framebuffer: (width, height),
                frames_in_flight: 2,
                ..Default::default()
            };
        }
    }

    impl SceneBackend for MockBackend
    {
        fn wait_idle(&mut self) -> Result<()>
        {
            self.wait_idles += 1;
            if self.device_lost {
                return Err(Error::DeviceLost(String::from("mock device lost")));
            }
            return Ok(());
        }

        fn upload_geometry(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<()>
        {
            self.geometry_uploads += 1;
            self.uploaded_vertices = vertices.to_vec();
            self.uploaded_indices = indices.to_vec();
            return Ok(());
        }

        fn build_blases(&mut self, spans: &[GeometrySpan]) -> Result<Vec<BlasHandle>>
        {
            let mut res = Vec::with_capacity(spans.len());
            for _ in spans
            {
                let handle = BlasHandle(self.next_blas);
                self.next_blas += 1;
                self.blas_builds += 1;
                self.live_blas.push(handle);
                res.push(handle);
            }
            return Ok(res);
        }

        fn destroy_blas(&mut self, blas: BlasHandle)
        {
            self.live_blas.retain(|&b| b != blas);
        }

        fn build_tlas(&mut self, instances: &[TlasInstanceDesc]) -> Result<()>
        {
            for inst in instances
            {
                if !self.live_blas.contains(&inst.blas) {
                    return Err(Error::Gpu(format!("TLAS references destroyed BLAS {:?}", inst.blas)));
                }
            }
            self.tlas_builds += 1;
            self.tlas = Some(instances.to_vec());
            return Ok(());
        }

        fn destroy_tlas(&mut self)
        {
            self.tlas = None;
        }

        fn upload_mesh_infos(&mut self, infos: &[MeshInfo]) -> Result<()>
        {
            self.mesh_infos = infos.to_vec();
            return Ok(());
        }

        fn upload_materials(&mut self, materials: &[GpuMaterial]) -> Result<()>
        {
            self.material_uploads += 1;
            self.materials = materials.to_vec();
            return Ok(());
        }

        fn update_descriptors(&mut self) -> Result<()>
        {
            self.descriptor_updates += 1;
            return Ok(());
        }
    }

    impl SurfaceBackend for MockBackend
    {
        type Overlay = ();

        fn frames_in_flight(&self) -> usize
        {
            return self.frames_in_flight;
        }

        fn wait_slot(&mut self, slot: usize) -> Result<()>
        {
            self.slot_waits.push(slot);
            if self.device_lost {
                return Err(Error::DeviceLost(String::from("mock device lost")));
            }
            return Ok(());
        }

        fn acquire(&mut self) -> Result<AcquireOutcome>
        {
            return Ok(self.acquire_script.pop_front().unwrap_or(AcquireOutcome::Acquired));
        }

        fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<(u32, u32)>
        {
            self.swapchain_recreations += 1;
            self.framebuffer = (width.max(1), height.max(1));
            return Ok(self.framebuffer);
        }

        fn framebuffer_size(&self) -> (u32, u32)
        {
            return self.framebuffer;
        }

        fn descriptors_ready(&self) -> bool
        {
            return self.tlas.is_some() && self.descriptor_updates > 0;
        }

        fn submit(&mut self, record: &FrameRecord, _overlay: Option<&mut ()>) -> Result<()>
        {
            self.submitted.push(*record);
            return Ok(());
        }

        fn present(&mut self) -> Result<PresentOutcome>
        {
            self.presents += 1;
            if std::mem::take(&mut self.suboptimal_next_present) {
                return Ok(PresentOutcome::NeedsRecreate);
            }
            return Ok(PresentOutcome::Presented);
        }

        fn gpu_frame_time_ms(&mut self, _slot: usize) -> Option<f32>
        {
            return self.gpu_time_ms;
        }

        fn read_output(&mut self, rect: Viewport) -> Result<Vec<u16>>
        {
            return Ok(vec![u16::MAX; rect.w as usize * rect.h as usize * 4]);
        }
    }
}
