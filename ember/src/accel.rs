
use crate::base::*;
use crate::error::*;
use crate::backend::{SceneBackend, GeometrySpan, TlasInstanceDesc};
use crate::geometry::{GeometryStore, Geometry, Transform, Vertex};
use crate::materials::MaterialTable;
use crate::accumulation::AccumulationController;

// NOTE: Coupled to shader.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct MeshInfo
{
    pub vertex_base: u32,
    pub index_base: u32,
    pub material_index: u32,
    pub _padding: u32,
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccelStats
{
    pub blas_builds: u64,
    pub tlas_builds: u64,
    pub topology_rebuilds: u64,
}

#[derive(Default, Debug)]
pub struct AccelerationBuilder
{
    tlas_needs_rebuild: bool,
    has_tlas: bool,
    stats: AccelStats,
}

/// Object-to-world transform of an instance. Meshes are authored
/// Z-up with a flipped Y, hence the fixed offsets.
pub fn instance_transform(transform: &Transform) -> Mat3x4
{
    let rot_x = (transform.rotation.x - 90.0) * DEG_TO_RAD;
    let rot_y = transform.rotation.y * DEG_TO_RAD;
    let rot_z = (transform.rotation.z - 90.0) * DEG_TO_RAD;
    let scale = Vec3::new(transform.scale.x, -transform.scale.y, transform.scale.z);

    return position_matrix(transform.position) *
           rotation_z_matrix(rot_z) *
           rotation_y_matrix(rot_y) *
           rotation_x_matrix(rot_x) *
           scale_matrix(scale);
}

impl AccelerationBuilder
{
    pub fn new() -> Self
    {
        return Self::default();
    }

    pub fn stats(&self) -> AccelStats
    {
        return self.stats;
    }

    pub fn has_tlas(&self) -> bool
    {
        return self.has_tlas;
    }

    pub fn needs_tlas_rebuild(&self) -> bool
    {
        return self.tlas_needs_rebuild;
    }

    /// Transform edits only touch the TLAS. The rebuild is deferred
    /// to the next frame so that many edits cost a single build.
    pub fn mark_tlas_dirty(&mut self)
    {
        self.tlas_needs_rebuild = true;
    }

    /// Full rebuild after an instance was added or removed.
    pub fn rebuild_topology<B>(&mut self, backend: &mut B, store: &mut GeometryStore,
                               materials: &mut MaterialTable, accum: &mut AccumulationController) -> Result<()>
    where
        B: SceneBackend + ?Sized
    {
        backend.wait_idle()?;

        // Release everything built from the old packing, including the
        // BLASes of owners removed since the last rebuild.
        for handle in store.take_released_blas() {
            backend.destroy_blas(handle);
        }
        for inst in store.instances_mut()
        {
            if let Geometry::Owned { blas, .. } = &mut inst.geometry
            {
                if let Some(handle) = blas.take() {
                    backend.destroy_blas(handle);
                }
            }
        }
        if self.has_tlas
        {
            backend.destroy_tlas();
            self.has_tlas = false;
        }

        // Pack owners contiguously, in instance order.
        let mut vertices = Vec::<Vertex>::new();
        let mut indices  = Vec::<u32>::new();
        let mut owner_spans = Vec::<GeometrySpan>::new();
        for inst in store.instances_mut()
        {
            if let Geometry::Owned { vertices: verts, indices: idx, .. } = &inst.geometry
            {
                let span = GeometrySpan {
                    vertex_base: vertices.len() as u32,
                    vertex_count: verts.len() as u32,
                    index_base: indices.len() as u32,
                    index_count: idx.len() as u32,
                };
                vertices.extend_from_slice(verts);
                indices.extend_from_slice(idx);
                inst.span = span;
                owner_spans.push(span);
            }
        }

        backend.upload_geometry(&vertices, &indices)?;

        let handles = backend.build_blases(&owner_spans)?;
        if handles.len() != owner_spans.len() {
            return Err(Error::Gpu(String::from("BLAS count does not match the number of owned meshes")));
        }
        self.stats.blas_builds += handles.len() as u64;

        let mut handle_iter = handles.into_iter();
        for inst in store.instances_mut()
        {
            if let Geometry::Owned { blas, .. } = &mut inst.geometry {
                *blas = handle_iter.next();
            }
        }

        // Followers reuse their owner's extents.
        let spans: Vec<GeometrySpan> = store.instances().iter().map(|inst| inst.span).collect();
        for inst in store.instances_mut()
        {
            if let Geometry::Shared { owner } = inst.geometry {
                inst.span = spans[owner];
            }
        }

        let packed_materials = materials.rebuild(store);
        backend.upload_materials(&packed_materials)?;

        self.build_tlas(backend, store)?;
        backend.update_descriptors()?;

        self.stats.topology_rebuilds += 1;
        accum.invalidate();

        log::debug!("Topology rebuild: {} instances, {} unique geometries, {} vertices, {} indices (BLAS builds: {}, TLAS builds: {})",
                    store.len(), owner_spans.len(), vertices.len(), indices.len(),
                    self.stats.blas_builds, self.stats.tlas_builds);
        return Ok(());
    }

    /// Consumes the deferred TLAS flag. Returns whether a rebuild happened.
    pub fn rebuild_tlas_if_needed<B>(&mut self, backend: &mut B, store: &GeometryStore,
                                     accum: &mut AccumulationController) -> Result<bool>
    where
        B: SceneBackend + ?Sized
    {
        if !self.tlas_needs_rebuild { return Ok(false); }

        backend.wait_idle()?;
        self.build_tlas(backend, store)?;
        backend.update_descriptors()?;
        accum.invalidate();

        log::debug!("TLAS rebuild ({} instances, total TLAS builds: {})", store.len(), self.stats.tlas_builds);
        return Ok(true);
    }

    fn build_tlas<B>(&mut self, backend: &mut B, store: &GeometryStore) -> Result<()>
    where
        B: SceneBackend + ?Sized
    {
        if self.has_tlas
        {
            backend.destroy_tlas();
            self.has_tlas = false;
        }

        self.tlas_needs_rebuild = false;

        let mesh_infos: Vec<MeshInfo> = store.instances().iter().enumerate().map(|(i, inst)| MeshInfo {
            vertex_base: inst.span.vertex_base,
            index_base: inst.span.index_base,
            material_index: i as u32,
            _padding: 0,
        }).collect();
        backend.upload_mesh_infos(&mesh_infos)?;

        // An empty scene is valid, it just has nothing to trace against.
        if store.is_empty() { return Ok(()); }

        let mut instances = Vec::<TlasInstanceDesc>::with_capacity(store.len());
        for (i, inst) in store.instances().iter().enumerate()
        {
            let source = match inst.geometry
            {
                Geometry::Owned { .. } => i,
                Geometry::Shared { owner } => owner,
            };

            let blas = match &store.instances()[source].geometry
            {
                Geometry::Owned { blas: Some(blas), .. } => *blas,
                _ => return Err(Error::InvalidState("instance geometry has no BLAS")),
            };

            instances.push(TlasInstanceDesc {
                blas,
                transform: instance_transform(&inst.transform).to_rows(),
                custom_index: i as u32,
                mask: 0xFF,
            });
        }

        backend.build_tlas(&instances)?;
        self.has_tlas = true;
        self.stats.tlas_builds += 1;
        return Ok(());
    }
}
