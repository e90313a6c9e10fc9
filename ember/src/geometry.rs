
use crate::base::*;
use crate::error::*;
use crate::backend::{BlasHandle, GeometrySpan};
use crate::materials::MaterialRecord;

// NOTE: Coupled to shader.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Vertex
{
    pub pos: [f32; 3],
    pub _padding0: f32,
    pub normal: [f32; 3],
    pub _padding1: f32,
}

static_assert!(std::mem::size_of::<Vertex>() == 32);

impl Vertex
{
    #[inline]
    pub fn new(pos: [f32; 3], normal: [f32; 3]) -> Self
    {
        return Self { pos, _padding0: 0.0, normal, _padding1: 0.0 };
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform
{
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform
{
    fn default() -> Self
    {
        return Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ones(),
        };
    }
}

#[derive(Debug)]
pub enum Geometry
{
    /// This instance holds the host copy of the geometry and its BLAS.
    Owned { vertices: Vec<Vertex>, indices: Vec<u32>, blas: Option<BlasHandle> },
    /// Same content as the instance at `owner`, which always is `Owned`.
    Shared { owner: usize },
}

#[derive(Debug)]
pub struct MeshInstance
{
    pub transform: Transform,
    pub material: MaterialRecord,
    pub geometry: Geometry,
    /// Extents inside the packed geometry buffers. Valid after a topology rebuild.
    pub span: GeometrySpan,
}

impl MeshInstance
{
    pub fn owns_geometry(&self) -> bool
    {
        return matches!(self.geometry, Geometry::Owned { .. });
    }
}

#[derive(Default, Debug)]
pub struct GeometryStore
{
    instances: Vec<MeshInstance>,
    /// BLASes of removed owners without followers, destroyed at the next
    /// topology rebuild.
    released_blas: Vec<BlasHandle>,
}

impl GeometryStore
{
    pub fn new() -> Self
    {
        return Self { instances: Vec::<MeshInstance>::new(), released_blas: Vec::<BlasHandle>::new() };
    }

    /// Appends a new instance, sharing the geometry of an existing owner
    /// when the content is byte-identical.
    pub fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<usize>
    {
        validate_mesh(vertices, indices)?;

        let vert_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let idx_bytes: &[u8]  = bytemuck::cast_slice(indices);

        let mut geometry = None;
        for (i, instance) in self.instances.iter().enumerate()
        {
            if let Geometry::Owned { vertices: owned_verts, indices: owned_indices, .. } = &instance.geometry
            {
                let same_verts = bytemuck::cast_slice::<Vertex, u8>(owned_verts) == vert_bytes;
                let same_indices = bytemuck::cast_slice::<u32, u8>(owned_indices) == idx_bytes;
                if same_verts && same_indices
                {
                    geometry = Some(Geometry::Shared { owner: i });
                    break;
                }
            }
        }

        let geometry = geometry.unwrap_or_else(|| Geometry::Owned {
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
            blas: None,
        });

        self.instances.push(MeshInstance {
            transform: Transform::default(),
            material: MaterialRecord::default(),
            geometry,
            span: GeometrySpan::default(),
        });

        return Ok(self.instances.len() - 1);
    }

    /// Removes an instance. If it owned geometry that other instances
    /// still reference, the first of them takes over the ownership.
    /// A BLAS that no instance references anymore is queued for release.
    pub fn remove_mesh(&mut self, index: usize) -> Result<()>
    {
        self.check_index(index)?;

        let removed = self.instances.remove(index);

        let mut promoted: Option<usize> = None;
        if let Geometry::Owned { vertices, indices, blas } = removed.geometry
        {
            let follower = self.instances.iter().position(|inst| {
                matches!(inst.geometry, Geometry::Shared { owner } if owner == index)
            });

            match follower
            {
                Some(new_owner) =>
                {
                    self.instances[new_owner].geometry = Geometry::Owned { vertices, indices, blas };
                    promoted = Some(new_owner);
                }
                None => { self.released_blas.extend(blas); }
            }
        }

        for inst in &mut self.instances
        {
            if let Geometry::Shared { owner } = &mut inst.geometry
            {
                if *owner == index
                {
                    if let Some(new_owner) = promoted {
                        *owner = new_owner;
                    }
                }
                else if *owner > index
                {
                    *owner -= 1;
                }
            }
        }

        debug_assert!(self.check_invariants());
        return Ok(());
    }

    /// Drains the BLASes queued by `remove_mesh`.
    pub fn take_released_blas(&mut self) -> Vec<BlasHandle>
    {
        return std::mem::take(&mut self.released_blas);
    }

    pub fn mesh_count(&self) -> u32
    {
        return self.instances.len() as u32;
    }

    pub fn len(&self) -> usize
    {
        return self.instances.len();
    }

    pub fn is_empty(&self) -> bool
    {
        return self.instances.is_empty();
    }

    pub fn instance(&self, index: usize) -> Option<&MeshInstance>
    {
        return self.instances.get(index);
    }

    pub fn instances(&self) -> &[MeshInstance]
    {
        return &self.instances;
    }

    pub(crate) fn instances_mut(&mut self) -> &mut [MeshInstance]
    {
        return &mut self.instances;
    }

    /// Index of the instance holding this instance's geometry.
    /// Owners always reference themselves.
    pub fn geometry_source(&self, index: usize) -> Option<usize>
    {
        return match &self.instances.get(index)?.geometry
        {
            Geometry::Owned { .. } => Some(index),
            Geometry::Shared { owner } => Some(*owner),
        };
    }

    pub fn owns_geometry(&self, index: usize) -> Option<bool>
    {
        return self.instances.get(index).map(|inst| inst.owns_geometry());
    }

    pub fn unique_geometry_count(&self) -> usize
    {
        return self.instances.iter().filter(|inst| inst.owns_geometry()).count();
    }

    /// Host arrays of the geometry used by an instance.
    pub fn geometry_data(&self, index: usize) -> Option<(&[Vertex], &[u32])>
    {
        let source = self.geometry_source(index)?;
        return match &self.instances[source].geometry
        {
            Geometry::Owned { vertices, indices, .. } => Some((vertices.as_slice(), indices.as_slice())),
            Geometry::Shared { .. } => None,
        };
    }

    pub fn set_transform(&mut self, index: usize, transform: Transform) -> Result<bool>
    {
        self.check_index(index)?;
        let instance = &mut self.instances[index];
        if instance.transform == transform { return Ok(false); }
        instance.transform = transform;
        return Ok(true);
    }

    pub fn set_material(&mut self, index: usize, material: MaterialRecord) -> Result<bool>
    {
        self.check_index(index)?;
        let instance = &mut self.instances[index];
        if instance.material == material { return Ok(false); }
        instance.material = material;
        return Ok(true);
    }

    pub fn check_index(&self, index: usize) -> Result<()>
    {
        if index >= self.instances.len() {
            return Err(Error::MeshIndexOutOfRange { index, count: self.instances.len() });
        }
        return Ok(());
    }

    /// Every shared instance points at an in-range owner.
    pub fn check_invariants(&self) -> bool
    {
        for inst in &self.instances
        {
            if let Geometry::Shared { owner } = inst.geometry
            {
                match self.instances.get(owner)
                {
                    Some(target) if target.owns_geometry() => {},
                    _ => return false,
                }
            }
        }
        return true;
    }
}

fn validate_mesh(vertices: &[Vertex], indices: &[u32]) -> Result<()>
{
    if vertices.is_empty() || indices.is_empty() {
        return Err(Error::EmptyMesh);
    }
    if indices.len() % 3 != 0 {
        return Err(Error::InvalidMesh(format!("index count {} is not a multiple of 3", indices.len())));
    }
    if vertices.len() > u32::MAX as usize {
        return Err(Error::InvalidMesh(String::from("too many vertices")));
    }

    let num_verts = vertices.len() as u32;
    if let Some(bad) = indices.iter().find(|&&idx| idx >= num_verts) {
        return Err(Error::InvalidMesh(format!("index {} out of range ({} vertices)", bad, num_verts)));
    }
    return Ok(());
}

#[cfg(test)]
pub(crate) mod tests
{
    use super::*;

    pub(crate) fn triangle(offset: f32) -> (Vec<Vertex>, Vec<u32>)
    {
        let n = [0.0, 0.0, 1.0];
        let verts = vec![
            Vertex::new([offset, 0.0, 0.0], n),
            Vertex::new([offset + 1.0, 0.0, 0.0], n),
            Vertex::new([offset, 1.0, 0.0], n),
        ];
        return (verts, vec![0, 1, 2]);
    }

    #[test]
    fn test_upload_rejects_bad_data()
    {
        let mut store = GeometryStore::new();
        let (verts, _) = triangle(0.0);
        assert!(matches!(store.upload_mesh(&[], &[0, 1, 2]), Err(Error::EmptyMesh)));
        assert!(matches!(store.upload_mesh(&verts, &[]), Err(Error::EmptyMesh)));
        assert!(matches!(store.upload_mesh(&verts, &[0, 1]), Err(Error::InvalidMesh(_))));
        assert!(matches!(store.upload_mesh(&verts, &[0, 1, 3]), Err(Error::InvalidMesh(_))));
        assert_eq!(store.mesh_count(), 0);
    }

    #[test]
    fn test_dedup_identical_content()
    {
        let mut store = GeometryStore::new();
        let (verts, indices) = triangle(0.0);
        let a = store.upload_mesh(&verts, &indices).unwrap();
        let b = store.upload_mesh(&verts, &indices).unwrap();
        let (other_verts, other_indices) = triangle(5.0);
        let c = store.upload_mesh(&other_verts, &other_indices).unwrap();

        assert_eq!(store.owns_geometry(a), Some(true));
        assert_eq!(store.owns_geometry(b), Some(false));
        assert_eq!(store.geometry_source(b), Some(a));
        assert_eq!(store.owns_geometry(c), Some(true));
        assert_eq!(store.geometry_source(c), Some(c));
        assert_eq!(store.unique_geometry_count(), 2);
    }

    #[test]
    fn test_promotion_on_owner_removal()
    {
        let mut store = GeometryStore::new();
        let (verts, indices) = triangle(0.0);
        let a = store.upload_mesh(&verts, &indices).unwrap();
        let _b = store.upload_mesh(&verts, &indices).unwrap();
        let _c = store.upload_mesh(&verts, &indices).unwrap();

        store.remove_mesh(a).unwrap();
        assert!(store.take_released_blas().is_empty());

        // B is now at 0 and owns the geometry, C (now at 1) follows B.
        assert_eq!(store.mesh_count(), 2);
        assert_eq!(store.owns_geometry(0), Some(true));
        assert_eq!(store.geometry_source(0), Some(0));
        assert_eq!(store.owns_geometry(1), Some(false));
        assert_eq!(store.geometry_source(1), Some(0));

        // Host data moved along with the ownership.
        let (kept_verts, kept_indices) = store.geometry_data(1).unwrap();
        assert_eq!(kept_verts, verts.as_slice());
        assert_eq!(kept_indices, indices.as_slice());
    }

    #[test]
    fn test_promotion_picks_first_follower()
    {
        let mut store = GeometryStore::new();
        let (verts, indices) = triangle(0.0);
        let (other_verts, other_indices) = triangle(3.0);
        store.upload_mesh(&other_verts, &other_indices).unwrap(); // 0: owner X
        store.upload_mesh(&verts, &indices).unwrap();             // 1: owner Y
        store.upload_mesh(&other_verts, &other_indices).unwrap(); // 2: -> 0
        store.upload_mesh(&verts, &indices).unwrap();             // 3: -> 1
        store.upload_mesh(&verts, &indices).unwrap();             // 4: -> 1

        store.remove_mesh(1).unwrap();

        assert_eq!(store.geometry_source(0), Some(0));
        assert_eq!(store.geometry_source(1), Some(0));
        assert_eq!(store.owns_geometry(2), Some(true));
        assert_eq!(store.geometry_source(2), Some(2));
        assert_eq!(store.geometry_source(3), Some(2));
        assert!(store.check_invariants());
    }

    #[test]
    fn test_index_shift_after_removal()
    {
        let mut store = GeometryStore::new();
        let meshes: Vec<_> = (0..4).map(|i| triangle(i as f32)).collect();
        for (verts, indices) in &meshes {
            store.upload_mesh(verts, indices).unwrap();
        }
        // Two followers of the last owner.
        store.upload_mesh(&meshes[3].0, &meshes[3].1).unwrap(); // 4 -> 3
        store.upload_mesh(&meshes[2].0, &meshes[2].1).unwrap(); // 5 -> 2

        store.remove_mesh(1).unwrap();
        assert!(store.take_released_blas().is_empty());

        assert_eq!(store.mesh_count(), 5);
        for i in 0..3 {
            assert_eq!(store.geometry_source(i), Some(i));
        }
        assert_eq!(store.geometry_source(3), Some(2));
        assert_eq!(store.geometry_source(4), Some(1));
        assert_eq!(store.geometry_data(4).unwrap().0, meshes[2].0.as_slice());
    }

    #[test]
    fn test_remove_out_of_range()
    {
        let mut store = GeometryStore::new();
        let (verts, indices) = triangle(0.0);
        store.upload_mesh(&verts, &indices).unwrap();
        assert!(matches!(store.remove_mesh(1), Err(Error::MeshIndexOutOfRange { index: 1, count: 1 })));
        assert_eq!(store.mesh_count(), 1);
    }

    #[test]
    fn test_released_blas_when_last_reference_goes()
    {
        let mut store = GeometryStore::new();
        let (verts, indices) = triangle(0.0);
        store.upload_mesh(&verts, &indices).unwrap();
        if let Geometry::Owned { blas, .. } = &mut store.instances_mut()[0].geometry {
            *blas = Some(BlasHandle(7));
        }
        store.remove_mesh(0).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.take_released_blas(), vec![BlasHandle(7)]);
        assert!(store.take_released_blas().is_empty());
    }
}
