
use serde::{Deserialize, Serialize};

use crate::base::*;
use crate::geometry::GeometryStore;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialRecord
{
    pub base_color: Vec3,
    pub roughness: f32,
    pub specular: f32,
    pub emission_color: Vec3,
    pub emission_strength: f32,
}

impl Default for MaterialRecord
{
    fn default() -> Self
    {
        return Self {
            base_color: Vec3::ones(),
            roughness: 0.5,
            specular: 0.5,
            emission_color: Vec3::ZERO,
            emission_strength: 0.0,
        };
    }
}

// NOTE: Coupled to shader.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct GpuMaterial
{
    pub base_color: [f32; 3],
    pub roughness: f32,
    pub emission_color: [f32; 3],
    pub emission_strength: f32,
    pub specular: f32,
    pub material_index: u32,
    pub _padding: [u32; 2],
}

static_assert!(std::mem::size_of::<GpuMaterial>() == 48);

impl GpuMaterial
{
    pub fn from_record(record: &MaterialRecord, material_index: u32) -> Self
    {
        return Self {
            base_color: record.base_color.to_array(),
            roughness: record.roughness.clamp(0.0, 1.0),
            emission_color: record.emission_color.to_array(),
            emission_strength: record.emission_strength.max(0.0),
            specular: record.specular.clamp(0.0, 1.0),
            material_index,
            _padding: [0; 2],
        };
    }
}

/// Host side of the material buffer. Records live on the mesh
/// instances, this only tracks when the GPU copy is stale.
#[derive(Default, Debug)]
pub struct MaterialTable
{
    dirty: bool,
    rebuilds: u64,
}

impl MaterialTable
{
    pub fn new() -> Self
    {
        return Self::default();
    }

    pub fn mark_dirty(&mut self)
    {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool
    {
        return self.dirty;
    }

    pub fn rebuild_count(&self) -> u64
    {
        return self.rebuilds;
    }

    /// Packs one record per instance, stamped with its own index.
    /// An empty scene still produces one default record, since
    /// zero-sized buffers can't be bound.
    pub fn rebuild(&mut self, store: &GeometryStore) -> Vec<GpuMaterial>
    {
        let mut packed: Vec<GpuMaterial> = store.instances().iter()
            .enumerate()
            .map(|(i, inst)| GpuMaterial::from_record(&inst.material, i as u32))
            .collect();

        if packed.is_empty() {
            packed.push(GpuMaterial::from_record(&MaterialRecord::default(), 0));
        }

        self.dirty = false;
        self.rebuilds += 1;
        return packed;
    }
}
