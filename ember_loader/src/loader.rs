
use std::path::{Path, PathBuf};

use ember as em;

/// Flat triangle mesh, ready for `Renderer::upload_mesh_data`.
#[derive(Default, Debug, Clone)]
pub struct MeshData
{
    pub name: String,
    pub vertices: Vec<em::Vertex>,
    pub indices: Vec<u32>,
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError
{
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("OBJ error: {0}")]
    Obj(#[from] tobj::LoadError),

    #[error("'{0}' contains no triangle geometry")]
    NoGeometry(PathBuf),

    #[error("Unsupported mesh format '{0}'")]
    UnsupportedFormat(String),
}

/// Loads every triangle mesh in a `.obj`, `.gltf` or `.glb` file.
pub fn load_mesh(path: &Path) -> Result<Vec<MeshData>, LoadError>
{
    let ext = path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if !path.is_file() {
        return Err(std::io::Error::new(std::io::ErrorKind::NotFound, format!("'{}' not found", path.display())).into());
    }

    let meshes = match ext.as_str()
    {
        "obj"          => load_mesh_obj(path)?,
        "gltf" | "glb" => load_mesh_gltf(path)?,
        _ => return Err(LoadError::UnsupportedFormat(ext)),
    };

    if meshes.is_empty() {
        return Err(LoadError::NoGeometry(path.to_path_buf()));
    }

    log::info!("Loaded {} mesh(es) from '{}'", meshes.len(), path.display());
    return Ok(meshes);
}

fn load_mesh_obj(path: &Path) -> Result<Vec<MeshData>, LoadError>
{
    let (models, _materials) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS)?;

    let mut res = Vec::with_capacity(models.len());
    for model in models
    {
        let mesh = &model.mesh;
        if mesh.indices.is_empty() || mesh.positions.is_empty() { continue; }

        let positions: Vec<[f32; 3]> = mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
        let normals: Option<Vec<[f32; 3]>> = if mesh.normals.len() == mesh.positions.len() {
            Some(mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect())
        } else {
            None
        };

        res.push(build_mesh(model.name.clone(), &positions, normals.as_deref(), mesh.indices.clone()));
    }

    return Ok(res);
}

fn load_mesh_gltf(path: &Path) -> Result<Vec<MeshData>, LoadError>
{
    let (document, buffers, _images) = gltf::import(path)?;

    let mut res = Vec::new();
    for mesh in document.meshes()
    {
        for (prim_idx, primitive) in mesh.primitives().enumerate()
        {
            if primitive.mode() != gltf::mesh::Mode::Triangles
            {
                log::warn!("Skipping non-triangle primitive {} of mesh '{}'", prim_idx, mesh.name().unwrap_or("unnamed"));
                continue;
            }

            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let Some(positions) = reader.read_positions() else { continue; };
            let positions: Vec<[f32; 3]> = positions.collect();
            let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|iter| iter.collect());
            let indices: Vec<u32> = match reader.read_indices()
            {
                Some(iter) => iter.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            if positions.is_empty() || indices.is_empty() { continue; }

            let name = format!("{}#{}", mesh.name().unwrap_or("mesh"), prim_idx);
            res.push(build_mesh(name, &positions, normals.as_deref(), indices));
        }
    }

    return Ok(res);
}

fn build_mesh(name: String, positions: &[[f32; 3]], normals: Option<&[[f32; 3]]>, indices: Vec<u32>) -> MeshData
{
    let normals = match normals
    {
        Some(n) if n.len() == positions.len() => n.to_vec(),
        _ => compute_normals(positions, &indices),
    };

    let vertices = positions.iter().zip(normals.iter())
        .map(|(&pos, &normal)| em::Vertex::new(pos, normal))
        .collect();

    return MeshData { name, vertices, indices };
}

/// Area-weighted vertex normals. The unnormalized cross product of
/// each face is proportional to its area.
pub fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]>
{
    let mut normals = vec![em::Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3)
    {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() { continue; }

        let v0 = em::Vec3::from(positions[i0]);
        let v1 = em::Vec3::from(positions[i1]);
        let v2 = em::Vec3::from(positions[i2]);
        let face_normal = em::cross_vec3(v1 - v0, v2 - v0);

        normals[i0] = normals[i0] + face_normal;
        normals[i1] = normals[i1] + face_normal;
        normals[i2] = normals[i2] + face_normal;
    }

    return normals.into_iter().map(|n| {
        if em::length_vec3(n) > 0.0 { em::normalize_vec3(n).to_array() } else { [0.0, 1.0, 0.0] }
    }).collect();
}

#[cfg(test)]
mod tests
{
    use super::*;

    const QUAD_OBJ: &str = "
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3
f 1 3 4
";

    #[test]
    fn test_load_obj_computes_normals()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        std::fs::write(&path, QUAD_OBJ).unwrap();

        let meshes = load_mesh(&path).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].vertices.len(), 4);
        assert_eq!(meshes[0].indices.len(), 6);
        for v in &meshes[0].vertices {
            assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_area_weighting()
    {
        // A large face and a tiny perpendicular one sharing vertex 0.
        let positions = [
            [0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0],
            [0.0, 0.0, 0.1], [0.0, 0.1, 0.0],
        ];
        let indices = [0, 1, 2, 0, 3, 4];
        let normals = compute_normals(&positions, &indices);
        assert!(normals[0][2] > 0.99);
        assert!(em::approx_eq_vec3(em::Vec3::from(normals[3]), em::Vec3::new(-1.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_degenerate_faces_get_fallback_normal()
    {
        let positions = [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]];
        assert_eq!(compute_normals(&positions, &[0, 1, 2]), vec![[0.0, 1.0, 0.0]; 3]);
    }

    #[test]
    fn test_errors()
    {
        let dir = tempfile::tempdir().unwrap();

        let empty = dir.path().join("empty.obj");
        std::fs::write(&empty, "# nothing here\n").unwrap();
        assert!(matches!(load_mesh(&empty), Err(LoadError::NoGeometry(_))));

        let unknown = dir.path().join("mesh.fbx");
        std::fs::write(&unknown, "").unwrap();
        assert!(matches!(load_mesh(&unknown), Err(LoadError::UnsupportedFormat(_))));

        assert!(matches!(load_mesh(&dir.path().join("missing.obj")), Err(LoadError::Io(_))));
    }

    #[test]
    fn test_loaded_mesh_is_accepted_by_store()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        std::fs::write(&path, QUAD_OBJ).unwrap();
        let mesh = load_mesh(&path).unwrap().remove(0);

        let mut store = em::GeometryStore::new();
        assert_eq!(store.upload_mesh(&mesh.vertices, &mesh.indices).unwrap(), 0);
        assert_eq!(store.upload_mesh(&mesh.vertices, &mesh.indices).unwrap(), 1);
        assert_eq!(store.unique_geometry_count(), 1);
    }
}
