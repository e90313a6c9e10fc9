
use crate::base::*;
use crate::error::*;

const RT_MAX_ACCEL_STRUCTURES: u32 = 1;
const MAX_TLAS_INSTANCES: u32 = 1_000_000;
const MAX_BLAS_PRIMITIVES: u32 = 10_000_000;

pub struct WgpuContext
{
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub surface_config: wgpu::SurfaceConfiguration,
    pub adapter: wgpu::Adapter,
}

// Windowing libraries tipically implement the Into<wgpu::SurfaceTarget> trait,
// if not you can easily implement it yourself
pub fn init_wgpu_context(window: impl Into<wgpu::SurfaceTarget<'static>>, width: u32, height: u32, vsync: bool) -> Result<WgpuContext>
{
    let instance_desc = wgpu::InstanceDescriptor {
        #[cfg(target_os = "windows")]
        backends: wgpu::Backends::VULKAN,

        #[cfg(not(target_os = "windows"))]
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    };
    let instance: wgpu::Instance = wgpu::Instance::new(&instance_desc);

    let surface = instance.create_surface(window).map_err(|err| Error::Surface(err.to_string()))?;

    let adapter_options = wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
    };
    let adapter = wait_for(instance.request_adapter(&adapter_options)).map_err(|err| Error::Gpu(err.to_string()))?;

    let info = adapter.get_info();
    log::info!("Using adapter '{}' ({:?})", info.name, info.backend);

    let (device, queue) = request_device_for_ember(&adapter)?;

    let caps = surface.get_capabilities(&adapter);
    // The output is already display-encoded, so avoid a second sRGB conversion.
    let format = caps.formats.iter().copied()
        .find(|f| !f.is_srgb())
        .or(caps.formats.first().copied())
        .ok_or_else(|| Error::Surface(String::from("surface reports no supported formats")))?;
    let alpha_mode = caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto);

    let surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: if vsync { wgpu::PresentMode::AutoVsync } else { wgpu::PresentMode::AutoNoVsync },
        desired_maximum_frame_latency: 2,
        alpha_mode,
        view_formats: vec![],
    };
    surface.configure(&device, &surface_config);

    return Ok(WgpuContext { device, queue, surface, surface_config, adapter });
}

/// Requests a device with hardware ray queries. Timestamp queries
/// are used when available.
pub fn request_device_for_ember(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)>
{
    if !adapter.features().contains(wgpu::Features::EXPERIMENTAL_RAY_QUERY) {
        return Err(Error::RayTracingUnsupported);
    }

    let optional_features = wgpu::Features::TIMESTAMP_QUERY;
    let supported_optional_features = optional_features.intersection(adapter.features());

    let desc = wgpu::DeviceDescriptor {
        label: Some("Ember Device"),
        required_features: wgpu::Features::EXPERIMENTAL_RAY_QUERY | supported_optional_features,
        required_limits: wgpu::Limits {
            max_acceleration_structures_per_shader_stage: RT_MAX_ACCEL_STRUCTURES,
            max_tlas_instance_count: MAX_TLAS_INSTANCES,
            max_blas_geometry_count: 1,
            max_blas_primitive_count: MAX_BLAS_PRIMITIVES,
            ..Default::default()
        },
        experimental_features: unsafe { wgpu::ExperimentalFeatures::enabled() },
        memory_hints: Default::default(),
        trace: Default::default(),
    };

    let (device, queue) = wait_for(adapter.request_device(&desc)).map_err(|err| Error::Gpu(err.to_string()))?;
    return Ok((device, queue));
}

pub fn supports_timestamps(device: &wgpu::Device) -> bool
{
    return device.features().contains(wgpu::Features::TIMESTAMP_QUERY);
}

/// Creates a storage buffer with the given contents. Empty contents get a
/// small zeroed buffer instead, since zero-sized bindings are invalid.
pub fn upload_storage_buffer(device: &wgpu::Device, queue: &wgpu::Queue, label: &str, buf: &[u8], extra_usage: wgpu::BufferUsages) -> wgpu::Buffer
{
    const MIN_SIZE: u64 = 16;
    let size = (buf.len() as u64).max(MIN_SIZE).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

    let wgpu_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::STORAGE | extra_usage,
        mapped_at_creation: false,
    });

    if !buf.is_empty()
    {
        // write_buffer needs a 4-byte multiple.
        if buf.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            queue.write_buffer(&wgpu_buffer, 0, buf);
        } else {
            let mut padded = buf.to_vec();
            padded.resize(buf.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
            queue.write_buffer(&wgpu_buffer, 0, &padded);
        }
    }

    return wgpu_buffer;
}

pub fn create_image(device: &wgpu::Device, label: &str, width: u32, height: u32, format: wgpu::TextureFormat, usage: wgpu::TextureUsages) -> wgpu::Texture
{
    return device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[]
    });
}

/// Clears a color-renderable texture to transparent black.
pub fn clear_texture(encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture)
{
    let view = texture.create_view(&Default::default());
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Ember Clear Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None
    });
}

pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32
{
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    return ((unpadded + align - 1) / align) * align;
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_row_padding()
    {
        assert_eq!(padded_bytes_per_row(1, 8), 256);
        assert_eq!(padded_bytes_per_row(32, 8), 256);
        assert_eq!(padded_bytes_per_row(33, 8), 512);
    }
}
