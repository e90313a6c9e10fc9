
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::*;
use crate::backend::*;
use crate::wgpu_utils::*;
use crate::tonemapping::*;
use crate::config::RendererConfig;
use crate::geometry::Vertex;
use crate::materials::GpuMaterial;
use crate::accel::MeshInfo;
use crate::camera::{SceneUniform, Viewport};
use crate::export::strip_row_padding;

// NOTE: Coupled to shader.
pub const WORKGROUP_SIZE: u32 = 8;

const ACCUM_FORMAT: wgpu::TextureFormat  = wgpu::TextureFormat::Rgba32Float;
const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Draws on top of the presented frame, after the blit.
pub trait OverlayPass
{
    fn render(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder,
              view: &wgpu::TextureView, size: (u32, u32));
}

pub struct DoubleBufferedTexture
{
    pub textures: [wgpu::Texture; 2],
    pub front_idx: usize,
    pub back_idx: usize
}

impl DoubleBufferedTexture
{
    pub fn create(device: &wgpu::Device, label: &str, width: u32, height: u32, format: wgpu::TextureFormat, usage: wgpu::TextureUsages) -> DoubleBufferedTexture
    {
        return Self {
            textures: [
                create_image(device, label, width, height, format, usage),
                create_image(device, label, width, height, format, usage),
            ],
            front_idx: 0,
            back_idx: 1,
        }
    }

    /// Last written image.
    pub fn front<'a>(&'a self) -> &'a wgpu::Texture
    {
        return &self.textures[self.front_idx];
    }

    pub fn back<'a>(&'a self) -> &'a wgpu::Texture
    {
        return &self.textures[self.back_idx];
    }

    pub fn flip(&mut self)
    {
        std::mem::swap(&mut self.front_idx, &mut self.back_idx);
    }
}

const TIMESTAMPS_IDLE: u8    = 0;
const TIMESTAMPS_PENDING: u8 = 1;
const TIMESTAMPS_MAPPED: u8  = 2;

struct TimestampQueries
{
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    state: Arc<AtomicU8>,
}

struct FrameSlot
{
    /// Last submission recorded from this slot.
    submission: Option<wgpu::SubmissionIndex>,
    timestamps: Option<TimestampQueries>,
}

struct ImageResources
{
    accum: DoubleBufferedTexture,
    output: wgpu::Texture,
    /// Entry `i` reads `accum.textures[i]` and writes the other one.
    bind_groups: [wgpu::BindGroup; 2],
}

pub struct WgpuBackend
{
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    current_frame: Option<wgpu::SurfaceTexture>,

    trace_pipeline: wgpu::ComputePipeline,
    scene_layout: wgpu::BindGroupLayout,
    images_layout: wgpu::BindGroupLayout,
    present: PresentResources,

    // Scene
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    mesh_info_buffer: wgpu::Buffer,
    material_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    blases: HashMap<u32, wgpu::Blas>,
    next_blas: u32,
    tlas: Option<wgpu::Tlas>,
    scene_bind_group: Option<wgpu::BindGroup>,

    images: ImageResources,
    slots: Vec<FrameSlot>,
    timestamp_period: f32,
}

impl WgpuBackend
{
    pub fn new(window: impl Into<wgpu::SurfaceTarget<'static>>, width: u32, height: u32, config: &RendererConfig) -> Result<Self>
    {
        let ctx = init_wgpu_context(window, width, height, config.vsync)?;
        let device = ctx.device;
        let queue = ctx.queue;

        let trace_src = load_shader(&config.shaders.trace)?;
        let present_src = load_shader(&config.shaders.present)?;

        let scene_layout = create_scene_bindgroup_layout(&device);
        let images_layout = create_images_bindgroup_layout(&device);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ember Trace Shader"),
            source: wgpu::ShaderSource::Wgsl(trace_src.into())
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Ember Trace Pipeline Layout"),
            bind_group_layouts: &[&scene_layout, &images_layout],
            push_constant_ranges: &[],
        });

        let trace_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Ember Trace Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("trace_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let present = build_present_resources(&device, &present_src, ctx.surface_config.format);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ember Scene Uniform"),
            size: std::mem::size_of::<SceneUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let geometry_usage = wgpu::BufferUsages::BLAS_INPUT;
        let vertex_buffer    = upload_storage_buffer(&device, &queue, "Ember Vertices", &[], geometry_usage);
        let index_buffer     = upload_storage_buffer(&device, &queue, "Ember Indices", &[], geometry_usage);
        let mesh_info_buffer = upload_storage_buffer(&device, &queue, "Ember Mesh Infos", &[], wgpu::BufferUsages::empty());
        let material_buffer  = upload_storage_buffer(&device, &queue, "Ember Materials", &[], wgpu::BufferUsages::empty());

        let (fb_width, fb_height) = (ctx.surface_config.width, ctx.surface_config.height);
        let images = create_image_resources(&device, &images_layout, fb_width, fb_height);

        let with_timestamps = supports_timestamps(&device);
        if !with_timestamps {
            log::info!("Timestamp queries unsupported, GPU frame times unavailable");
        }
        let num_slots = config.frames_in_flight.max(1) as usize;
        let slots = (0..num_slots).map(|_| FrameSlot {
            submission: None,
            timestamps: if with_timestamps { Some(create_timestamp_queries(&device)) } else { None },
        }).collect();

        let timestamp_period = queue.get_timestamp_period();

        log::info!("Renderer initialized ({}x{}, {} frames in flight, surface format {:?})",
                   fb_width, fb_height, num_slots, ctx.surface_config.format);

        return Ok(Self {
            device,
            queue,
            surface: ctx.surface,
            surface_config: ctx.surface_config,
            current_frame: None,
            trace_pipeline,
            scene_layout,
            images_layout,
            present,
            vertex_buffer,
            index_buffer,
            mesh_info_buffer,
            material_buffer,
            uniform_buffer,
            blases: HashMap::new(),
            next_blas: 0,
            tlas: None,
            scene_bind_group: None,
            images,
            slots,
            timestamp_period,
        });
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat
    {
        return self.surface_config.format;
    }
}

fn load_shader(path: &Path) -> Result<String>
{
    return std::fs::read_to_string(path).map_err(|source| Error::ShaderLoad { path: path.to_path_buf(), source });
}

impl SceneBackend for WgpuBackend
{
    fn wait_idle(&mut self) -> Result<()>
    {
        self.device.poll(wgpu::PollType::wait_indefinitely()).map_err(|err| {
            log::error!("Failed to wait for the device: {}", err);
            Error::DeviceLost(err.to_string())
        })?;
        return Ok(());
    }

    fn upload_geometry(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<()>
    {
        let usage = wgpu::BufferUsages::BLAS_INPUT;
        self.vertex_buffer = upload_storage_buffer(&self.device, &self.queue, "Ember Vertices", bytemuck::cast_slice(vertices), usage);
        self.index_buffer  = upload_storage_buffer(&self.device, &self.queue, "Ember Indices", bytemuck::cast_slice(indices), usage);
        return Ok(());
    }

    fn build_blases(&mut self, spans: &[GeometrySpan]) -> Result<Vec<BlasHandle>>
    {
        let size_descs: Vec<wgpu::BlasTriangleGeometrySizeDescriptor> = spans.iter().map(|span| {
            wgpu::BlasTriangleGeometrySizeDescriptor {
                vertex_format: wgpu::VertexFormat::Float32x3,
                vertex_count: span.vertex_count,
                index_format: Some(wgpu::IndexFormat::Uint32),
                index_count: Some(span.index_count),
                flags: wgpu::AccelerationStructureGeometryFlags::OPAQUE,
            }
        }).collect();

        let blases: Vec<wgpu::Blas> = size_descs.iter().map(|size_desc| {
            self.device.create_blas(
                &wgpu::CreateBlasDescriptor {
                    label: Some("Ember BLAS"),
                    flags: wgpu::AccelerationStructureFlags::PREFER_FAST_TRACE,
                    update_mode: wgpu::AccelerationStructureUpdateMode::Build,
                },
                wgpu::BlasGeometrySizeDescriptors::Triangles {
                    descriptors: vec![size_desc.clone()],
                },
            )
        }).collect();

        let mut build_entries = Vec::with_capacity(spans.len());
        for (i, span) in spans.iter().enumerate()
        {
            let triangle_geometry = wgpu::BlasTriangleGeometry {
                size: &size_descs[i],
                vertex_buffer: &self.vertex_buffer,
                first_vertex: span.vertex_base,
                vertex_stride: std::mem::size_of::<Vertex>() as u64,
                index_buffer: Some(&self.index_buffer),
                first_index: Some(span.index_base),
                transform_buffer: None,
                transform_buffer_offset: None,
            };

            build_entries.push(wgpu::BlasBuildEntry {
                blas: &blases[i],
                geometry: wgpu::BlasGeometries::TriangleGeometries(vec![triangle_geometry]),
            });
        }

        // We might run out of memory due to the size of temporary scratch buffers.
        for chunk in build_entries.chunks(10)
        {
            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Ember BLAS Build") });
            encoder.build_acceleration_structures(chunk.iter(), std::iter::empty());
            self.queue.submit(Some(encoder.finish()));
        }
        drop(build_entries);

        let mut handles = Vec::with_capacity(blases.len());
        for blas in blases
        {
            let handle = BlasHandle(self.next_blas);
            self.next_blas = self.next_blas.wrapping_add(1);
            self.blases.insert(handle.0, blas);
            handles.push(handle);
        }
        return Ok(handles);
    }

    fn destroy_blas(&mut self, blas: BlasHandle)
    {
        self.blases.remove(&blas.0);
    }

    fn build_tlas(&mut self, instances: &[TlasInstanceDesc]) -> Result<()>
    {
        let mut tlas = self.device.create_tlas(&wgpu::CreateTlasDescriptor {
            label: Some("Ember TLAS"),
            flags: wgpu::AccelerationStructureFlags::PREFER_FAST_TRACE,
            update_mode: wgpu::AccelerationStructureUpdateMode::Build,
            max_instances: instances.len().max(1) as u32,
        });

        for (i, instance) in instances.iter().enumerate()
        {
            let Some(blas) = self.blases.get(&instance.blas.0) else {
                return Err(Error::Gpu(format!("TLAS instance {} references a missing BLAS", i)));
            };

            // Using the index_mut trait for wgpu::Tlas.
            tlas[i] = Some(wgpu::TlasInstance::new(blas, instance.transform, instance.custom_index, instance.mask));
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Ember TLAS Build") });
        encoder.build_acceleration_structures(std::iter::empty(), std::iter::once(&tlas));
        self.queue.submit(Some(encoder.finish()));

        self.tlas = Some(tlas);
        return Ok(());
    }

    fn destroy_tlas(&mut self)
    {
        self.scene_bind_group = None;
        self.tlas = None;
    }

    fn upload_mesh_infos(&mut self, infos: &[MeshInfo]) -> Result<()>
    {
        self.mesh_info_buffer = upload_storage_buffer(&self.device, &self.queue, "Ember Mesh Infos", bytemuck::cast_slice(infos), wgpu::BufferUsages::empty());
        return Ok(());
    }

    fn upload_materials(&mut self, materials: &[GpuMaterial]) -> Result<()>
    {
        self.material_buffer = upload_storage_buffer(&self.device, &self.queue, "Ember Materials", bytemuck::cast_slice(materials), wgpu::BufferUsages::empty());
        return Ok(());
    }

    fn update_descriptors(&mut self) -> Result<()>
    {
        self.scene_bind_group = match &self.tlas
        {
            Some(tlas) => Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Ember Scene Bindgroup"),
                layout: &self.scene_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: self.uniform_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: tlas.as_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: self.vertex_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: self.index_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: self.mesh_info_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 5, resource: self.material_buffer.as_entire_binding() },
                ]
            })),
            None => None,
        };
        return Ok(());
    }
}

impl SurfaceBackend for WgpuBackend
{
    type Overlay = dyn OverlayPass;

    fn frames_in_flight(&self) -> usize
    {
        return self.slots.len();
    }

    fn wait_slot(&mut self, slot: usize) -> Result<()>
    {
        let Some(submission) = self.slots.get_mut(slot).and_then(|s| s.submission.take()) else { return Ok(()); };

        let poll_type = wgpu::PollType::Wait { submission_index: Some(submission), timeout: None };
        self.device.poll(poll_type).map_err(|err| {
            log::error!("Failed to wait for frame slot {}: {}", slot, err);
            Error::DeviceLost(err.to_string())
        })?;
        return Ok(());
    }

    fn acquire(&mut self) -> Result<AcquireOutcome>
    {
        // Drop a frame left over from an aborted sequence.
        self.current_frame = None;

        return match self.surface.get_current_texture()
        {
            Ok(frame) =>
            {
                self.current_frame = Some(frame);
                Ok(AcquireOutcome::Acquired)
            }
            Err(e @ wgpu::SurfaceError::Lost) | Err(e @ wgpu::SurfaceError::Outdated) | Err(e @ wgpu::SurfaceError::Timeout) =>
            {
                log::warn!("Failed to acquire swapchain image: {}", e);
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(Error::Surface(e.to_string())),
        };
    }

    fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<(u32, u32)>
    {
        self.current_frame = None;
        self.surface_config.width  = width.max(1);
        self.surface_config.height = height.max(1);
        self.surface.configure(&self.device, &self.surface_config);

        let (width, height) = (self.surface_config.width, self.surface_config.height);
        self.images = create_image_resources(&self.device, &self.images_layout, width, height);
        return Ok((width, height));
    }

    fn framebuffer_size(&self) -> (u32, u32)
    {
        return (self.surface_config.width, self.surface_config.height);
    }

    fn descriptors_ready(&self) -> bool
    {
        return self.scene_bind_group.is_some();
    }

    fn submit(&mut self, record: &FrameRecord, overlay: Option<&mut Self::Overlay>) -> Result<()>
    {
        let Some(frame) = self.current_frame.as_ref() else {
            return Err(Error::InvalidState("no acquired swapchain image"));
        };
        let Some(slot) = self.slots.get_mut(record.slot) else {
            return Err(Error::InvalidState("frame slot out of range"));
        };

        let swapchain_view = frame.texture.create_view(&Default::default());
        self.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&record.uniform));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Ember Frame") });

        if record.clear_accumulation
        {
            clear_texture(&mut encoder, &self.images.accum.textures[0]);
            clear_texture(&mut encoder, &self.images.accum.textures[1]);
            clear_texture(&mut encoder, &self.images.output);
        }

        let mut wrote_timestamps = false;
        let mut traced = false;
        if let (true, Some(scene_bind_group)) = (record.dispatch_trace, self.scene_bind_group.as_ref())
        {
            // Skip timing this frame if the last readback is still in use.
            let timestamps = slot.timestamps.as_ref().filter(|ts| ts.state.load(Ordering::Acquire) == TIMESTAMPS_IDLE);

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Ember Trace Pass"),
                    timestamp_writes: timestamps.map(|ts| wgpu::ComputePassTimestampWrites {
                        query_set: &ts.query_set,
                        beginning_of_pass_write_index: Some(0),
                        end_of_pass_write_index: Some(1),
                    }),
                });

                pass.set_pipeline(&self.trace_pipeline);
                pass.set_bind_group(0, scene_bind_group, &[]);
                pass.set_bind_group(1, &self.images.bind_groups[self.images.accum.front_idx], &[]);

                let num_workers_x = (record.viewport.w + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
                let num_workers_y = (record.viewport.h + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
                pass.dispatch_workgroups(num_workers_x, num_workers_y, 1);
            }

            if let Some(ts) = timestamps
            {
                encoder.resolve_query_set(&ts.query_set, 0..2, &ts.resolve, 0);
                encoder.copy_buffer_to_buffer(&ts.resolve, 0, &ts.readback, 0, ts.readback.size());
                wrote_timestamps = true;
            }
            traced = true;
        }

        record_present_blit(&self.device, &self.queue, &mut encoder, &self.present, &self.images.output, &swapchain_view, record.viewport);

        if let Some(overlay) = overlay {
            overlay.render(&self.device, &self.queue, &mut encoder, &swapchain_view, (self.surface_config.width, self.surface_config.height));
        }

        slot.submission = Some(self.queue.submit(Some(encoder.finish())));

        if wrote_timestamps
        {
            if let Some(ts) = slot.timestamps.as_ref()
            {
                let state = ts.state.clone();
                state.store(TIMESTAMPS_PENDING, Ordering::Release);
                ts.readback.slice(..).map_async(wgpu::MapMode::Read, move |res| {
                    let next = if res.is_ok() { TIMESTAMPS_MAPPED } else { TIMESTAMPS_IDLE };
                    state.store(next, Ordering::Release);
                });
            }
        }

        if traced {
            self.images.accum.flip();
        }
        return Ok(());
    }

    fn present(&mut self) -> Result<PresentOutcome>
    {
        let Some(frame) = self.current_frame.take() else {
            return Err(Error::InvalidState("no acquired swapchain image to present"));
        };

        let suboptimal = frame.suboptimal;
        frame.present();
        return Ok(if suboptimal { PresentOutcome::NeedsRecreate } else { PresentOutcome::Presented });
    }

    fn gpu_frame_time_ms(&mut self, slot: usize) -> Option<f32>
    {
        let ts = self.slots.get(slot)?.timestamps.as_ref()?;
        if ts.state.load(Ordering::Acquire) != TIMESTAMPS_MAPPED { return None; }

        let ticks: [u64; 2] = {
            let data = ts.readback.slice(..).get_mapped_range();
            let values: &[u64] = bytemuck::cast_slice(&data);
            [values[0], values[1]]
        };
        ts.readback.unmap();
        ts.state.store(TIMESTAMPS_IDLE, Ordering::Release);

        let elapsed_ns = ticks[1].saturating_sub(ticks[0]) as f64 * self.timestamp_period as f64;
        return Some((elapsed_ns / 1_000_000.0) as f32);
    }

    fn read_output(&mut self, rect: Viewport) -> Result<Vec<u16>>
    {
        self.wait_idle()?;

        let texture = &self.images.output;
        let rect = Viewport::clamped(rect, texture.width(), texture.height());
        let bytes_per_pixel = 8;
        let padded = padded_bytes_per_row(rect.w, bytes_per_pixel);

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ember Readback Buffer"),
            size: padded as u64 * rect.h as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Ember Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: rect.x, y: rect.y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(rect.h),
                },
            },
            wgpu::Extent3d { width: rect.w, height: rect.h, depth_or_array_layers: 1 },
        );
        self.queue.submit(Some(encoder.finish()));

        let mapped = Arc::new(AtomicBool::new(false));
        let mapped_cb = mapped.clone();
        let buffer_slice = output_buffer.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |res| mapped_cb.store(res.is_ok(), Ordering::Release));
        self.wait_idle()?;

        if !mapped.load(Ordering::Acquire) {
            return Err(Error::Gpu(String::from("failed to map the readback buffer")));
        }

        let bytes = {
            let data = buffer_slice.get_mapped_range();
            strip_row_padding(&data, padded as usize, (rect.w * bytes_per_pixel) as usize, rect.h as usize)
        };
        output_buffer.unmap();

        let pixels = bytes.chunks_exact(2)
            .map(|b| crate::export::f16_to_u16_unorm(half::f16::from_le_bytes([b[0], b[1]])))
            .collect();
        return Ok(pixels);
    }
}

fn create_timestamp_queries(device: &wgpu::Device) -> TimestampQueries
{
    let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
        label: Some("Ember Trace Timestamps"),
        ty: wgpu::QueryType::Timestamp,
        count: 2,
    });

    let size = 2 * std::mem::size_of::<u64>() as u64;
    let resolve = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Ember Timestamp Resolve"),
        size,
        usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Ember Timestamp Readback"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    return TimestampQueries { query_set, resolve, readback, state: Arc::new(AtomicU8::new(TIMESTAMPS_IDLE)) };
}

fn create_image_resources(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, width: u32, height: u32) -> ImageResources
{
    let accum = DoubleBufferedTexture::create(device, "Ember Accumulation", width, height, ACCUM_FORMAT,
                                              wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING |
                                              wgpu::TextureUsages::RENDER_ATTACHMENT);
    let output = create_image(device, "Ember Output", width, height, OUTPUT_FORMAT,
                              wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING |
                              wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC);

    let views = [
        accum.textures[0].create_view(&Default::default()),
        accum.textures[1].create_view(&Default::default()),
    ];
    let output_view = output.create_view(&Default::default());

    let make_bind_group = |read: usize, write: usize| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ember Images Bindgroup"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&views[read]) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&views[write]) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&output_view) },
            ]
        })
    };
    let bind_groups = [make_bind_group(0, 1), make_bind_group(1, 0)];

    return ImageResources { accum, output, bind_groups };
}

fn create_scene_bindgroup_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout
{
    fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry
    {
        return wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
    }

    return device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Ember Scene Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {  // scene uniform
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {  // tlas
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::AccelerationStructure { vertex_return: false },
                count: None,
            },
            storage_entry(2),  // vertices
            storage_entry(3),  // indices
            storage_entry(4),  // mesh infos
            storage_entry(5),  // materials
        ]
    });
}

fn create_images_bindgroup_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout
{
    return device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Ember Images Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {  // accumulation, previous
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2
                },
                count: None
            },
            wgpu::BindGroupLayoutEntry {  // accumulation, next
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: ACCUM_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2
                },
                count: None
            },
            wgpu::BindGroupLayoutEntry {  // tone-mapped output
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: OUTPUT_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2
                },
                count: None
            },
        ]
    });
}
