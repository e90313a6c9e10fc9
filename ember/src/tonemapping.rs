
use serde::{Deserialize, Serialize};

use crate::camera::Viewport;

/// Operator applied by the trace shader when it resolves the
/// accumulated radiance into the output image.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToneMapMode
{
    None,
    #[default]
    Aces,
    Filmic,
}

impl ToneMapMode
{
    pub const ALL: [ToneMapMode; 3] = [ToneMapMode::None, ToneMapMode::Aces, ToneMapMode::Filmic];

    // NOTE: Coupled to shader.
    pub fn shader_code(self) -> u32
    {
        return match self
        {
            ToneMapMode::None   => 0,
            ToneMapMode::Aces   => 1,
            ToneMapMode::Filmic => 2,
        };
    }

    pub fn name(self) -> &'static str
    {
        return match self
        {
            ToneMapMode::None   => "None",
            ToneMapMode::Aces   => "ACES",
            ToneMapMode::Filmic => "Filmic",
        };
    }
}

/// Fullscreen blit of the output image into the swapchain.
pub struct PresentResources
{
    pub pipeline: wgpu::RenderPipeline,
    pub sampler: wgpu::Sampler,
    pub uniforms: wgpu::Buffer,
}

// NOTE: Coupled to the present shader
#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct PresentUniforms
{
    /// Sub-rect of the source texture, in UV space.
    pub uv_offset: [f32; 2],
    pub uv_scale: [f32; 2],
    /// Letterboxing scale, in NDC.
    pub scale: [f32; 2],
    pub _padding: [f32; 2],
}

pub fn build_present_resources(device: &wgpu::Device, shader_src: &str, target_format: wgpu::TextureFormat) -> PresentResources
{
    let shader_desc = wgpu::ShaderModuleDescriptor {
        label: Some("Ember Present Shader"),
        source: wgpu::ShaderSource::Wgsl(shader_src.into())
    };

    let present_shader = device.create_shader_module(shader_desc);

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor{
        label: None,
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2
                },
                count: None
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None
            }
        ]
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Ember Present Pipeline Layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Ember Present Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &present_shader,
            entry_point: Some("vert_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &present_shader,
            entry_point: Some("frag_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: Some(wgpu::BlendState {
                    color: wgpu::BlendComponent::REPLACE,
                    alpha: wgpu::BlendComponent::REPLACE,
                }),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    });

    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Ember Present Uniforms"),
        size: std::mem::size_of::<PresentUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    return PresentResources { pipeline, sampler, uniforms };
}

/// Uniforms that map the viewport's region of the source onto the
/// same region of the target, letterboxed if the aspect ratios differ.
pub fn present_uniforms(source_size: (u32, u32), viewport: Viewport) -> PresentUniforms
{
    let src_w = source_size.0.max(1) as f32;
    let src_h = source_size.1.max(1) as f32;

    // The source may still be stale by a frame after a resize.
    let crop_x = (viewport.x as f32).min(src_w - 1.0);
    let crop_y = (viewport.y as f32).min(src_h - 1.0);
    let crop_w = (viewport.w as f32).min(src_w - crop_x).max(1.0);
    let crop_h = (viewport.h as f32).min(src_h - crop_y).max(1.0);

    let src_aspect = crop_w / crop_h;
    let dst_aspect = viewport.aspect();
    let scale = if src_aspect > dst_aspect {
        [1.0, dst_aspect / src_aspect]
    } else {
        [src_aspect / dst_aspect, 1.0]
    };

    return PresentUniforms {
        uv_offset: [crop_x / src_w, crop_y / src_h],
        uv_scale: [crop_w / src_w, crop_h / src_h],
        scale,
        _padding: [0.0; 2],
    };
}

pub fn record_present_blit(device: &wgpu::Device, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder,
                           resources: &PresentResources, source: &wgpu::Texture, target: &wgpu::TextureView,
                           viewport: Viewport)
{
    let source_view = source.create_view(&Default::default());
    let params = present_uniforms((source.width(), source.height()), viewport);
    queue.write_buffer(&resources.uniforms, 0, bytemuck::cast_slice(&[params]));

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: None,
        layout: &resources.pipeline.get_bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&source_view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&resources.sampler) },
            wgpu::BindGroupEntry { binding: 2, resource: resources.uniforms.as_entire_binding() },
        ]
    });

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Ember Present Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 }),
                store: wgpu::StoreOp::Store
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None
    });

    pass.set_viewport(viewport.x as f32, viewport.y as f32, viewport.w as f32, viewport.h as f32, 0.0, 1.0);
    pass.set_scissor_rect(viewport.x, viewport.y, viewport.w, viewport.h);
    pass.set_pipeline(&resources.pipeline);
    pass.set_bind_group(0, &bind_group, &[]);
    pass.draw(0..6, 0..1);
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_shader_codes_are_distinct()
    {
        let codes: Vec<u32> = ToneMapMode::ALL.iter().map(|m| m.shader_code()).collect();
        assert_eq!(codes, vec![0, 1, 2]);
    }

    #[test]
    fn test_present_uniforms_full_viewport()
    {
        let params = present_uniforms((800, 600), Viewport::full(800, 600));
        assert_eq!(params.uv_offset, [0.0, 0.0]);
        assert_eq!(params.uv_scale, [1.0, 1.0]);
        assert_eq!(params.scale, [1.0, 1.0]);
    }

    #[test]
    fn test_present_uniforms_crop()
    {
        let params = present_uniforms((800, 600), Viewport { x: 400, y: 0, w: 400, h: 300 });
        assert_eq!(params.uv_offset, [0.5, 0.0]);
        assert_eq!(params.uv_scale, [0.5, 0.5]);
        assert_eq!(params.scale, [1.0, 1.0]);
    }

    #[test]
    fn test_present_uniforms_letterbox_stale_source()
    {
        // Source still at the old size while the viewport grew.
        let params = present_uniforms((400, 400), Viewport { x: 0, y: 0, w: 800, h: 400 });
        assert_eq!(params.uv_scale, [1.0, 1.0]);
        assert_eq!(params.scale, [0.5, 1.0]);
    }
}
