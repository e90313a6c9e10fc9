
use std::path::Path;

use crate::em;
use crate::eml;
use em::wgpu as wgpu;

const DEFAULT_JOB_SAMPLES: u64 = 1024;

/// Draws egui on top of the presented frame, inside the renderer's own
/// command encoder.
pub struct EguiOverlay
{
    renderer: egui_wgpu::Renderer,
    tris: Vec<egui::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
    pixels_per_point: f32,
}

impl EguiOverlay
{
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self
    {
        return Self {
            renderer: egui_wgpu::Renderer::new(device, format, egui_wgpu::RendererOptions::default()),
            tris: Vec::new(),
            textures_delta: Default::default(),
            pixels_per_point: 1.0,
        };
    }

    /// Stores this frame's output. Texture updates are kept until they are
    /// rendered, since a skipped frame never reaches the overlay.
    pub fn prepare(&mut self, egui_ctx: &egui::Context, shapes: Vec<egui::epaint::ClippedShape>,
                   textures_delta: egui::TexturesDelta, pixels_per_point: f32)
    {
        self.tris = egui_ctx.tessellate(shapes, pixels_per_point);
        self.textures_delta.append(textures_delta);
        self.pixels_per_point = pixels_per_point;
    }
}

impl em::OverlayPass for EguiOverlay
{
    fn render(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder,
              view: &wgpu::TextureView, size: (u32, u32))
    {
        for (id, image_delta) in &self.textures_delta.set
        {
            self.renderer.update_texture(device, queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor
        {
            size_in_pixels: [size.0.max(1), size.1.max(1)],
            pixels_per_point: self.pixels_per_point,
        };
        let _ = self.renderer.update_buffers(device, queue, encoder, &self.tris, &screen_descriptor);

        {
            let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor
            {
                color_attachments: &[Some(wgpu::RenderPassColorAttachment
                {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations
                    {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                label: Some("Egui Overlay"),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            // egui_wgpu wants a 'static pass.
            let mut pass_static = pass.forget_lifetime();
            self.renderer.render(&mut pass_static, &self.tris, &screen_descriptor);
        }

        for id in &self.textures_delta.free
        {
            self.renderer.free_texture(id);
        }
        self.textures_delta.clear();
    }
}

/// Values edited in the side panel that the renderer doesn't own.
pub struct ViewerUI
{
    pub panel_width: u32,
    pub mesh_names: Vec<String>,
    pub selected_mesh: Option<usize>,
    pub status: String,

    job_samples: u64,
    seq_time_min: f32,
    seq_time_max: f32,
    seq_time_step: f32,
    seq_samples: u64,
}

impl ViewerUI
{
    pub fn new() -> Self
    {
        return Self {
            panel_width: 0,
            mesh_names: Vec::new(),
            selected_mesh: None,
            status: String::new(),
            job_samples: DEFAULT_JOB_SAMPLES,
            seq_time_min: 0.0,
            seq_time_max: 1.0,
            seq_time_step: 0.25,
            seq_samples: 256,
        };
    }

    /// Imports every mesh of a file as new instances.
    pub fn open_mesh(&mut self, renderer: &mut em::WgpuRenderer, path: &Path)
    {
        let meshes = match eml::load_mesh(path)
        {
            Ok(meshes) => meshes,
            Err(err) =>
            {
                log::warn!("Failed to load '{}': {}", path.display(), err);
                self.status = format!("Failed to load '{}': {}", path.display(), err);
                return;
            }
        };

        for mesh in meshes
        {
            match renderer.upload_mesh_data(&mesh.vertices, &mesh.indices)
            {
                Ok(idx) =>
                {
                    debug_assert_eq!(idx, self.mesh_names.len());
                    self.mesh_names.push(mesh.name);
                }
                Err(err) => { self.status = format!("Rejected '{}': {}", mesh.name, err); }
            }
        }
    }

    pub fn remove_mesh(&mut self, renderer: &mut em::WgpuRenderer, idx: usize)
    {
        if let Err(err) = renderer.remove_mesh(idx)
        {
            self.status = format!("Failed to remove mesh: {}", err);
            return;
        }

        self.mesh_names.remove(idx);
        self.selected_mesh = match self.selected_mesh
        {
            Some(sel) if sel == idx => None,
            Some(sel) if sel > idx  => Some(sel - 1),
            other => other,
        };
    }

    pub fn on_sequence_status(&mut self, status: em::SequenceStatus)
    {
        match status
        {
            em::SequenceStatus::Saved { frame } => { self.status = format!("Saved sequence frame {}", frame); }
            em::SequenceStatus::Completed       => { self.status = String::from("Sequence completed"); }
            em::SequenceStatus::Aborted         => { self.status = String::from("Sequence aborted"); }
            _ => {}
        }
    }

    pub fn update_ui(&mut self, egui_ctx: &egui::Context, renderer: &mut em::WgpuRenderer)
    {
        let panel = egui::SidePanel::left("settings_panel").resizable(false).show(egui_ctx, |ui| {
            egui::ScrollArea::vertical().auto_shrink([false; 2]).show(ui, |ui| {
                ui.add_space(4.0);
                ui.vertical_centered(|ui| {
                    ui.heading("Settings");
                });

                ui.separator();
                ui.add_space(12.0);

                ui.heading("Pathtrace settings:");
                ui.add_space(4.0);
                self.ui_pathtrace_settings(ui, renderer);

                ui.add_space(12.0);
                ui.separator();
                ui.add_space(12.0);

                ui.heading("Camera:");
                ui.add_space(4.0);
                ui_camera(ui, renderer);

                ui.add_space(12.0);
                ui.separator();
                ui.add_space(12.0);

                ui.heading("Scene:");
                ui.add_space(4.0);
                self.ui_scene(ui, renderer);

                ui.add_space(12.0);
                ui.separator();
                ui.add_space(12.0);

                ui.heading("Result image:");
                ui.add_space(4.0);
                self.ui_render_job(ui, renderer);

                ui.add_space(12.0);
                ui.separator();
                ui.add_space(12.0);

                ui.heading("Sequence:");
                ui.add_space(4.0);
                self.ui_sequence(ui, renderer);

                if !self.status.is_empty()
                {
                    ui.add_space(12.0);
                    ui.separator();
                    ui.label(&self.status);
                }

                ui.add_space(12.0);
            });
        });

        let pixels_per_point = egui_ctx.pixels_per_point();
        self.panel_width = (panel.response.rect.width() * pixels_per_point) as u32;
    }

    fn ui_pathtrace_settings(&mut self, ui: &mut egui::Ui, renderer: &mut em::WgpuRenderer)
    {
        let mut auto_spp = renderer.auto_spp_enabled();
        if ui.checkbox(&mut auto_spp, "Automatic samples per pixel").changed() {
            renderer.set_auto_spp_enabled(auto_spp);
        }

        if auto_spp
        {
            ui.horizontal(|ui| {
                let mut target_fps = renderer.auto_spp_target_fps();
                let response = ui.add(egui::DragValue::new(&mut target_fps).range(1.0..=1000.0).speed(0.5));
                if response.changed() { renderer.set_auto_spp_target_fps(target_fps); }
                ui.label("Target FPS");
            });
        }

        ui.horizontal(|ui| {
            let mut spp = renderer.samples_per_pixel();
            let response = ui.add_enabled(!auto_spp, egui::DragValue::new(&mut spp).range(em::MIN_SPP..=em::MAX_SPP));
            if response.changed() { renderer.set_samples_per_pixel(spp); }
            ui.label("Samples per pixel");
        });

        ui.horizontal(|ui| {
            let mut max_bounces = renderer.max_bounces();
            let response = ui.add(egui::DragValue::new(&mut max_bounces).range(1..=em::MAX_BOUNCES));
            if response.changed() { renderer.set_max_bounces(max_bounces); }
            ui.label("Max bounces");
        });

        let mut tonemap = renderer.tone_mapping_mode();
        egui::ComboBox::from_label("Tone mapping")
            .selected_text(tonemap.name())
            .show_ui(ui, |ui| {
                for mode in em::ToneMapMode::ALL {
                    ui.selectable_value(&mut tonemap, mode, mode.name());
                }
            });
        renderer.set_tone_mapping_mode(tonemap);

        let (mut time_min, mut time_max) = renderer.time_range();
        let changed = ui_min_max(ui, "Time:", &mut time_min, &mut time_max, 0.0..=1000.0);
        if changed { renderer.set_time_range(time_min, time_max); }

        let stats = renderer.stats();
        egui::CollapsingHeader::new("Stats").id_salt("stats_pathtrace").show(ui, |ui| {
            ui.label(format!("Iteration: {}", stats.accum_frame));
            ui.label(format!("Samples: {}", stats.total_samples));
            ui.label(format!("Samples per frame: {}", stats.samples_per_pixel));
            ui.label(format!("Frame time: {:.2}ms", stats.frame_ms));
            match stats.gpu_ms
            {
                Some(gpu_ms) => { ui.label(format!("GPU time: {:.2}ms", gpu_ms)); }
                None         => { ui.label("GPU time: unavailable"); }
            }
            ui.label(format!("Resets: {}", stats.resets));
            ui.label(format!("Presented frames: {}", stats.presented_frames));
            ui.label(format!("Skipped frames: {}", stats.skipped_frames));
        });
    }

    fn ui_scene(&mut self, ui: &mut egui::Ui, renderer: &mut em::WgpuRenderer)
    {
        if ui.button("Open mesh...").clicked()
        {
            if let Some(paths) = rfd::FileDialog::new()
                .set_title("Open mesh")
                .add_filter("Mesh", &["obj", "gltf", "glb"])
                .pick_files()
            {
                for path in paths {
                    self.open_mesh(renderer, &path);
                }
            }
        }

        let mut to_remove = None;
        for (i, name) in self.mesh_names.iter().enumerate()
        {
            ui.horizontal(|ui| {
                if ui.add(egui::RadioButton::new(self.selected_mesh == Some(i), format!("{}: {}", i, name))).clicked() {
                    self.selected_mesh = Some(i);
                }
                if ui.small_button("Remove").clicked() {
                    to_remove = Some(i);
                }
            });
        }

        if let Some(idx) = to_remove {
            self.remove_mesh(renderer, idx);
        }

        let Some(idx) = self.selected_mesh else { return; };

        egui::CollapsingHeader::new("Transform").id_salt("mesh_transform").default_open(true).show(ui, |ui| {
            let Ok(mut transform) = renderer.mesh_transform(idx) else { return; };
            let mut changed = false;
            changed |= ui_vec3(ui, "Position", &mut transform.position, 0.01);
            changed |= ui_vec3(ui, "Rotation", &mut transform.rotation, 0.5);
            changed |= ui_vec3(ui, "Scale", &mut transform.scale, 0.01);
            if changed
            {
                if let Err(err) = renderer.set_mesh_transform(idx, transform) {
                    self.status = format!("Invalid transform: {}", err);
                }
            }
        });

        egui::CollapsingHeader::new("Material").id_salt("mesh_material").default_open(true).show(ui, |ui| {
            let Ok(mut material) = renderer.mesh_material(idx) else { return; };
            let mut changed = false;

            ui.horizontal(|ui| {
                let mut color = material.base_color.to_array();
                if ui.color_edit_button_rgb(&mut color).changed() {
                    material.base_color = em::Vec3::from(color);
                    changed = true;
                }
                ui.label("Base color");
            });
            changed |= ui.add(egui::Slider::new(&mut material.roughness, 0.0..=1.0).text("Roughness")).changed();
            changed |= ui.add(egui::Slider::new(&mut material.specular, 0.0..=1.0).text("Specular")).changed();
            ui.horizontal(|ui| {
                let mut color = material.emission_color.to_array();
                if ui.color_edit_button_rgb(&mut color).changed() {
                    material.emission_color = em::Vec3::from(color);
                    changed = true;
                }
                changed |= ui.add(egui::DragValue::new(&mut material.emission_strength).range(0.0..=1000.0).speed(0.05)).changed();
                ui.label("Emission");
            });

            if changed
            {
                if let Err(err) = renderer.set_mesh_material(idx, material) {
                    self.status = format!("Invalid material: {}", err);
                }
            }
        });
    }

    fn ui_render_job(&mut self, ui: &mut egui::Ui, renderer: &mut em::WgpuRenderer)
    {
        ui.horizontal(|ui| {
            ui.add(egui::DragValue::new(&mut self.job_samples).range(1..=1_000_000));
            ui.label("Samples");
        });

        let stats = renderer.stats();
        match renderer.render_mode()
        {
            em::RenderMode::Progressive =>
            {
                if ui.button("Render").clicked() {
                    renderer.start_render_job(self.job_samples);
                }
            }
            em::RenderMode::Job { target_samples } | em::RenderMode::Finished { target_samples } =>
            {
                let progress = (stats.total_samples as f32 / target_samples as f32).min(1.0);
                ui.add(egui::ProgressBar::new(progress)
                    .text(format!("{}/{}", stats.total_samples.min(target_samples), target_samples)));

                let in_sequence = renderer.render_sequence().is_some();
                if ui.add_enabled(!in_sequence, egui::Button::new("Back to preview")).clicked() {
                    renderer.cancel_render_job();
                }
            }
        }

        if ui.button("Save PNG...").clicked()
        {
            if let Some(path) = rfd::FileDialog::new()
                .set_title("Save render")
                .add_filter("PNG Image", &["png"])
                .save_file()
            {
                match renderer.save_current_render_png(&path)
                {
                    Ok(())   => { self.status = format!("Saved '{}'", path.display()); }
                    Err(err) => { self.status = format!("Failed to save render: {}", err); }
                }
            }
        }
    }

    fn ui_sequence(&mut self, ui: &mut egui::Ui, renderer: &mut em::WgpuRenderer)
    {
        if let Some(seq) = renderer.render_sequence()
        {
            let (frame, count) = (seq.frame_index, seq.frame_count);
            ui.add(egui::ProgressBar::new(frame as f32 / count.max(1) as f32)
                .text(format!("Frame {}/{}", frame + 1, count)));
            if ui.button("Cancel sequence").clicked() {
                renderer.cancel_render_sequence();
                self.status = String::from("Sequence cancelled");
            }
            return;
        }

        ui_min_max(ui, "Range:", &mut self.seq_time_min, &mut self.seq_time_max, 0.0..=1000.0);
        ui.horizontal(|ui| {
            ui.add(egui::DragValue::new(&mut self.seq_time_step).range(0.001..=1000.0).speed(0.01));
            ui.label("Time step");
        });
        ui.horizontal(|ui| {
            ui.add(egui::DragValue::new(&mut self.seq_samples).range(1..=1_000_000));
            ui.label("Samples per frame");
        });

        if ui.button("Render sequence...").clicked()
        {
            if let Some(folder) = rfd::FileDialog::new().set_title("Output folder").pick_folder()
            {
                let res = renderer.begin_render_sequence(&folder, self.seq_time_min, self.seq_time_max,
                                                         self.seq_time_step, self.seq_samples);
                if let Err(err) = res {
                    self.status = format!("Cannot start sequence: {}", err);
                }
            }
        }
    }
}

fn ui_camera(ui: &mut egui::Ui, renderer: &mut em::WgpuRenderer)
{
    let mut pose = renderer.camera_get_pose();
    let mut changed = false;
    changed |= ui_vec3(ui, "Position", &mut pose.position, 0.01);
    changed |= ui_vec3(ui, "Target", &mut pose.target, 0.01);
    ui.horizontal(|ui| {
        changed |= ui.add(egui::DragValue::new(&mut pose.vfov).range(1.0..=179.0).speed(0.1)).changed();
        ui.label("Vertical FOV");
    });

    if changed {
        renderer.camera_set_pose(Some(pose.position), Some(pose.target), None, Some(pose.vfov));
    }

    if ui.button("Reset camera").clicked() {
        reset_camera(renderer);
    }
}

pub fn reset_camera(renderer: &mut em::WgpuRenderer)
{
    let default = em::CameraPose::default();
    renderer.camera_set_pose(Some(default.position), Some(default.target), Some(default.up), Some(default.vfov));
}

fn ui_vec3(ui: &mut egui::Ui, label: &str, v: &mut em::Vec3, speed: f32) -> bool
{
    let mut changed = false;
    ui.horizontal(|ui| {
        changed |= ui.add(egui::DragValue::new(&mut v.x).speed(speed)).changed();
        changed |= ui.add(egui::DragValue::new(&mut v.y).speed(speed)).changed();
        changed |= ui.add(egui::DragValue::new(&mut v.z).speed(speed)).changed();
        ui.label(label);
    });
    return changed;
}

fn ui_min_max(ui: &mut egui::Ui, string: &str, min: &mut f32, max: &mut f32, range: std::ops::RangeInclusive<f32>) -> bool
{
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(string);
        changed |= ui.add(
            egui::DragValue::new(min)
                .speed(0.01)
                .range(*range.start()..=*max)
                .prefix("Min: ")
        ).changed();
        changed |= ui.add(
            egui::DragValue::new(max)
                .speed(0.01)
                .range(*min..=*range.end())
                .prefix("Max: ")
        ).changed();
    });
    return changed;
}
