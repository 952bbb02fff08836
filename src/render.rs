use bytemuck::{Pod, Zeroable};
use egui_wgpu::wgpu;
use egui_wgpu::wgpu::util::DeviceExt;
use parking_lot::Mutex;
use std::sync::Arc;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Uniforms {
    pub viewport_px: [f32; 2],
    pub point_radius_px: f32,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y_rad: f32,
    pub scale: f32,
    /// Cloud center, subtracted before rotation.
    pub center: [f32; 3],
    pub _pad: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CornerVert {
    corner: [f32; 2],
}

pub struct PointCloudGpu {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group: wgpu::BindGroup,
    pub uniform_buf: wgpu::Buffer,

    pub positions: wgpu::Buffer,
    pub colors: wgpu::Buffer,
    pub corners: wgpu::Buffer,

    pub n_points: u32,
    pub target_format: wgpu::TextureFormat,

    // Change detection:
    pub last_positions_id: u64,
    pub last_colors_id: u64,
}

impl PointCloudGpu {
    fn create_pipeline(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> (wgpu::RenderPipeline, wgpu::BindGroupLayout) {
        let shader_src = include_str!("../assets/pointcloud.wgsl");
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("pointcloud.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pc_bgl"),
            entries: &[
                // uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64).unwrap(),
                        ),
                    },
                    count: None,
                },
                // positions
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // colors
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pc_pl"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("pc_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<CornerVert>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x2,
                        offset: 0,
                        shader_location: 0,
                    }],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        (pipeline, bgl)
    }

    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let (pipeline, bgl) = Self::create_pipeline(device, format);

        let uniform_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pc_uniform"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Start tiny, grow on demand
        let positions = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pc_positions"),
            size: 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let colors = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pc_colors"),
            size: 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let corners_data = [
            CornerVert { corner: [-1.0, -1.0] },
            CornerVert { corner: [1.0, -1.0] },
            CornerVert { corner: [1.0, 1.0] },
            CornerVert { corner: [-1.0, -1.0] },
            CornerVert { corner: [1.0, 1.0] },
            CornerVert { corner: [-1.0, 1.0] },
        ];
        let corners = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("pc_corners"),
            contents: bytemuck::cast_slice(&corners_data),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let bind_group = Self::make_bind_group(device, &bgl, &uniform_buf, &positions, &colors);

        Self {
            pipeline,
            bind_group,
            uniform_buf,
            positions,
            colors,
            corners,
            n_points: 0,
            target_format: format,
            last_positions_id: 0,
            last_colors_id: 0,
        }
    }

    fn make_bind_group(
        device: &wgpu::Device,
        bgl: &wgpu::BindGroupLayout,
        uniform_buf: &wgpu::Buffer,
        positions: &wgpu::Buffer,
        colors: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pc_bg"),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: colors.as_entire_binding(),
                },
            ],
        })
    }

    fn ensure_storage_buffer(
        device: &wgpu::Device,
        buf: &mut wgpu::Buffer,
        label: &str,
        need_bytes: u64,
    ) {
        if buf.size() >= need_bytes {
            return;
        }
        *buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: need_bytes.max(4),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
    }

    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: wgpu::TextureFormat,
        positions_id: u64,
        positions: &[f32],
        colors_id: u64,
        colors_rgba8: &[u32],
        uniforms: Uniforms,
    ) {
        // Format change means the pipeline is stale; rebuild everything.
        if self.target_format != format {
            *self = Self::new(device, format);
        }

        self.n_points = ((positions.len() / 3).min(colors_rgba8.len())) as u32;

        let grew_pos = self.positions.size() < (positions.len() as u64) * 4;
        let grew_col = self.colors.size() < (colors_rgba8.len() as u64) * 4;
        Self::ensure_storage_buffer(
            device,
            &mut self.positions,
            "pc_positions",
            (positions.len() as u64) * 4,
        );
        Self::ensure_storage_buffer(
            device,
            &mut self.colors,
            "pc_colors",
            (colors_rgba8.len() as u64) * 4,
        );
        if grew_pos || grew_col {
            let bgl = self.pipeline.get_bind_group_layout(0);
            self.bind_group =
                Self::make_bind_group(device, &bgl, &self.uniform_buf, &self.positions, &self.colors);
        }

        if self.last_positions_id != positions_id && !positions.is_empty() {
            queue.write_buffer(&self.positions, 0, bytemuck::cast_slice(positions));
            self.last_positions_id = positions_id;
        }
        if self.last_colors_id != colors_id && !colors_rgba8.is_empty() {
            queue.write_buffer(&self.colors, 0, bytemuck::cast_slice(colors_rgba8));
            self.last_colors_id = colors_id;
        }

        // Uniforms every frame
        queue.write_buffer(&self.uniform_buf, 0, bytemuck::bytes_of(&uniforms));
    }

    pub fn paint(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        if self.n_points == 0 {
            return;
        }
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.corners.slice(..));
        render_pass.draw(0..6, 0..self.n_points);
    }
}

pub struct RenderParams {
    pub target_format: wgpu::TextureFormat,

    pub positions_id: u64,
    pub positions: Arc<Vec<f32>>,

    pub colors_id: u64,
    pub colors_rgba8: Arc<Vec<u32>>,

    pub uniforms: Uniforms,
}

pub struct SharedRender {
    pub params: Mutex<RenderParams>,
}

impl SharedRender {
    pub fn new(target_format: wgpu::TextureFormat) -> Self {
        Self {
            params: Mutex::new(RenderParams {
                target_format,
                positions_id: 0,
                positions: Arc::new(Vec::new()),
                colors_id: 0,
                colors_rgba8: Arc::new(Vec::new()),
                uniforms: Uniforms::zeroed(),
            }),
        }
    }
}
