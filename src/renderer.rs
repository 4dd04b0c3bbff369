use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::assets::{TextureData, TextureMap};
use crate::camera::Camera;
use crate::frame_loop::RenderDriver;
use crate::mesh::{self, MeshData, Vertex};
use crate::scene::{Entity, EntityKind, Scene, ShadowSettings};
use crate::viewport::{OutputSize, RenderOutput};

const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.05, g: 0.06, b: 0.08, a: 1.0 };
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;
const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const TONE_MAPPING_EXPOSURE: f32 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

// Per-frame data shared by every draw and by the shadow pass.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct FrameUniforms {
    view_proj: [[f32; 4]; 4],
    shadow_view_proj: [[f32; 4]; 4],
    camera_position: [f32; 3],
    ambient_intensity: f32,
    ambient_color: [f32; 3],
    spot_intensity: f32,
    spot_position: [f32; 3],
    spot_distance: f32,
    spot_direction: [f32; 3],
    spot_decay: f32,
    spot_color: [f32; 3],
    spot_cos_inner: f32,
    spot_cos_outer: f32,
    exposure: f32,
    shadow_bias: f32,
    shadow_normal_bias: f32,
    shadow_texel: f32,
    _padding: [f32; 3],
}

impl FrameUniforms {
    pub fn new(camera: &Camera, scene: &Scene) -> Self {
        let spot = &scene.spot;
        let (cos_inner, cos_outer) = spot.cone_cosines();
        Self {
            view_proj: camera.view_proj().to_cols_array_2d(),
            shadow_view_proj: spot.shadow_view_proj().to_cols_array_2d(),
            camera_position: camera.position.to_array(),
            ambient_intensity: scene.ambient.intensity,
            ambient_color: scene.ambient.color,
            spot_intensity: spot.intensity,
            spot_position: spot.position.to_array(),
            spot_distance: spot.distance,
            spot_direction: spot.direction.to_array(),
            spot_decay: spot.decay,
            spot_color: spot.color,
            spot_cos_inner: cos_inner,
            spot_cos_outer: cos_outer,
            exposure: TONE_MAPPING_EXPOSURE,
            shadow_bias: spot.shadow.bias,
            shadow_normal_bias: spot.shadow.normal_bias,
            shadow_texel: 1.0 / spot.shadow.map_size.max(1) as f32,
            _padding: [0.0; 3],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct ObjectUniforms {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    uv_repeat: [f32; 2],
    roughness: f32,
    receive_shadow: f32,
}

impl ObjectUniforms {
    pub fn new(entity: &Entity) -> Self {
        let model = entity.transform.matrix();
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            uv_repeat: [entity.uv_repeat, entity.uv_repeat],
            roughness: entity.roughness,
            receive_shadow: if entity.receive_shadow { 1.0 } else { 0.0 },
        }
    }
}

const SCENE_SHADER: &str = r#"
struct Frame {
    view_proj: mat4x4<f32>,
    shadow_view_proj: mat4x4<f32>,
    camera_position: vec3<f32>,
    ambient_intensity: f32,
    ambient_color: vec3<f32>,
    spot_intensity: f32,
    spot_position: vec3<f32>,
    spot_distance: f32,
    spot_direction: vec3<f32>,
    spot_decay: f32,
    spot_color: vec3<f32>,
    spot_cos_inner: f32,
    spot_cos_outer: f32,
    exposure: f32,
    shadow_bias: f32,
    shadow_normal_bias: f32,
    shadow_texel: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}

struct Object {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    uv_repeat: vec2<f32>,
    roughness: f32,
    receive_shadow: f32,
}

@group(0) @binding(0) var<uniform> frame: Frame;
@group(1) @binding(0) var<uniform> object: Object;
@group(1) @binding(1) var color_map: texture_2d<f32>;
@group(1) @binding(2) var normal_map: texture_2d<f32>;
@group(1) @binding(3) var roughness_map: texture_2d<f32>;
@group(1) @binding(4) var occlusion_map: texture_2d<f32>;
@group(1) @binding(5) var material_sampler: sampler;
@group(2) @binding(0) var shadow_map: texture_depth_2d;
@group(2) @binding(1) var shadow_sampler: sampler_comparison;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

const PI: f32 = 3.14159265;

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    let world = object.model * vec4<f32>(in.position, 1.0);
    var out: VertexOutput;
    out.clip_position = frame.view_proj * world;
    out.world_position = world.xyz;
    out.normal = (object.normal_matrix * vec4<f32>(in.normal, 0.0)).xyz;
    out.uv = in.uv * object.uv_repeat;
    return out;
}

@vertex
fn vs_shadow(in: VertexInput) -> @builtin(position) vec4<f32> {
    return frame.shadow_view_proj * object.model * vec4<f32>(in.position, 1.0);
}

fn distance_falloff(d: f32) -> f32 {
    var falloff = 1.0 / max(pow(d, frame.spot_decay), 0.01);
    if (frame.spot_distance > 0.0) {
        let r = d / frame.spot_distance;
        let cutoff = clamp(1.0 - r * r * r * r, 0.0, 1.0);
        falloff = falloff * cutoff * cutoff;
    }
    return falloff;
}

// Tangent frame from screen-space derivatives; meshes carry no tangents.
fn perturb_normal(n: vec3<f32>, p: vec3<f32>, uv: vec2<f32>, tangent_normal: vec3<f32>) -> vec3<f32> {
    let dp1 = dpdx(p);
    let dp2 = dpdy(p);
    let duv1 = dpdx(uv);
    let duv2 = dpdy(uv);
    let dp2perp = cross(dp2, n);
    let dp1perp = cross(n, dp1);
    let t = dp2perp * duv1.x + dp1perp * duv2.x;
    let b = dp2perp * duv1.y + dp1perp * duv2.y;
    let len2 = max(dot(t, t), dot(b, b));
    let scale = inverseSqrt(max(len2, 1e-20));
    let mapped = normalize(mat3x3<f32>(t * scale, b * scale, n) * tangent_normal);
    return select(n, mapped, len2 > 1e-20);
}

fn shadow_factor(world_position: vec3<f32>, n: vec3<f32>) -> f32 {
    let clip = frame.shadow_view_proj * vec4<f32>(world_position + n * frame.shadow_normal_bias, 1.0);
    if (clip.w <= 0.0) {
        return 1.0;
    }
    let ndc = clip.xyz / clip.w;
    let uv = ndc.xy * vec2<f32>(0.5, -0.5) + vec2<f32>(0.5);
    let depth = ndc.z + frame.shadow_bias;
    if (any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0)) || depth > 1.0) {
        return 1.0;
    }

    var lit = 0.0;
    for (var y = -1; y <= 1; y++) {
        for (var x = -1; x <= 1; x++) {
            let offset = vec2<f32>(f32(x), f32(y)) * frame.shadow_texel;
            lit += textureSampleCompareLevel(shadow_map, shadow_sampler, uv + offset, depth);
        }
    }
    return lit / 9.0;
}

fn ggx_distribution(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * denom * denom);
}

fn smith_visibility(n_dot_l: f32, n_dot_v: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let gl = n_dot_v * (n_dot_l * (1.0 - a) + a);
    let gv = n_dot_l * (n_dot_v * (1.0 - a) + a);
    return 0.5 / max(gl + gv, 0.0001);
}

fn fresnel_schlick(v_dot_h: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (vec3<f32>(1.0) - f0) * pow(1.0 - v_dot_h, 5.0);
}

fn aces_filmic(color: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return clamp((color * (a * color + b)) / (color * (c * color + d) + e), vec3<f32>(0.0), vec3<f32>(1.0));
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let albedo = textureSample(color_map, material_sampler, in.uv).rgb;
    let encoded_normal = textureSample(normal_map, material_sampler, in.uv).xyz * 2.0 - 1.0;
    let roughness_sample = textureSample(roughness_map, material_sampler, in.uv).g;
    let occlusion = textureSample(occlusion_map, material_sampler, in.uv).r;

    let geometric_normal = normalize(in.normal);
    // OpenGL-style maps: +Y points up the image, our V runs down it.
    let tangent_normal = vec3<f32>(encoded_normal.x, -encoded_normal.y, encoded_normal.z);
    let n = perturb_normal(geometric_normal, in.world_position, in.uv, tangent_normal);
    let v = normalize(frame.camera_position - in.world_position);

    let to_light = frame.spot_position - in.world_position;
    let d = length(to_light);
    let l = to_light / max(d, 0.0001);
    let h = normalize(l + v);

    let cone = smoothstep(frame.spot_cos_outer, frame.spot_cos_inner, dot(-l, frame.spot_direction));
    let shadow = mix(1.0, shadow_factor(in.world_position, geometric_normal), object.receive_shadow);
    let radiance = frame.spot_color * frame.spot_intensity * distance_falloff(d) * cone * shadow;

    let roughness = clamp(object.roughness * roughness_sample, 0.04, 1.0);
    let n_dot_l = max(dot(n, l), 0.0);
    let n_dot_v = max(dot(n, v), 0.0001);
    let n_dot_h = max(dot(n, h), 0.0);
    let v_dot_h = max(dot(v, h), 0.0);

    let f = fresnel_schlick(v_dot_h, vec3<f32>(0.04));
    let specular = f * ggx_distribution(n_dot_h, roughness) * smith_visibility(n_dot_l, n_dot_v, roughness);
    let diffuse = (vec3<f32>(1.0) - f) * albedo / PI;

    let direct = (diffuse + specular) * radiance * n_dot_l;
    let ambient = albedo * frame.ambient_color * frame.ambient_intensity * occlusion;

    let color = aces_filmic((direct + ambient) * frame.exposure);
    return vec4<f32>(color, 1.0);
}
"#;

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

// Uniforms plus the four surface maps of one drawable.
struct Material {
    uniform_buffer: wgpu::Buffer,
    maps: [wgpu::Texture; 4],
    bind_group: wgpu::BindGroup,
}

pub struct Renderer {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub window: Arc<Window>,
    depth_view: wgpu::TextureView,
    pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    shadow_view: wgpu::TextureView,
    shadow_bind_group: wgpu::BindGroup,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    material_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    ground_mesh: GpuMesh,
    ground_material: Material,
    ball_mesh: Option<GpuMesh>,
    ball_material: Material,
    fatal: bool,
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> Result<Renderer, RendererError> {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                    backends: wgpu::Backends::BROWSER_WEBGPU,
                    ..Default::default()
                });
                let limits = wgpu::Limits::downlevel_webgl2_defaults();
            } else {
                let instance = wgpu::Instance::default();
                let limits = wgpu::Limits::default();
            }
        }
        let size = window.inner_size();

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await?;

        let info = adapter.get_info();
        log::info!("Selected GPU: {} ({:?}, {:?})", info.name, info.device_type, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("wscene device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::default(),
                trace: Default::default(),
            })
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = *caps.formats.first().ok_or(RendererError::NoSurfaceFormat)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![surface_format.add_srgb_suffix()],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_view = Self::create_depth_view(&device, &config);

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let map_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                map_entry(1),
                map_entry(2),
                map_entry(3),
                map_entry(4),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shadow_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let shadow_view = Self::create_shadow_view(&device, ShadowSettings::default().map_size);
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let shadow_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Bind Group"),
            layout: &shadow_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&shadow_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&shadow_sampler),
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(SCENE_SHADER.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&frame_layout, &material_layout, &shadow_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format.add_srgb_suffix(),
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let shadow_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shadow Pipeline Layout"),
            bind_group_layouts: &[&frame_layout, &material_layout],
            push_constant_ranges: &[],
        });

        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Pipeline"),
            layout: Some(&shadow_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_shadow"),
                buffers: &[Vertex::desc()],
                compilation_options: Default::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SHADOW_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let ground_mesh = Self::upload_mesh(&device, &mesh::plane(), "Ground");
        let ground_material = Self::create_material(&device, &queue, &material_layout, &sampler, "Ground");
        let ball_material = Self::create_material(&device, &queue, &material_layout, &sampler, "Ball");

        Ok(Self {
            surface,
            device,
            queue,
            config,
            window,
            depth_view,
            pipeline,
            shadow_pipeline,
            shadow_view,
            shadow_bind_group,
            frame_buffer,
            frame_bind_group,
            material_layout,
            sampler,
            ground_mesh,
            ground_material,
            ball_mesh: None,
            ball_material,
            fatal: false,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        depth_texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn create_shadow_view(device: &wgpu::Device, map_size: u32) -> wgpu::TextureView {
        let shadow_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow Map"),
            size: wgpu::Extent3d {
                width: map_size,
                height: map_size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        shadow_texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn upload_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> GpuMesh {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        GpuMesh {
            vertex_buffer,
            index_buffer,
            num_indices: mesh.indices.len() as u32,
        }
    }

    fn upload_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        map: TextureMap,
        data: &TextureData,
        label: &str,
    ) -> wgpu::Texture {
        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let format = if map.is_srgb() {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{label} {map:?} Map")),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * data.width),
                rows_per_image: Some(data.height),
            },
            size,
        );
        texture
    }

    fn material_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        uniform_buffer: &wgpu::Buffer,
        maps: &[wgpu::Texture; 4],
        label: &str,
    ) -> wgpu::BindGroup {
        let views = maps.each_ref().map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()));
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label} Material Bind Group")),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&views[TextureMap::Color.index()]),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&views[TextureMap::Normal.index()]),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&views[TextureMap::Roughness.index()]),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&views[TextureMap::Occlusion.index()]),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn create_material(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        label: &str,
    ) -> Material {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} Object Uniforms")),
            size: std::mem::size_of::<ObjectUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let maps = TextureMap::ALL.map(|map| Self::upload_texture(device, queue, map, &map.fallback(), label));
        let bind_group = Self::material_bind_group(device, layout, sampler, &uniform_buffer, &maps, label);
        Material {
            uniform_buffer,
            maps,
            bind_group,
        }
    }

    /// Upload the ball geometry once its asset resolves.
    pub fn set_ball_mesh(&mut self, mesh: &MeshData) {
        self.ball_mesh = Some(Self::upload_mesh(&self.device, mesh, "Ball"));
    }

    /// Swap one decoded map into the given drawable's material.
    pub fn set_texture(&mut self, kind: EntityKind, map: TextureMap, texture: &TextureData) {
        let (label, material) = match kind {
            EntityKind::Ground => ("Ground", &mut self.ground_material),
            EntityKind::Ball => ("Ball", &mut self.ball_material),
        };
        material.maps[map.index()] = Self::upload_texture(&self.device, &self.queue, map, texture, label);
        material.bind_group = Self::material_bind_group(
            &self.device,
            &self.material_layout,
            &self.sampler,
            &material.uniform_buffer,
            &material.maps,
            label,
        );
    }

    fn drawable(&self, kind: EntityKind) -> Option<(&GpuMesh, &Material)> {
        match kind {
            EntityKind::Ground => Some((&self.ground_mesh, &self.ground_material)),
            EntityKind::Ball => self.ball_mesh.as_ref().map(|mesh| (mesh, &self.ball_material)),
        }
    }

    pub fn render(&mut self, camera: &Camera, scene: &Scene) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(self.config.format.add_srgb_suffix()),
            ..Default::default()
        });

        self.queue.write_buffer(
            &self.frame_buffer,
            0,
            bytemuck::cast_slice(&[FrameUniforms::new(camera, scene)]),
        );
        for entity in scene.entities() {
            let material = match entity.kind {
                EntityKind::Ground => &self.ground_material,
                EntityKind::Ball => &self.ball_material,
            };
            let uniforms = ObjectUniforms::new(entity);
            self.queue.write_buffer(&material.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        {
            let mut shadow_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            shadow_pass.set_pipeline(&self.shadow_pipeline);
            shadow_pass.set_bind_group(0, &self.frame_bind_group, &[]);

            for entity in scene.entities().iter().filter(|e| e.cast_shadow) {
                let Some((mesh, material)) = self.drawable(entity.kind) else {
                    continue;
                };
                shadow_pass.set_bind_group(1, &material.bind_group, &[]);
                shadow_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                shadow_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                shadow_pass.draw_indexed(0..mesh.num_indices, 0, 0..1);
            }
        }

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.frame_bind_group, &[]);
            render_pass.set_bind_group(2, &self.shadow_bind_group, &[]);

            for entity in scene.entities() {
                let Some((mesh, material)) = self.drawable(entity.kind) else {
                    continue;
                };
                render_pass.set_bind_group(1, &material.bind_group, &[]);
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.num_indices, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        output.present();

        Ok(())
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
        self.depth_view = Self::create_depth_view(&self.device, &self.config);
    }
}

impl RenderDriver for Renderer {
    fn draw(&mut self, camera: &Camera, scene: &Scene) {
        match self.render(camera, scene) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, reconfiguring...");
                self.reconfigure();
            }
            Err(wgpu::SurfaceError::Timeout) => log::warn!("Surface timeout, skipping frame"),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of GPU memory");
                self.fatal = true;
            }
            Err(e) => log::error!("render error: {e:?}"),
        }
    }

    fn is_fatal(&self) -> bool {
        self.fatal
    }
}

impl RenderOutput for Renderer {
    fn resize_output(&mut self, size: OutputSize) {
        let max = self.device.limits().max_texture_dimension_2d;
        self.config.width = size.width.clamp(1, max);
        self.config.height = size.height.clamp(1, max);
        self.reconfigure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Transform;

    #[test]
    fn test_uniform_sizes_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 240);
        assert_eq!(std::mem::size_of::<ObjectUniforms>(), 144);
    }

    #[test]
    fn test_frame_uniforms_follow_scene() {
        let mut scene = Scene::new();
        scene.spot.color = [1.0, 0.5, 0.0];
        let camera = Camera::new(1.5);
        let uniforms = FrameUniforms::new(&camera, &scene);
        assert_eq!(uniforms.spot_color, [1.0, 0.5, 0.0]);
        assert_eq!(uniforms.view_proj, camera.view_proj().to_cols_array_2d());
        assert!(uniforms.spot_cos_inner >= uniforms.spot_cos_outer);
        assert_eq!(uniforms.shadow_view_proj, scene.spot.shadow_view_proj().to_cols_array_2d());
        assert_eq!(uniforms.shadow_bias, -0.0006);
        assert_eq!(uniforms.shadow_texel, 1.0 / 2048.0);
    }

    #[test]
    fn test_object_uniforms_follow_entity() {
        let mut scene = Scene::new();
        scene.attach_ball(Transform::default());

        let ground = ObjectUniforms::new(scene.ground());
        assert_eq!(ground.uv_repeat, [4.0, 4.0]);
        assert_eq!(ground.roughness, 1.0);
        assert_eq!(ground.receive_shadow, 1.0);

        let ball = ObjectUniforms::new(scene.ball().expect("attached"));
        assert_eq!(ball.normal_matrix, Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(ball.uv_repeat, [1.0, 1.0]);
        assert_eq!(ball.receive_shadow, 0.0);
    }
}
