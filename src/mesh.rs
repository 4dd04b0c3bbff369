use bytemuck::{Pod, Zeroable};
use std::f32::consts::{PI, TAU};

pub const SPHERE_SEGMENTS: u32 = 64;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: (std::mem::size_of::<[f32; 3]>() * 2) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// CPU-side indexed triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Largest distance of any vertex from the origin.
    pub fn bounding_radius(&self) -> f32 {
        self.vertices
            .iter()
            .map(|v| glam::Vec3::from(v.position).length())
            .fold(0.0, f32::max)
    }

    /// Scale positions so the mesh fits a sphere of `radius`.
    pub fn normalize_radius(&mut self, radius: f32) {
        let current = self.bounding_radius();
        if current <= f32::EPSILON {
            return;
        }
        let k = radius / current;
        for v in &mut self.vertices {
            for c in &mut v.position {
                *c *= k;
            }
        }
    }
}

/// UV sphere with `width_segments` around and `height_segments` pole to pole.
pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let width_segments = width_segments.max(3);
    let height_segments = height_segments.max(2);
    let mut vertices = Vec::with_capacity(((width_segments + 1) * (height_segments + 1)) as usize);
    let mut indices = Vec::with_capacity((width_segments * height_segments * 6) as usize);

    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        let (sin_theta, cos_theta) = (v * PI).sin_cos();
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            let (sin_phi, cos_phi) = (u * TAU).sin_cos();
            let normal = [-cos_phi * sin_theta, cos_theta, sin_phi * sin_theta];
            vertices.push(Vertex {
                position: [normal[0] * radius, normal[1] * radius, normal[2] * radius],
                normal,
                uv: [u, v],
            });
        }
    }

    let row = width_segments + 1;
    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = iy * row + ix + 1;
            let b = iy * row + ix;
            let c = (iy + 1) * row + ix;
            let d = (iy + 1) * row + ix + 1;
            // The pole rows collapse to points; skip their degenerate triangles.
            if iy != 0 {
                indices.extend_from_slice(&[a, b, d]);
            }
            if iy != height_segments - 1 {
                indices.extend_from_slice(&[b, c, d]);
            }
        }
    }

    MeshData { vertices, indices }
}

/// Unit square in the XY plane facing +Z, centered on the origin.
pub fn plane() -> MeshData {
    let normal = [0.0, 0.0, 1.0];
    let vertices = vec![
        Vertex { position: [-0.5, -0.5, 0.0], normal, uv: [0.0, 1.0] },
        Vertex { position: [0.5, -0.5, 0.0], normal, uv: [1.0, 1.0] },
        Vertex { position: [0.5, 0.5, 0.0], normal, uv: [1.0, 0.0] },
        Vertex { position: [-0.5, 0.5, 0.0], normal, uv: [0.0, 0.0] },
    ];
    let indices = vec![0, 1, 2, 2, 3, 0];
    MeshData { vertices, indices }
}
