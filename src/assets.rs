//! Asset loading.
//!
//! Requests are fire-and-forget: bytes are read off the main loop (a worker
//! thread natively, a fetch future on the web), decoded, and handed to a
//! completion sink exactly once. The app's sink forwards the event into the
//! winit loop, so attaching the result happens on the same thread as ticks.

use glam::{Mat4, Vec3};

use crate::mesh::{self, MeshData, Vertex, SPHERE_SEGMENTS};
use crate::scene::EntityKind;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to load glTF: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("model contains no triangle meshes")]
    MissingMesh,

    #[error("primitive is missing {0} data")]
    MissingAttribute(&'static str),
}

/// Decoded RGBA8 image, ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: rgba.to_vec(),
        }
    }

    pub fn white() -> Self {
        Self::solid([255; 4])
    }
}

/// The maps a surface material samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureMap {
    Color,
    Normal,
    Roughness,
    Occlusion,
}

impl TextureMap {
    pub const ALL: [TextureMap; 4] = [
        TextureMap::Color,
        TextureMap::Normal,
        TextureMap::Roughness,
        TextureMap::Occlusion,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Color maps are authored in sRGB, the others hold linear data.
    pub fn is_srgb(self) -> bool {
        self == TextureMap::Color
    }

    /// Neutral 1x1 stand-in, used while the real map loads or after it failed.
    pub fn fallback(self) -> TextureData {
        match self {
            TextureMap::Normal => TextureData::solid([128, 128, 255, 255]),
            _ => TextureData::white(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetSlot {
    BallModel,
    Map { target: EntityKind, map: TextureMap },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssetKind {
    Texture,
    /// glTF/GLB model, rescaled to fit a sphere of the given radius.
    Model { fit_radius: f32 },
    /// Procedural UV sphere. Resolves without touching the network or disk.
    Sphere { radius: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetRequest {
    pub slot: AssetSlot,
    pub path: String,
    pub kind: AssetKind,
}

#[derive(Debug)]
pub enum AssetPayload {
    Texture(TextureData),
    Model {
        mesh: MeshData,
        texture: Option<TextureData>,
    },
}

#[derive(Debug)]
pub struct AssetEvent {
    pub slot: AssetSlot,
    pub path: String,
    pub result: Result<AssetPayload, AssetError>,
}

/// Completion handler for one request. Natively it runs on the loader thread,
/// so it must be `Send`; web futures stay on the page's single thread.
#[cfg(not(target_arch = "wasm32"))]
pub trait AssetSink: FnOnce(AssetEvent) + Send + 'static {}
#[cfg(not(target_arch = "wasm32"))]
impl<F: FnOnce(AssetEvent) + Send + 'static> AssetSink for F {}

#[cfg(target_arch = "wasm32")]
pub trait AssetSink: FnOnce(AssetEvent) + 'static {}
#[cfg(target_arch = "wasm32")]
impl<F: FnOnce(AssetEvent) + 'static> AssetSink for F {}

pub struct AssetLoader {
    root: String,
}

impl AssetLoader {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &str) -> String {
        if self.root.is_empty() || path.is_empty() {
            return path.to_string();
        }
        format!("{}/{}", self.root.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Start loading `request`. `sink` runs once with the outcome.
    pub fn request<S: AssetSink>(&self, request: AssetRequest, sink: S) {
        if let AssetKind::Sphere { radius } = request.kind {
            let mesh = mesh::sphere(radius, SPHERE_SEGMENTS, SPHERE_SEGMENTS);
            sink(AssetEvent {
                slot: request.slot,
                path: request.path,
                result: Ok(AssetPayload::Model { mesh, texture: None }),
            });
            return;
        }

        let url = self.resolve(&request.path);
        log::debug!("loading {url}");

        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                wasm_bindgen_futures::spawn_local(async move {
                    let result = match fetch_bytes(&url).await {
                        Ok(bytes) => decode(&request.kind, &bytes),
                        Err(e) => Err(e),
                    };
                    sink(AssetEvent { slot: request.slot, path: url, result });
                });
            } else {
                std::thread::spawn(move || {
                    let result = std::fs::read(&url)
                        .map_err(|source| AssetError::Io { path: url.clone(), source })
                        .and_then(|bytes| decode(&request.kind, &bytes));
                    sink(AssetEvent { slot: request.slot, path: url, result });
                });
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(url: &str) -> Result<Vec<u8>, AssetError> {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    let fetch_error = |reason: String| AssetError::Fetch { path: url.to_string(), reason };

    let window = web_sys::window().ok_or_else(|| fetch_error("no window".into()))?;
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|e| fetch_error(format!("{e:?}")))?;
    let response: web_sys::Response = response
        .dyn_into()
        .map_err(|_| fetch_error("not a Response".into()))?;
    if !response.ok() {
        return Err(fetch_error(format!("HTTP {}", response.status())));
    }

    let buffer = response.array_buffer().map_err(|e| fetch_error(format!("{e:?}")))?;
    let buffer = JsFuture::from(buffer).await.map_err(|e| fetch_error(format!("{e:?}")))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

fn decode(kind: &AssetKind, bytes: &[u8]) -> Result<AssetPayload, AssetError> {
    match kind {
        AssetKind::Texture => decode_texture(bytes).map(AssetPayload::Texture),
        AssetKind::Model { fit_radius } => {
            let (mut mesh, texture) = decode_model(bytes)?;
            mesh.normalize_radius(*fit_radius);
            Ok(AssetPayload::Model { mesh, texture })
        }
        AssetKind::Sphere { radius } => Ok(AssetPayload::Model {
            mesh: mesh::sphere(*radius, SPHERE_SEGMENTS, SPHERE_SEGMENTS),
            texture: None,
        }),
    }
}

pub fn decode_texture(bytes: &[u8]) -> Result<TextureData, AssetError> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    Ok(TextureData {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

/// Flatten every triangle primitive of a glTF/GLB into one mesh in model space.
/// The first embedded image, if any, comes back as the base color texture.
pub fn decode_model(bytes: &[u8]) -> Result<(MeshData, Option<TextureData>), AssetError> {
    let (document, buffers, images) = gltf::import_slice(bytes)?;
    let mut mesh = MeshData::default();

    for scene in document.scenes() {
        for node in scene.nodes() {
            collect_node(&node, Mat4::IDENTITY, &buffers, &mut mesh)?;
        }
    }

    if mesh.indices.is_empty() {
        return Err(AssetError::MissingMesh);
    }

    let texture = images.into_iter().find_map(image_to_texture);
    log::info!(
        "decoded model: {} vertices, {} triangles, texture: {}",
        mesh.vertices.len(),
        mesh.triangle_count(),
        texture.is_some()
    );
    Ok((mesh, texture))
}

fn collect_node(
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut MeshData,
) -> Result<(), AssetError> {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(node_mesh) = node.mesh() {
        for primitive in node_mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                continue;
            }
            append_primitive(&primitive, world, buffers, out)?;
        }
    }

    for child in node.children() {
        collect_node(&child, world, buffers, out)?;
    }
    Ok(())
}

fn append_primitive(
    primitive: &gltf::Primitive,
    world: Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut MeshData,
) -> Result<(), AssetError> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));

    let positions: Vec<Vec3> = reader
        .read_positions()
        .ok_or(AssetError::MissingAttribute("position"))?
        .map(|p| world.transform_point3(Vec3::from(p)))
        .collect();
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    let normals: Vec<Vec3> = match reader.read_normals() {
        Some(normals) => normals
            .map(|n| world.transform_vector3(Vec3::from(n)).normalize_or_zero())
            .collect(),
        None => smooth_normals(&positions, &indices),
    };
    let uvs: Vec<[f32; 2]> = reader
        .read_tex_coords(0)
        .map(|uv| uv.into_f32().collect())
        .unwrap_or_default();

    let base = out.vertices.len() as u32;
    out.vertices.extend(positions.iter().enumerate().map(|(i, p)| Vertex {
        position: p.to_array(),
        normal: normals.get(i).copied().unwrap_or(Vec3::Y).to_array(),
        uv: uvs.get(i).copied().unwrap_or([0.0, 0.0]),
    }));
    out.indices.extend(indices.iter().map(|i| base + i));
    Ok(())
}

/// Area-weighted vertex normals for primitives that ship without them.
fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (Some(pa), Some(pb), Some(pc)) = (positions.get(a), positions.get(b), positions.get(c)) else {
            continue;
        };
        let face = (*pb - *pa).cross(*pc - *pa);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals.into_iter().map(|n| n.normalize_or(Vec3::Y)).collect()
}

fn image_to_texture(data: gltf::image::Data) -> Option<TextureData> {
    use gltf::image::Format;

    let rgba = match data.format {
        Format::R8G8B8A8 => data.pixels,
        Format::R8G8B8 => data
            .pixels
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
        other => {
            log::warn!("skipping embedded image with unsupported format {other:?}");
            return None;
        }
    };
    Some(TextureData {
        width: data.width,
        height: data.height,
        rgba,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc;

    // One triangle in the XY plane, positions only, embedded as a data URI.
    const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [0.0, 0.0, 2.0] }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "buffers": [{
            "byteLength": 36,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA"
        }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [1.0, 1.0, 0.0]
        }]
    }"#;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).expect("encode png");
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let texture = decode_texture(&png_bytes(3, 2)).expect("decode");
        assert_eq!((texture.width, texture.height), (3, 2));
        assert_eq!(texture.rgba.len(), 3 * 2 * 4);
        assert_eq!(&texture.rgba[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_garbage_texture_is_an_error() {
        let err = decode_texture(b"definitely not an image").unwrap_err();
        assert!(matches!(err, AssetError::Image(_)));
    }

    #[test]
    fn test_decode_model_applies_node_transform() {
        let (mesh, texture) = decode_model(TRIANGLE_GLTF.as_bytes()).expect("decode");
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert!(texture.is_none());
        assert!(mesh.vertices.iter().all(|v| v.position[2] == 2.0));
        // Generated normals face +Z for a counter-clockwise XY triangle.
        assert!(mesh.vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_garbage_model_is_an_error() {
        let err = decode_model(b"{ not gltf").unwrap_err();
        assert!(matches!(err, AssetError::Gltf(_)));
    }

    #[test]
    fn test_sphere_request_resolves_immediately() {
        let loader = AssetLoader::new("static");
        let (tx, rx) = mpsc::channel();
        loader.request(
            AssetRequest {
                slot: AssetSlot::BallModel,
                path: String::new(),
                kind: AssetKind::Sphere { radius: 1.0 },
            },
            move |event| tx.send(event).expect("send"),
        );
        let event = rx.try_recv().expect("resolved synchronously");
        assert_eq!(event.slot, AssetSlot::BallModel);
        assert!(matches!(event.result, Ok(AssetPayload::Model { .. })));
    }

    #[test]
    fn test_missing_file_reports_io_error() {
        let loader = AssetLoader::new("does/not/exist");
        let (tx, rx) = mpsc::channel();
        loader.request(
            AssetRequest {
                slot: AssetSlot::Map {
                    target: EntityKind::Ground,
                    map: TextureMap::Color,
                },
                path: "grass/color.jpg".into(),
                kind: AssetKind::Texture,
            },
            move |event| tx.send(event).expect("send"),
        );
        let event = rx.recv().expect("loader reports back");
        assert_eq!(event.path, "does/not/exist/grass/color.jpg");
        assert!(matches!(event.result, Err(AssetError::Io { .. })));
    }

    #[test]
    fn test_map_fallbacks_are_neutral() {
        assert_eq!(TextureMap::Normal.fallback().rgba, vec![128, 128, 255, 255]);
        assert_eq!(TextureMap::Occlusion.fallback(), TextureData::white());
        assert!(TextureMap::Color.is_srgb());
        assert!(!TextureMap::Roughness.is_srgb());
        for (i, map) in TextureMap::ALL.iter().enumerate() {
            assert_eq!(map.index(), i);
        }
    }

    #[test]
    fn test_resolve_joins_cleanly() {
        let loader = AssetLoader::new("static/");
        assert_eq!(loader.resolve("/models/ball.glb"), "static/models/ball.glb");
        assert_eq!(AssetLoader::new("").resolve("a.png"), "a.png");
    }
}
