//! Loading models and environments from external files.
//!
//! Parsing is split from uploading: [`parse_glb`] and [`parse_gltf`] turn a
//! glTF document into CPU-side [`ModelData`] (which needs no GPU), and the
//! viewer uploads the meshes and materials afterwards. File access is async
//! through tokio; the parsers themselves only see bytes and a URI resolver.

use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use anyhow::Context as _;
use cgmath::{Matrix4, Quaternion, Vector3};
use gltf::animation::util::ReadOutputs;

use crate::{
    data_structures::{
        asset::ModelAsset,
        instance::Instance,
        model::ModelVertex,
        scene_graph::{Aabb, Node, Scene},
    },
    resources::animation::{AnimationClip, Channel, Interpolation, Keyframes, Skin},
    viewer::Entity,
};

pub mod animation;
pub mod mesh;
pub mod texture;

/// Skybox file extensions tried in order.
pub const SKYBOX_EXTENSIONS: [&str; 3] = ["hdr", "png", "jpg"];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid glTF: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("buffer {0} refers to a binary chunk the file does not have")]
    MissingBlob(usize),
    #[error("embedded data URIs are not supported")]
    DataUri,
    #[error("binary glTF refers to external file {0}")]
    ExternalUri(String),
    #[error("buffer {index} holds {actual} bytes, {expected} expected")]
    ShortBuffer {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("side file {0} lies outside the model directory")]
    OutsideAssetDir(String),
    #[error("the file contains no scene")]
    NoScene,
    #[error("primitive {primitive} of mesh {mesh} has no positions")]
    MissingPositions { mesh: usize, primitive: usize },
}

/// An image file still in its encoded form.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    /// Format hint such as `png`; `None` lets the decoder guess.
    pub extension: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PrimitiveData {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub material: usize,
}

#[derive(Clone, Debug)]
pub struct MeshData {
    pub name: String,
    pub primitives: Vec<PrimitiveData>,
}

#[derive(Clone, Debug)]
pub struct MaterialData {
    pub name: String,
    pub base_colour: [f32; 4],
    pub emissive: [f32; 3],
    pub base_colour_image: Option<EncodedImage>,
}

impl MaterialData {
    fn fallback() -> Self {
        Self {
            name: "default".to_string(),
            base_colour: [1.0; 4],
            emissive: [0.0; 3],
            base_colour_image: None,
        }
    }
}

/// A parsed model, ready to be uploaded.
#[derive(Clone, Debug)]
pub struct ModelData {
    pub asset: ModelAsset,
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
}

/// Optional skybox image and the indirect light intensity (lux).
#[derive(Clone, Debug, PartialEq)]
pub struct Environment {
    pub name: String,
    pub skybox: Option<EncodedImage>,
    pub indirect_light_intensity: f32,
}

pub async fn read_asset(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|source| {
        LoadError::Io {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Parses a self-contained binary glTF.
pub fn parse_glb(bytes: &[u8]) -> anyhow::Result<ModelData> {
    let gltf = gltf::Gltf::from_slice(bytes).map_err(LoadError::from)?;
    parse_document(gltf, |uri| Err(LoadError::ExternalUri(uri.to_string()).into()))
}

/// Parses a glTF whose buffers and images are fetched through `resolver`.
///
/// The resolver receives URIs exactly as written in the file (percent
/// decoded), relative to the glTF file.
pub fn parse_gltf<R>(bytes: &[u8], resolver: R) -> anyhow::Result<ModelData>
where
    R: FnMut(&str) -> anyhow::Result<Vec<u8>>,
{
    let gltf = gltf::Gltf::from_slice(bytes).map_err(LoadError::from)?;
    parse_document(gltf, resolver)
}

/// URIs of the buffers and images a glTF file refers to, percent decoded.
pub fn external_uris(bytes: &[u8]) -> anyhow::Result<Vec<String>> {
    let gltf = gltf::Gltf::from_slice(bytes).map_err(LoadError::from)?;
    let buffers = gltf.buffers().filter_map(|b| match b.source() {
        gltf::buffer::Source::Uri(uri) => Some(uri),
        gltf::buffer::Source::Bin => None,
    });
    let images = gltf.images().filter_map(|i| match i.source() {
        gltf::image::Source::Uri { uri, .. } => Some(uri),
        gltf::image::Source::View { .. } => None,
    });
    let mut uris: Vec<String> = buffers
        .chain(images)
        .filter(|uri| !uri.starts_with("data:"))
        .map(decode_uri)
        .collect();
    uris.sort();
    uris.dedup();
    Ok(uris)
}

/// A model file plus every side file it refers to.
#[derive(Debug, Default)]
pub struct ModelFiles {
    pub main: Vec<u8>,
    pub side_files: HashMap<String, Vec<u8>>,
}

impl ModelFiles {
    pub fn resolve(&self, uri: &str) -> anyhow::Result<Vec<u8>> {
        self.side_files
            .get(uri)
            .cloned()
            .with_context(|| format!("{uri} was not read alongside the model"))
    }
}

/// Reads `dir/file_name` and, concurrently, every side file it refers to.
pub async fn read_model_files(dir: &Path, file_name: &str) -> anyhow::Result<ModelFiles> {
    let main = read_asset(&dir.join(file_name)).await?;
    let uris = external_uris(&main)?;
    if let Some(uri) = uris.iter().find(|uri| !stays_inside(uri)) {
        return Err(LoadError::OutsideAssetDir(uri.clone()).into());
    }
    let reads = uris.into_iter().map(|uri| async move {
        let data = read_asset(&dir.join(&uri)).await;
        (uri, data)
    });
    let mut side_files = HashMap::new();
    for (uri, data) in futures::future::join_all(reads).await {
        side_files.insert(uri, data?);
    }
    log::debug!("read {} with {} side files", file_name, side_files.len());
    Ok(ModelFiles { main, side_files })
}

/// Side files are relative paths below the model directory.
fn stays_inside(uri: &str) -> bool {
    Path::new(uri)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Looks for `<dir>/<name>_skybox.{hdr,png,jpg}`. A missing skybox is not an
/// error: the environment then only contributes its indirect light.
pub async fn read_environment(
    dir: &Path,
    name: &str,
    indirect_light_intensity: f32,
) -> anyhow::Result<Environment> {
    let mut skybox = None;
    for ext in SKYBOX_EXTENSIONS {
        let path = dir.join(format!("{name}_skybox.{ext}"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                log::info!("skybox {}", path.display());
                skybox = Some(EncodedImage {
                    bytes,
                    extension: Some(ext.to_string()),
                });
                break;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => return Err(LoadError::Io { path, source }.into()),
        }
    }
    if skybox.is_none() {
        log::warn!("environment {} has no skybox in {}", name, dir.display());
    }
    Ok(Environment {
        name: name.to_string(),
        skybox,
        indirect_light_intensity,
    })
}

fn decode_uri(uri: &str) -> String {
    let bytes = uri.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = (bytes[i] == b'%')
            .then(|| uri.get(i + 1..i + 3))
            .flatten()
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn resolve<R>(resolver: &mut R, uri: &str) -> anyhow::Result<Vec<u8>>
where
    R: FnMut(&str) -> anyhow::Result<Vec<u8>>,
{
    if uri.starts_with("data:") {
        return Err(LoadError::DataUri.into());
    }
    let decoded = decode_uri(uri);
    resolver(&decoded).with_context(|| format!("resolving {decoded}"))
}

fn extension_from_mime(mime_type: &str) -> Option<String> {
    mime_type.split('/').next_back().map(str::to_string)
}

fn parse_document<R>(gltf: gltf::Gltf, mut resolver: R) -> anyhow::Result<ModelData>
where
    R: FnMut(&str) -> anyhow::Result<Vec<u8>>,
{
    let gltf::Gltf { document, mut blob } = gltf;

    // Load buffers
    let mut buffers: Vec<Vec<u8>> = Vec::new();
    for buffer in document.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => blob.take().ok_or(LoadError::MissingBlob(buffer.index()))?,
            gltf::buffer::Source::Uri(uri) => resolve(&mut resolver, uri)?,
        };
        if data.len() < buffer.length() {
            return Err(LoadError::ShortBuffer {
                index: buffer.index(),
                expected: buffer.length(),
                actual: data.len(),
            }
            .into());
        }
        buffers.push(data);
    }

    // Load materials
    let mut materials = Vec::new();
    for material in document.materials() {
        let pbr = material.pbr_metallic_roughness();
        let name = material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material {}", materials.len()));
        let base_colour_image = match pbr.base_color_texture() {
            Some(info) => match read_image(info.texture().source(), &buffers, &mut resolver) {
                Ok(image) => Some(image),
                Err(e) => {
                    log::warn!("base colour of {name} unavailable, using a plain colour: {e:#}");
                    None
                }
            },
            None => None,
        };
        materials.push(MaterialData {
            name,
            base_colour: pbr.base_color_factor(),
            emissive: material.emissive_factor(),
            base_colour_image,
        });
    }
    let fallback_material = materials.len();
    let mut needs_fallback = false;

    // Load meshes
    let mut meshes = Vec::new();
    let mut mesh_bounds = Vec::new();
    let mut mesh_materials = Vec::new();
    for mesh in document.meshes() {
        let mut primitives = Vec::new();
        let mut bounds: Option<Aabb> = None;
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "skipping {:?} primitive {} of mesh {}",
                    primitive.mode(),
                    primitive.index(),
                    mesh.index()
                );
                continue;
            }
            let reader = primitive.reader(|b| buffers.get(b.index()).map(Vec::as_slice));
            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or(LoadError::MissingPositions {
                    mesh: mesh.index(),
                    primitive: primitive.index(),
                })?
                .collect();
            let normals: Vec<[f32; 3]> = reader.read_normals().map(Iterator::collect).unwrap_or_default();
            let tex_coords: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map(|t| t.into_f32().collect())
                .unwrap_or_default();
            let joints: Vec<[u16; 4]> = reader
                .read_joints(0)
                .map(|j| j.into_u16().collect())
                .unwrap_or_default();
            let weights: Vec<[f32; 4]> = reader
                .read_weights(0)
                .map(|w| w.into_f32().collect())
                .unwrap_or_default();

            let vertices: Vec<ModelVertex> = positions
                .iter()
                .enumerate()
                .map(|(i, &position)| ModelVertex {
                    position,
                    normal: normals.get(i).copied().unwrap_or([0.0, 0.0, 1.0]),
                    tex_coords: tex_coords.get(i).copied().unwrap_or_default(),
                    joints: joints.get(i).map(|j| j.map(u32::from)).unwrap_or_default(),
                    weights: weights.get(i).copied().unwrap_or_default(),
                })
                .collect();
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..vertices.len() as u32).collect(),
            };

            if let Some(b) = points_bounds(&positions) {
                bounds = Some(bounds.map_or(b, |acc| acc.union(&b)));
            }
            let material = primitive.material().index().unwrap_or_else(|| {
                needs_fallback = true;
                fallback_material
            });
            primitives.push(PrimitiveData {
                vertices,
                indices,
                material,
            });
        }
        mesh_materials.push(primitives.iter().map(|p| p.material).collect());
        mesh_bounds.push(bounds.unwrap_or_else(|| Aabb::new([0.0; 3], [0.0; 3])));
        meshes.push(MeshData {
            name: mesh
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("mesh {}", mesh.index())),
            primitives,
        });
    }
    if needs_fallback {
        materials.push(MaterialData::fallback());
    }

    // Load nodes
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(LoadError::NoScene)?;
    let mut graph = Scene::new();
    let mut entities: Vec<Option<Entity>> = vec![None; document.nodes().len()];
    for node in scene.nodes() {
        add_subtree(&mut graph, Entity::ROOT, node, &meshes, &mut entities);
    }

    // Load animations
    let mut animations = Vec::new();
    for animation in document.animations() {
        let mut channels = Vec::new();
        for channel in animation.channels() {
            let node = channel.target().node().index();
            let Some(target) = entities.get(node).copied().flatten() else {
                log::warn!("animation channel targets node {node} outside the scene");
                continue;
            };
            let interpolation = match channel.sampler().interpolation() {
                gltf::animation::Interpolation::Linear => Interpolation::Linear,
                gltf::animation::Interpolation::Step => Interpolation::Step,
                gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
            };
            let reader = channel.reader(|b| buffers.get(b.index()).map(Vec::as_slice));
            let timestamps: Vec<f32> = reader.read_inputs().map(Iterator::collect).unwrap_or_default();
            let keyframes = match reader.read_outputs() {
                Some(ReadOutputs::Translations(t)) => Keyframes::Translation(spline_values(
                    t.map(Vector3::from).collect(),
                    interpolation,
                )),
                Some(ReadOutputs::Rotations(r)) => Keyframes::Rotation(spline_values(
                    r.into_f32()
                        .map(|[x, y, z, w]| Quaternion::new(w, x, y, z))
                        .collect(),
                    interpolation,
                )),
                Some(ReadOutputs::Scales(s)) => Keyframes::Scale(spline_values(
                    s.map(Vector3::from).collect(),
                    interpolation,
                )),
                Some(ReadOutputs::MorphTargetWeights(_)) | None => Keyframes::Other,
            };
            channels.push(Channel {
                target,
                interpolation,
                timestamps,
                keyframes,
            });
        }
        let name = animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("animation {}", animation.index()));
        animations.push(AnimationClip::new(name, channels));
    }

    // Load skins
    let skins = document
        .skins()
        .map(|skin| {
            let reader = skin.reader(|b| buffers.get(b.index()).map(Vec::as_slice));
            let inverse_bind_matrices = reader
                .read_inverse_bind_matrices()
                .map(|m| m.map(Matrix4::from).collect())
                .unwrap_or_default();
            let joints = skin
                .joints()
                .map(|joint| {
                    entities.get(joint.index()).copied().flatten().unwrap_or_else(|| {
                        log::warn!("joint {} is not part of the scene", joint.index());
                        Entity::ROOT
                    })
                })
                .collect();
            Skin {
                name: skin.name().map(str::to_string),
                joints,
                inverse_bind_matrices,
            }
        })
        .collect();

    let emissive = materials.iter().map(|m| m.emissive).collect();
    let asset = ModelAsset::new(graph, mesh_bounds, mesh_materials, emissive, animations, skins);
    log::info!(
        "parsed glTF: {} nodes, {} meshes, {} materials, {} animations",
        asset.scene().len(),
        meshes.len(),
        materials.len(),
        asset.animations().len()
    );
    Ok(ModelData {
        asset,
        meshes,
        materials,
    })
}

fn add_subtree(
    graph: &mut Scene,
    parent: Entity,
    node: gltf::Node,
    meshes: &[MeshData],
    entities: &mut [Option<Entity>],
) {
    let mut data = Node::new(
        node.name().map(str::to_string),
        Instance::from(node.transform().decomposed()),
    );
    // meshes without triangle primitives draw nothing and have no bounds
    data.mesh = node
        .mesh()
        .map(|m| m.index())
        .filter(|&i| meshes.get(i).is_some_and(|m| !m.primitives.is_empty()));
    data.skin = node.skin().map(|s| s.index());
    let entity = graph.add_node(parent, data);
    if let Some(slot) = entities.get_mut(node.index()) {
        *slot = Some(entity);
    }
    for child in node.children() {
        add_subtree(graph, entity, child, meshes, entities);
    }
}

fn read_image<R>(
    image: gltf::Image,
    buffers: &[Vec<u8>],
    resolver: &mut R,
) -> anyhow::Result<EncodedImage>
where
    R: FnMut(&str) -> anyhow::Result<Vec<u8>>,
{
    match image.source() {
        gltf::image::Source::View { view, mime_type } => {
            let index = view.buffer().index();
            let buffer = buffers.get(index).ok_or(LoadError::MissingBlob(index))?;
            let end = view.offset() + view.length();
            let bytes = buffer
                .get(view.offset()..end)
                .ok_or(LoadError::ShortBuffer {
                    index,
                    expected: end,
                    actual: buffer.len(),
                })?
                .to_vec();
            Ok(EncodedImage {
                bytes,
                extension: extension_from_mime(mime_type),
            })
        }
        gltf::image::Source::Uri { uri, mime_type } => {
            let bytes = resolve(resolver, uri)?;
            let extension = mime_type.and_then(extension_from_mime).or_else(|| {
                Path::new(uri)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_string)
            });
            Ok(EncodedImage { bytes, extension })
        }
    }
}

/// Cubic-spline outputs store in-tangent, value, out-tangent per keyframe;
/// only the values are kept.
fn spline_values<T: Copy>(values: Vec<T>, interpolation: Interpolation) -> Vec<T> {
    match interpolation {
        Interpolation::CubicSpline => values.chunks_exact(3).map(|c| c[1]).collect(),
        _ => values,
    }
}

fn points_bounds(points: &[[f32; 3]]) -> Option<Aabb> {
    let (first, rest) = points.split_first()?;
    Some(rest.iter().fold(Aabb::new(*first, *first), |acc, p| {
        acc.union(&Aabb::new(*p, *p))
    }))
}
