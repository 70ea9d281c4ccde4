use std::{cell::RefCell, rc::Rc};

use arjesus::{
    Matrix4, Vector3,
    data_structures::asset::ModelAsset,
    viewer::{Animator, Asset, Entity, ModelViewer},
};

/// What a [`MockViewer`] was asked to do, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Animate(usize, f32),
    Bones,
    Render(u64),
    UnitCube,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// A loaded model that logs every animator call into the viewer's log.
pub struct RecordingModel {
    pub asset: ModelAsset,
    log: CallLog,
}

impl Asset for RecordingModel {
    fn entities(&self) -> Vec<Entity> {
        self.asset.entities()
    }

    fn name(&self, entity: Entity) -> Option<&str> {
        self.asset.name(entity)
    }

    fn is_renderable(&self, entity: Entity) -> bool {
        self.asset.is_renderable(entity)
    }

    fn transform(&self, entity: Entity) -> Matrix4<f32> {
        self.asset.transform(entity)
    }

    fn set_transform(&mut self, entity: Entity, transform: Matrix4<f32>) {
        self.asset.set_transform(entity, transform)
    }

    fn set_visible(&mut self, entity: Entity, visible: bool) {
        self.asset.set_visible(entity, visible)
    }

    fn set_emissive_factor(&mut self, entity: Entity, factor: [f32; 3]) {
        self.asset.set_emissive_factor(entity, factor)
    }
}

impl Animator for RecordingModel {
    fn animation_count(&self) -> usize {
        self.asset.animation_count()
    }

    fn animation_name(&self, index: usize) -> Option<&str> {
        self.asset.animation_name(index)
    }

    fn animation_duration(&self, index: usize) -> Option<f32> {
        self.asset.animation_duration(index)
    }

    fn apply_animation(&mut self, index: usize, seconds: f32) {
        self.log.borrow_mut().push(Call::Animate(index, seconds));
        self.asset.apply_animation(index, seconds)
    }

    fn update_bone_matrices(&mut self) {
        self.log.borrow_mut().push(Call::Bones);
        self.asset.update_bone_matrices()
    }

    fn bone_matrices(&self, skin: usize) -> &[Matrix4<f32>] {
        self.asset.bone_matrices(skin)
    }
}

/// GPU-free [`ModelViewer`] backed by a real [`ModelAsset`].
pub struct MockViewer {
    pub model: Option<RecordingModel>,
    pub centre_point: Vector3<f32>,
    pub fail_render: bool,
    log: CallLog,
}

impl MockViewer {
    pub fn empty() -> Self {
        Self {
            model: None,
            centre_point: Vector3::new(0.0, 0.0, -4.0),
            fail_render: false,
            log: CallLog::default(),
        }
    }

    pub fn with_asset(asset: ModelAsset) -> Self {
        let mut viewer = Self::empty();
        viewer.model = Some(RecordingModel {
            asset,
            log: viewer.log.clone(),
        });
        viewer
    }

    pub fn failing(mut self) -> Self {
        self.fail_render = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn renders(&self) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Render(_)))
            .count()
    }

    pub fn root_transform(&self) -> Option<Matrix4<f32>> {
        self.model
            .as_ref()
            .map(|m| m.asset.transform(m.asset.root()))
    }

    pub fn model_asset(&self) -> &ModelAsset {
        &self.model.as_ref().expect("viewer has no model").asset
    }
}

impl ModelViewer for MockViewer {
    fn render(&mut self, frame_time_nanos: u64) -> anyhow::Result<()> {
        self.log.borrow_mut().push(Call::Render(frame_time_nanos));
        if self.fail_render {
            anyhow::bail!("render failed at {frame_time_nanos}ns");
        }
        Ok(())
    }

    fn transform_to_unit_cube(&mut self) {
        if let Some(model) = self.model.as_mut() {
            self.log.borrow_mut().push(Call::UnitCube);
            model.asset.transform_to_unit_cube(self.centre_point);
        }
    }

    fn asset(&mut self) -> Option<&mut dyn Asset> {
        self.model.as_mut().map(|m| m as &mut dyn Asset)
    }

    fn animator(&mut self) -> Option<&mut dyn Animator> {
        self.model.as_mut().map(|m| m as &mut dyn Animator)
    }
}

pub const SECOND: u64 = 1_000_000_000;

pub fn nanos(seconds: f64) -> u64 {
    (seconds * SECOND as f64).round() as u64
}

pub fn assert_matrix_eq(actual: Matrix4<f32>, expected: Matrix4<f32>) {
    let a: &[f32; 16] = actual.as_ref();
    let e: &[f32; 16] = expected.as_ref();
    for (i, (x, y)) in a.iter().zip(e).enumerate() {
        assert!(
            (x - y).abs() < 1e-4,
            "element {i} differs: {x} vs {y}\nactual:   {actual:?}\nexpected: {expected:?}"
        );
    }
}

/// Name of the node the default configuration hides.
pub const FLOOR_NODE: &str = "Scheibe_Boden_0";

/// A small binary glTF: one triangle mesh `(0,0,0) (2,0,0) (0,1,0)` drawn by
/// `Body` (below the empty `Group`) and by the floor node one unit further
/// along +Z, an emissive material `Glow`, and a two second linear animation
/// `Spin` moving `Body` from the origin to `x = 4`.
///
/// Entities: `Group` = 1, `Body` = 2, floor = 3.
pub fn triangle_glb() -> Vec<u8> {
    glb(&triangle_json(None), &triangle_bin())
}

/// The same model as a `.gltf` whose buffer lives in `uri`.
pub fn triangle_gltf(uri: &str) -> Vec<u8> {
    triangle_json(Some(uri)).into_bytes()
}

pub fn triangle_bin() -> Vec<u8> {
    let mut bin = Vec::with_capacity(76);
    // positions, offset 0
    for v in [0.0f32, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
        bin.extend_from_slice(&v.to_le_bytes());
    }
    // indices, offset 36, padded to 44
    for i in [0u16, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    bin.extend_from_slice(&[0, 0]);
    // keyframe times, offset 44
    for t in [0.0f32, 2.0] {
        bin.extend_from_slice(&t.to_le_bytes());
    }
    // translations, offset 52
    for v in [0.0f32, 0.0, 0.0, 4.0, 0.0, 0.0] {
        bin.extend_from_slice(&v.to_le_bytes());
    }
    assert_eq!(bin.len(), 76);
    bin
}

fn triangle_json(uri: Option<&str>) -> String {
    let buffer = match uri {
        Some(uri) => format!(r#"{{"byteLength":76,"uri":"{uri}"}}"#),
        None => r#"{"byteLength":76}"#.to_string(),
    };
    format!(
        r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"nodes": [0, 2]}}],
  "nodes": [
    {{"name": "Group", "children": [1]}},
    {{"name": "Body", "mesh": 0}},
    {{"name": "{FLOOR_NODE}", "mesh": 0, "translation": [0.0, 0.0, 1.0]}}
  ],
  "meshes": [{{"name": "Triangle", "primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1, "material": 0}}]}}],
  "materials": [{{"name": "Glow", "emissiveFactor": [1.0, 0.5, 0.0]}}],
  "animations": [{{
    "name": "Spin",
    "channels": [{{"sampler": 0, "target": {{"node": 1, "path": "translation"}}}}],
    "samplers": [{{"input": 2, "output": 3, "interpolation": "LINEAR"}}]
  }}],
  "buffers": [{buffer}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 6}},
    {{"buffer": 0, "byteOffset": 44, "byteLength": 8}},
    {{"buffer": 0, "byteOffset": 52, "byteLength": 24}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [2.0, 1.0, 0.0]}},
    {{"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}},
    {{"bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR", "min": [0.0], "max": [2.0]}},
    {{"bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC3"}}
  ]
}}"#
    )
}

/// Packs a JSON and a BIN chunk into a GLB container.
pub fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut json = json.as_bytes().to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin.to_vec();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    let total = 12 + 8 + json.len() + 8 + bin.len();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(b"BIN\0");
    out.extend_from_slice(&bin);
    out
}

/// The triangle model, parsed.
pub fn triangle_asset() -> ModelAsset {
    arjesus::resources::parse_glb(&triangle_glb())
        .expect("triangle glb parses")
        .asset
}
