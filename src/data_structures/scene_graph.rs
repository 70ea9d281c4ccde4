//! Scene graph of one loaded model.
//!
//! Nodes live in a flat arena indexed by their [`Entity`] number. Node 0 is the
//! synthetic asset root; the roots of the loaded glTF scene hang below it, so
//! transforming node 0 moves the whole model. Each node keeps its rest pose
//! (the decomposed transform from the file, which animation channels overwrite
//! component-wise) and its current local matrix (which anyone may overwrite).

use cgmath::{Matrix4, SquareMatrix, Vector3, Vector4};
use log::warn;

use crate::{data_structures::instance::Instance, viewer::Entity};

#[derive(Clone, Debug)]
pub struct Node {
    pub name: Option<String>,
    /// Decomposed transform from the file; animation samples start from it.
    pub rest: Instance,
    pub local: Matrix4<f32>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub visible: bool,
}

impl Node {
    pub fn new(name: Option<String>, rest: Instance) -> Self {
        Self {
            name,
            local: rest.to_matrix(),
            rest,
            parent: None,
            children: Vec::new(),
            mesh: None,
            skin: None,
            visible: true,
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn new(min: impl Into<Vector3<f32>>, max: impl Into<Vector3<f32>>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    pub fn half_extent(&self) -> Vector3<f32> {
        (self.max - self.min) * 0.5
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: Vector3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Vector3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Bounds of the eight corners after `transform`.
    pub fn transformed(&self, transform: &Matrix4<f32>) -> Aabb {
        let corners = (0..8).map(|i| {
            let pick = |bit: u32, lo: f32, hi: f32| if i & bit == 0 { lo } else { hi };
            let corner = Vector4::new(
                pick(1, self.min.x, self.max.x),
                pick(2, self.min.y, self.max.y),
                pick(4, self.min.z, self.max.z),
                1.0,
            );
            (*transform * corner).truncate()
        });
        corners.fold(None, |acc: Option<Aabb>, p| {
            let point = Aabb { min: p, max: p };
            Some(match acc {
                Some(acc) => acc.union(&point),
                None => point,
            })
        })
        .unwrap_or(*self)
    }
}

/// Root transform that scales the model to fit a 2-unit cube centred at
/// `centre_point`.
///
/// `scale(s) · translate(-(c - p / s))` with `s = 2 / max_extent`. Degenerate
/// (empty or flat-point) bounds leave the model unscaled.
pub fn unit_cube_transform(bounds: &Aabb, centre_point: Vector3<f32>) -> Matrix4<f32> {
    let half = bounds.half_extent();
    let max_extent = 2.0 * half.x.max(half.y).max(half.z);
    let scale = if max_extent > f32::EPSILON {
        2.0 / max_extent
    } else {
        1.0
    };
    let center = bounds.center() - centre_point / scale;
    Matrix4::from_scale(scale) * Matrix4::from_translation(-center)
}

#[derive(Clone, Debug)]
pub struct Scene {
    nodes: Vec<Node>,
    world: Vec<Matrix4<f32>>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(None, Instance::default())],
            world: vec![Matrix4::identity()],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // the root always exists
        false
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        (0..self.nodes.len()).map(Entity)
    }

    /// Adds `node` below `parent` and returns its entity.
    pub fn add_node(&mut self, parent: Entity, mut node: Node) -> Entity {
        let idx = self.nodes.len();
        let parent = if parent.0 < idx {
            parent.0
        } else {
            warn!("parent {} does not exist, attaching node {} to the root", parent.0, idx);
            0
        };
        node.parent = Some(parent);
        let world = self.world[parent] * node.local;
        self.nodes.push(node);
        self.world.push(world);
        self.nodes[parent].children.push(idx);
        Entity(idx)
    }

    pub fn node(&self, entity: Entity) -> Option<&Node> {
        self.nodes.get(entity.0)
    }

    pub fn node_mut(&mut self, entity: Entity) -> Option<&mut Node> {
        self.nodes.get_mut(entity.0)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn local_transform(&self, entity: Entity) -> Option<Matrix4<f32>> {
        self.nodes.get(entity.0).map(|node| node.local)
    }

    pub fn set_local_transform(&mut self, entity: Entity, transform: Matrix4<f32>) {
        match self.nodes.get_mut(entity.0) {
            Some(node) => node.local = transform,
            None => warn!(
                "You tried to transform entity {}, but there are only {} nodes.",
                entity.0,
                self.nodes.len()
            ),
        }
    }

    /// World transform as of the last [`update_world_transforms`](Self::update_world_transforms).
    pub fn world_transform(&self, entity: Entity) -> Option<Matrix4<f32>> {
        self.world.get(entity.0).copied()
    }

    /// Recomputes every world transform from the local transforms, parents
    /// before children.
    pub fn update_world_transforms(&mut self) {
        let mut stack = vec![(0usize, Matrix4::identity())];
        while let Some((idx, parent_world)) = stack.pop() {
            let world = parent_world * self.nodes[idx].local;
            self.world[idx] = world;
            stack.extend(self.nodes[idx].children.iter().map(|&child| (child, world)));
        }
    }

    /// Bounds of every meshed node, in the root's frame, for the current pose.
    ///
    /// `mesh_bounds[i]` are the object-space bounds of mesh `i`.
    pub fn bounds(&self, mesh_bounds: &[Aabb]) -> Option<Aabb> {
        let mut stack = vec![(0usize, Matrix4::identity())];
        let mut bounds: Option<Aabb> = None;
        while let Some((idx, parent)) = stack.pop() {
            let node = &self.nodes[idx];
            // The root's own transform is what the unit-cube fit rewrites.
            let transform = if idx == 0 { parent } else { parent * node.local };
            if let Some(mesh_box) = node.mesh.and_then(|mesh| mesh_bounds.get(mesh)) {
                let b = mesh_box.transformed(&transform);
                bounds = Some(match bounds {
                    Some(acc) => acc.union(&b),
                    None => b,
                });
            }
            stack.extend(node.children.iter().map(|&child| (child, transform)));
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vector3<f32>, b: Vector3<f32>) -> bool {
        (a - b).x.abs() < 1e-5 && (a - b).y.abs() < 1e-5 && (a - b).z.abs() < 1e-5
    }

    #[test]
    fn unit_cube_scales_the_longest_side_to_two() {
        let bounds = Aabb::new([0.0, 0.0, 0.0], [4.0, 2.0, 1.0]);
        let fit = unit_cube_transform(&bounds, Vector3::new(0.0, 0.0, -4.0));
        let fitted = bounds.transformed(&fit);
        assert!(approx(fitted.min, Vector3::new(-1.0, -0.5, -4.25)), "{fitted:?}");
        assert!(approx(fitted.max, Vector3::new(1.0, 0.5, -3.75)), "{fitted:?}");
    }

    #[test]
    fn flat_bounds_are_only_moved() {
        let point = Aabb::new([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]);
        let fit = unit_cube_transform(&point, Vector3::new(0.0, 0.0, -4.0));
        assert!(approx(point.transformed(&fit).center(), Vector3::new(0.0, 0.0, -4.0)));
    }

    #[test]
    fn world_transforms_compose_parents_first() {
        let mut scene = Scene::new();
        let parent = scene.add_node(
            Entity::ROOT,
            Node::new(None, Vector3::new(1.0, 0.0, 0.0).into()),
        );
        let child = scene.add_node(parent, Node::new(None, Vector3::new(0.0, 2.0, 0.0).into()));
        scene.set_local_transform(Entity::ROOT, Matrix4::from_scale(2.0));
        scene.update_world_transforms();

        let origin = scene.world_transform(child).unwrap() * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert!(approx(origin.truncate(), Vector3::new(2.0, 4.0, 0.0)));
        assert_eq!(scene.node(parent).unwrap().children, vec![child.0]);
    }

    #[test]
    fn bounds_ignore_the_root_transform() {
        let mut scene = Scene::new();
        let mut node = Node::new(None, Vector3::new(0.0, 0.0, 3.0).into());
        node.mesh = Some(0);
        scene.add_node(Entity::ROOT, node);
        scene.set_local_transform(Entity::ROOT, Matrix4::from_scale(10.0));

        let unit = Aabb::new([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]);
        let bounds = scene.bounds(&[unit]).unwrap();
        assert!(approx(bounds.min, Vector3::new(-1.0, -1.0, 2.0)));
        assert!(approx(bounds.max, Vector3::new(1.0, 1.0, 4.0)));
        assert!(Scene::new().bounds(&[unit]).is_none());
    }

    #[test]
    fn unknown_parents_attach_to_the_root() {
        let mut scene = Scene::new();
        let node = scene.add_node(Entity(9), Node::new(Some("stray".into()), Instance::default()));
        assert_eq!(scene.node(node).unwrap().parent, Some(0));
    }
}
