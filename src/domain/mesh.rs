//! Finite-element domains owned by a region: two nodesets and one mesh per
//! dimension, with element shapes, face tables and parent links.

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::domain::error::{ZincError, ZincResult};
use crate::domain::labels::{LabelChange, LabelIdentifier, LabelIndex, Labels};

pub const MAXIMUM_ELEMENT_XI_DIMENSIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodesetDomain {
    Nodes,
    Datapoints,
}

impl NodesetDomain {
    pub fn name(self) -> &'static str {
        match self {
            NodesetDomain::Nodes => "nodes",
            NodesetDomain::Datapoints => "datapoints",
        }
    }

    fn slot(self) -> usize {
        match self {
            NodesetDomain::Nodes => 0,
            NodesetDomain::Datapoints => 1,
        }
    }
}

/// Name of the mesh of the given dimension, e.g. `mesh2d`.
pub fn mesh_name(dimension: usize) -> String {
    format!("mesh{}d", dimension)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementShape {
    Line,
    Triangle,
    Square,
    Cube,
}

// Local node numbering runs fastest in xi1, then xi2, then xi3.
const LINE_FACES: [&[usize]; 0] = [];
const TRIANGLE_FACES: [&[usize]; 3] = [&[1, 2], &[0, 2], &[0, 1]];
const SQUARE_FACES: [&[usize]; 4] = [&[0, 2], &[1, 3], &[0, 1], &[2, 3]];
const CUBE_FACES: [&[usize]; 6] = [
    &[0, 2, 4, 6],
    &[1, 3, 5, 7],
    &[0, 1, 4, 5],
    &[2, 3, 6, 7],
    &[0, 1, 2, 3],
    &[4, 5, 6, 7],
];

impl ElementShape {
    pub fn dimension(self) -> usize {
        match self {
            ElementShape::Line => 1,
            ElementShape::Triangle | ElementShape::Square => 2,
            ElementShape::Cube => 3,
        }
    }

    pub fn node_count(self) -> usize {
        match self {
            ElementShape::Line => 2,
            ElementShape::Triangle => 3,
            ElementShape::Square => 4,
            ElementShape::Cube => 8,
        }
    }

    pub fn face_count(self) -> usize {
        self.face_table().len()
    }

    pub fn face_shape(self) -> Option<ElementShape> {
        match self {
            ElementShape::Line => None,
            ElementShape::Triangle | ElementShape::Square => Some(ElementShape::Line),
            ElementShape::Cube => Some(ElementShape::Square),
        }
    }

    /// Local node numbers of face `face_number`, in the face's own node order.
    pub fn face_local_nodes(self, face_number: usize) -> &'static [usize] {
        self.face_table().get(face_number).copied().unwrap_or(&[])
    }

    fn face_table(self) -> &'static [&'static [usize]] {
        match self {
            ElementShape::Line => &LINE_FACES,
            ElementShape::Triangle => &TRIANGLE_FACES,
            ElementShape::Square => &SQUARE_FACES,
            ElementShape::Cube => &CUBE_FACES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Nodeset {
    domain: NodesetDomain,
    labels: Labels,
    /// Number of element node lists referencing each node index.
    element_usage: Vec<usize>,
}

impl Nodeset {
    fn new(domain: NodesetDomain) -> Self {
        Self {
            domain,
            labels: Labels::new(),
            element_usage: Vec::new(),
        }
    }

    pub fn domain(&self) -> NodesetDomain {
        self.domain
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn size(&self) -> usize {
        self.labels.size()
    }

    fn usage(&self, index: LabelIndex) -> usize {
        self.element_usage.get(index).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
struct ElementRecord {
    shape: ElementShape,
    nodes: Vec<LabelIndex>,
    faces: Vec<Option<LabelIndex>>,
    parents: Vec<LabelIndex>,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    dimension: usize,
    labels: Labels,
    elements: Vec<Option<ElementRecord>>,
}

impl Mesh {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            labels: Labels::new(),
            elements: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn name(&self) -> String {
        mesh_name(self.dimension)
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn size(&self) -> usize {
        self.labels.size()
    }

    pub fn element_shape(&self, index: LabelIndex) -> Option<ElementShape> {
        self.record(index).map(|r| r.shape)
    }

    /// Face slots of an element; a slot is `None` until faces are defined.
    pub fn element_faces(&self, index: LabelIndex) -> &[Option<LabelIndex>] {
        self.record(index).map_or(&[], |r| r.faces.as_slice())
    }

    /// Elements of the next higher dimension using this element as a face.
    pub fn element_parents(&self, index: LabelIndex) -> &[LabelIndex] {
        self.record(index).map_or(&[], |r| r.parents.as_slice())
    }

    fn record(&self, index: LabelIndex) -> Option<&ElementRecord> {
        self.elements.get(index).and_then(|r| r.as_ref())
    }

    fn record_mut(&mut self, index: LabelIndex) -> Option<&mut ElementRecord> {
        self.elements.get_mut(index).and_then(|r| r.as_mut())
    }

    fn insert(
        &mut self,
        identifier: Option<LabelIdentifier>,
        shape: ElementShape,
        nodes: Vec<LabelIndex>,
    ) -> ZincResult<LabelIndex> {
        let index = self.labels.create_label(identifier)?;
        if self.elements.len() <= index {
            self.elements.resize(index + 1, None);
        }
        self.elements[index] = Some(ElementRecord {
            shape,
            nodes,
            faces: vec![None; shape.face_count()],
            parents: Vec::new(),
        });
        Ok(index)
    }
}

/// Nodesets and meshes of one region.
#[derive(Debug, Clone)]
pub struct FeRegion {
    nodesets: [Nodeset; 2],
    meshes: [Mesh; MAXIMUM_ELEMENT_XI_DIMENSIONS],
}

impl Default for FeRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl FeRegion {
    pub fn new() -> Self {
        Self {
            nodesets: [
                Nodeset::new(NodesetDomain::Nodes),
                Nodeset::new(NodesetDomain::Datapoints),
            ],
            meshes: [Mesh::new(1), Mesh::new(2), Mesh::new(3)],
        }
    }

    pub fn nodeset(&self, domain: NodesetDomain) -> &Nodeset {
        &self.nodesets[domain.slot()]
    }

    pub fn mesh(&self, dimension: usize) -> Option<&Mesh> {
        if dimension == 0 {
            return None;
        }
        self.meshes.get(dimension - 1)
    }

    fn mesh_mut(&mut self, dimension: usize) -> ZincResult<&mut Mesh> {
        if dimension == 0 || dimension > MAXIMUM_ELEMENT_XI_DIMENSIONS {
            return Err(ZincError::argument(format!("no mesh of dimension {}", dimension)));
        }
        Ok(&mut self.meshes[dimension - 1])
    }

    #[instrument(level = "trace", skip(self))]
    pub fn create_node(
        &mut self,
        domain: NodesetDomain,
        identifier: Option<LabelIdentifier>,
    ) -> ZincResult<LabelIndex> {
        let nodeset = &mut self.nodesets[domain.slot()];
        let index = nodeset.labels.create_label(identifier)?;
        if nodeset.element_usage.len() <= index {
            nodeset.element_usage.resize(index + 1, 0);
        }
        Ok(index)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn destroy_node(&mut self, domain: NodesetDomain, index: LabelIndex) -> ZincResult<()> {
        let nodeset = &mut self.nodesets[domain.slot()];
        if !nodeset.labels.is_valid_index(index) {
            return Err(ZincError::NotFound);
        }
        if nodeset.usage(index) > 0 {
            return Err(ZincError::argument(format!(
                "node {:?} is in use by {} element(s)",
                nodeset.labels.identifier(index),
                nodeset.usage(index)
            )));
        }
        nodeset.labels.remove_label(index)?;
        Ok(())
    }

    /// Creates an element with nodes given by identifier in the `nodes` nodeset.
    /// An empty node list creates an element that inherits nodes from a parent.
    #[instrument(level = "trace", skip(self))]
    pub fn create_element(
        &mut self,
        dimension: usize,
        identifier: Option<LabelIdentifier>,
        shape: ElementShape,
        node_identifiers: &[LabelIdentifier],
    ) -> ZincResult<LabelIndex> {
        if shape.dimension() != dimension {
            return Err(ZincError::argument(format!(
                "{:?} shape does not fit mesh of dimension {}",
                shape, dimension
            )));
        }
        if !node_identifiers.is_empty() && node_identifiers.len() != shape.node_count() {
            return Err(ZincError::argument(format!(
                "{:?} element needs {} nodes, got {}",
                shape,
                shape.node_count(),
                node_identifiers.len()
            )));
        }
        let nodes = node_identifiers
            .iter()
            .map(|&id| {
                self.nodesets[NodesetDomain::Nodes.slot()]
                    .labels
                    .find_label_by_identifier(id)
                    .ok_or_else(|| ZincError::argument(format!("no node {}", id)))
            })
            .collect::<ZincResult<Vec<_>>>()?;
        let index = self.mesh_mut(dimension)?.insert(identifier, shape, nodes.clone())?;
        let nodeset = &mut self.nodesets[NodesetDomain::Nodes.slot()];
        for node in nodes {
            nodeset.element_usage[node] += 1;
        }
        Ok(index)
    }

    /// Destroys an element, detaching it from parents and faces. Faces left
    /// without any parent are destroyed too.
    #[instrument(level = "trace", skip(self))]
    pub fn destroy_element(&mut self, dimension: usize, index: LabelIndex) -> ZincResult<()> {
        let mesh = self.mesh_mut(dimension)?;
        if !mesh.labels.is_valid_index(index) {
            return Err(ZincError::NotFound);
        }
        let record = mesh.elements[index].take().ok_or(ZincError::NotFound)?;
        mesh.labels.remove_label(index)?;
        let nodeset = &mut self.nodesets[NodesetDomain::Nodes.slot()];
        for node in &record.nodes {
            if let Some(usage) = nodeset.element_usage.get_mut(*node) {
                *usage = usage.saturating_sub(1);
            }
        }
        if dimension < MAXIMUM_ELEMENT_XI_DIMENSIONS {
            let parent_mesh = &mut self.meshes[dimension];
            for parent in &record.parents {
                if let Some(parent_record) = parent_mesh.record_mut(*parent) {
                    for face in parent_record.faces.iter_mut() {
                        if *face == Some(index) {
                            *face = None;
                        }
                    }
                }
            }
        }
        if dimension > 1 {
            let mut orphans = Vec::new();
            let face_mesh = &mut self.meshes[dimension - 2];
            for face in record.faces.iter().flatten() {
                if let Some(face_record) = face_mesh.record_mut(*face) {
                    face_record.parents.retain(|&p| p != index);
                    if face_record.parents.is_empty() && !orphans.contains(face) {
                        orphans.push(*face);
                    }
                }
            }
            for orphan in orphans {
                debug!("destroying orphaned face {} of dimension {}", orphan, dimension - 1);
                self.destroy_element(dimension - 1, orphan)?;
            }
        }
        Ok(())
    }

    /// Nodes of an element: its own node list, otherwise the nodes inherited
    /// from its first parent through the parent's face-node table.
    pub fn element_nodes(&self, dimension: usize, index: LabelIndex) -> Vec<LabelIndex> {
        let Some(record) = self.mesh(dimension).and_then(|m| m.record(index)) else {
            return Vec::new();
        };
        if !record.nodes.is_empty() {
            return record.nodes.clone();
        }
        let Some(parent_mesh) = self.mesh(dimension + 1) else {
            return Vec::new();
        };
        for &parent in &record.parents {
            let Some(parent_record) = parent_mesh.record(parent) else {
                continue;
            };
            let Some(face_number) = parent_record.faces.iter().position(|&f| f == Some(index)) else {
                continue;
            };
            let parent_nodes = self.element_nodes(dimension + 1, parent);
            if parent_nodes.is_empty() {
                continue;
            }
            return parent_record
                .shape
                .face_local_nodes(face_number)
                .iter()
                .filter_map(|&local| parent_nodes.get(local).copied())
                .collect();
        }
        Vec::new()
    }

    /// Creates missing face elements for every element of dimension 2 and 3,
    /// sharing a face between neighbours that use the same nodes.
    /// Returns the number of faces created.
    #[instrument(level = "debug", skip(self))]
    pub fn define_faces(&mut self) -> ZincResult<usize> {
        let mut created = 0;
        for dimension in (2..=MAXIMUM_ELEMENT_XI_DIMENSIONS).rev() {
            let face_dimension = dimension - 1;
            let mut faces_by_nodes: HashMap<Vec<LabelIndex>, LabelIndex> = HashMap::new();
            for (face, _) in self.meshes[face_dimension - 1].labels.iter() {
                let mut key = self.element_nodes(face_dimension, face);
                if !key.is_empty() {
                    key.sort_unstable();
                    faces_by_nodes.entry(key).or_insert(face);
                }
            }
            let parents: Vec<LabelIndex> = self.meshes[dimension - 1]
                .labels
                .iter()
                .map(|(index, _)| index)
                .collect();
            for parent in parents {
                let Some(shape) = self.meshes[dimension - 1].element_shape(parent) else {
                    continue;
                };
                let Some(face_shape) = shape.face_shape() else {
                    continue;
                };
                let parent_nodes = self.element_nodes(dimension, parent);
                if parent_nodes.is_empty() {
                    continue;
                }
                for face_number in 0..shape.face_count() {
                    if self.meshes[dimension - 1].element_faces(parent)[face_number].is_some() {
                        continue;
                    }
                    let mut key: Vec<LabelIndex> = shape
                        .face_local_nodes(face_number)
                        .iter()
                        .map(|&local| parent_nodes[local])
                        .collect();
                    key.sort_unstable();
                    let face = match faces_by_nodes.get(&key) {
                        Some(&face) => face,
                        None => {
                            let face = self.meshes[face_dimension - 1].insert(None, face_shape, Vec::new())?;
                            faces_by_nodes.insert(key, face);
                            created += 1;
                            face
                        }
                    };
                    if let Some(parent_record) = self.meshes[dimension - 1].record_mut(parent) {
                        parent_record.faces[face_number] = Some(face);
                    }
                    if let Some(face_record) = self.meshes[face_dimension - 1].record_mut(face) {
                        if !face_record.parents.contains(&parent) {
                            face_record.parents.push(parent);
                        }
                    }
                }
            }
        }
        debug!("defined {} faces", created);
        Ok(created)
    }

    /// True if any nodeset or mesh logged a removal since the last flush.
    pub fn has_removals(&self) -> bool {
        self.nodesets
            .iter()
            .map(|n| n.labels.change_log())
            .chain(self.meshes.iter().map(|m| m.labels.change_log()))
            .any(|log| log.contains(LabelChange::REMOVE))
    }

    pub fn clear_change_logs(&mut self) {
        for nodeset in self.nodesets.iter_mut() {
            nodeset.labels.clear_change_log();
        }
        for mesh in self.meshes.iter_mut() {
            mesh.labels.clear_change_log();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_region() -> (FeRegion, LabelIndex) {
        let mut fe = FeRegion::new();
        for id in 1..=4 {
            fe.create_node(NodesetDomain::Nodes, Some(id)).unwrap();
        }
        let element = fe
            .create_element(2, Some(1), ElementShape::Square, &[1, 2, 3, 4])
            .unwrap();
        (fe, element)
    }

    #[test]
    fn given_square_when_faces_defined_then_four_lines_inherit_nodes() {
        let (mut fe, element) = square_region();

        let created = fe.define_faces().unwrap();

        assert_eq!(created, 4);
        let mesh2d = fe.mesh(2).unwrap();
        let faces: Vec<_> = mesh2d.element_faces(element).iter().flatten().copied().collect();
        assert_eq!(faces.len(), 4);
        // xi1 = 0 face uses local nodes 0 and 2
        assert_eq!(fe.element_nodes(1, faces[0]), vec![0, 2]);
        assert_eq!(fe.mesh(1).unwrap().element_parents(faces[0]), &[element]);
    }

    #[test]
    fn given_two_squares_sharing_edge_when_faces_defined_then_edge_shared() {
        let mut fe = FeRegion::new();
        for id in 1..=6 {
            fe.create_node(NodesetDomain::Nodes, Some(id)).unwrap();
        }
        let a = fe.create_element(2, Some(1), ElementShape::Square, &[1, 2, 4, 5]).unwrap();
        let b = fe.create_element(2, Some(2), ElementShape::Square, &[2, 3, 5, 6]).unwrap();

        assert_eq!(fe.define_faces().unwrap(), 7);
        let shared = fe.mesh(2).unwrap().element_faces(a)[1].unwrap();
        assert_eq!(fe.mesh(2).unwrap().element_faces(b)[0], Some(shared));
        assert_eq!(fe.mesh(1).unwrap().element_parents(shared), &[a, b]);
    }

    #[test]
    fn given_node_in_use_when_destroyed_then_rejected() {
        let (mut fe, _) = square_region();
        let result = fe.destroy_node(NodesetDomain::Nodes, 0);
        assert!(matches!(result, Err(ZincError::Argument(_))));
    }

    #[test]
    fn given_element_with_faces_when_destroyed_then_orphan_faces_destroyed() {
        let (mut fe, element) = square_region();
        fe.define_faces().unwrap();

        fe.destroy_element(2, element).unwrap();

        assert_eq!(fe.mesh(2).unwrap().size(), 0);
        assert_eq!(fe.mesh(1).unwrap().size(), 0);
        assert!(fe.has_removals());
        fe.destroy_node(NodesetDomain::Nodes, 0).unwrap();
    }

    #[test]
    fn given_cube_when_faces_defined_then_squares_and_lines_created() {
        let mut fe = FeRegion::new();
        for id in 1..=8 {
            fe.create_node(NodesetDomain::Nodes, Some(id)).unwrap();
        }
        fe.create_element(3, Some(1), ElementShape::Cube, &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();

        fe.define_faces().unwrap();

        assert_eq!(fe.mesh(2).unwrap().size(), 6);
        assert_eq!(fe.mesh(1).unwrap().size(), 12);
    }

    #[test]
    fn given_wrong_shape_dimension_when_created_then_argument_error() {
        let mut fe = FeRegion::new();
        let result = fe.create_element(3, None, ElementShape::Square, &[]);
        assert!(matches!(result, Err(ZincError::Argument(_))));
    }
}
