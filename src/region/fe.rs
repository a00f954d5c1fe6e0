//! Node and element access through the owning region's change cache.

use tracing::instrument;

use crate::domain::{
    ElementShape, FeRegion, LabelIdentifier, LabelIndex, NodesetDomain, ZincError, ZincResult,
};
use crate::region::{Context, RegionId};

/// A node (or datapoint) of one region's nodeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub region: RegionId,
    pub domain: NodesetDomain,
    pub index: LabelIndex,
}

/// An element of one region's mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub region: RegionId,
    pub dimension: usize,
    pub index: LabelIndex,
}

impl Context {
    pub fn fe_region(&self, region: RegionId) -> ZincResult<&FeRegion> {
        Ok(&self.node(region)?.fe_region)
    }

    pub(crate) fn fe_region_mut(&mut self, region: RegionId) -> ZincResult<&mut FeRegion> {
        Ok(&mut self.node_mut(region)?.fe_region)
    }

    /// Runs an edit of the region's nodesets/meshes inside a change scope.
    fn edit_fe_region<T>(
        &mut self,
        region: RegionId,
        edit: impl FnOnce(&mut FeRegion) -> ZincResult<T>,
    ) -> ZincResult<T> {
        self.begin_change(region)?;
        let result = self.fe_region_mut(region).and_then(edit);
        self.end_change(region)?;
        result
    }

    #[instrument(level = "trace", skip(self))]
    pub fn create_node(
        &mut self,
        region: RegionId,
        domain: NodesetDomain,
        identifier: Option<LabelIdentifier>,
    ) -> ZincResult<NodeRef> {
        let index = self.edit_fe_region(region, |fe| fe.create_node(domain, identifier))?;
        Ok(NodeRef {
            region,
            domain,
            index,
        })
    }

    pub fn destroy_node(&mut self, node: NodeRef) -> ZincResult<()> {
        self.edit_fe_region(node.region, |fe| fe.destroy_node(node.domain, node.index))
    }

    pub fn find_node_by_identifier(
        &self,
        region: RegionId,
        domain: NodesetDomain,
        identifier: LabelIdentifier,
    ) -> Option<NodeRef> {
        let index = self
            .fe_region(region)
            .ok()?
            .nodeset(domain)
            .labels()
            .find_label_by_identifier(identifier)?;
        Some(NodeRef {
            region,
            domain,
            index,
        })
    }

    /// `None` once the node has been destroyed.
    pub fn node_identifier(&self, node: NodeRef) -> Option<LabelIdentifier> {
        self.fe_region(node.region)
            .ok()?
            .nodeset(node.domain)
            .labels()
            .identifier(node.index)
    }

    pub fn nodeset_size(&self, region: RegionId, domain: NodesetDomain) -> usize {
        self.fe_region(region)
            .map_or(0, |fe| fe.nodeset(domain).size())
    }

    #[instrument(level = "trace", skip(self))]
    pub fn create_element(
        &mut self,
        region: RegionId,
        dimension: usize,
        identifier: Option<LabelIdentifier>,
        shape: ElementShape,
        node_identifiers: &[LabelIdentifier],
    ) -> ZincResult<ElementRef> {
        let index = self.edit_fe_region(region, |fe| {
            fe.create_element(dimension, identifier, shape, node_identifiers)
        })?;
        Ok(ElementRef {
            region,
            dimension,
            index,
        })
    }

    pub fn destroy_element(&mut self, element: ElementRef) -> ZincResult<()> {
        self.edit_fe_region(element.region, |fe| {
            fe.destroy_element(element.dimension, element.index)
        })
    }

    pub fn define_faces(&mut self, region: RegionId) -> ZincResult<usize> {
        self.edit_fe_region(region, |fe| fe.define_faces())
    }

    pub fn find_element_by_identifier(
        &self,
        region: RegionId,
        dimension: usize,
        identifier: LabelIdentifier,
    ) -> Option<ElementRef> {
        let index = self
            .fe_region(region)
            .ok()?
            .mesh(dimension)?
            .labels()
            .find_label_by_identifier(identifier)?;
        Some(ElementRef {
            region,
            dimension,
            index,
        })
    }

    pub fn element_identifier(&self, element: ElementRef) -> Option<LabelIdentifier> {
        self.fe_region(element.region)
            .ok()?
            .mesh(element.dimension)?
            .labels()
            .identifier(element.index)
    }

    pub fn mesh_size(&self, region: RegionId, dimension: usize) -> usize {
        self.fe_region(region)
            .ok()
            .and_then(|fe| fe.mesh(dimension))
            .map_or(0, |mesh| mesh.size())
    }

    /// Defined faces of an element, in face number order.
    pub fn element_faces(&self, element: ElementRef) -> Vec<ElementRef> {
        let Ok(fe) = self.fe_region(element.region) else {
            return Vec::new();
        };
        let Some(mesh) = fe.mesh(element.dimension) else {
            return Vec::new();
        };
        mesh.element_faces(element.index)
            .iter()
            .flatten()
            .map(|&index| ElementRef {
                region: element.region,
                dimension: element.dimension - 1,
                index,
            })
            .collect()
    }

    /// Nodes of an element, inherited from a parent for face elements.
    pub fn element_nodes(&self, element: ElementRef) -> Vec<NodeRef> {
        let Ok(fe) = self.fe_region(element.region) else {
            return Vec::new();
        };
        fe.element_nodes(element.dimension, element.index)
            .into_iter()
            .map(|index| NodeRef {
                region: element.region,
                domain: NodesetDomain::Nodes,
                index,
            })
            .collect()
    }

    pub(crate) fn check_node(&self, node: NodeRef) -> ZincResult<()> {
        self.node_identifier(node)
            .map(|_| ())
            .ok_or_else(|| ZincError::argument("node is not in its nodeset"))
    }

    pub(crate) fn check_element(&self, element: ElementRef) -> ZincResult<()> {
        self.element_identifier(element)
            .map(|_| ())
            .ok_or_else(|| ZincError::argument("element is not in its mesh"))
    }
}
