//! Node group: a subset of one nodeset of a region, evaluating to 1 at
//! member nodes.

use tracing::instrument;

use crate::domain::{FieldChangeFlags, LabelIdentifier, LabelIndex, NodesetDomain, ZincError, ZincResult};
use crate::field::{FieldCore, FieldId, FieldKind, SubobjectDomain, SubobjectGroup};
use crate::region::{Context, ElementRef, NodeRef, RegionId};

impl Context {
    /// Creates a standalone node group over the region's nodeset.
    pub fn create_field_node_group(&mut self, region: RegionId, domain: NodesetDomain) -> ZincResult<FieldId> {
        let core = FieldCore::NodeGroup(SubobjectGroup::new(region, SubobjectDomain::Nodeset(domain)));
        self.insert_field(region, core)
    }

    fn node_group_domain(&self, field: FieldId) -> ZincResult<NodesetDomain> {
        if self.field_kind(field) != Some(FieldKind::NodeGroup) {
            return Err(ZincError::argument("field is not a node group"));
        }
        match self.subobject_group(field)?.domain {
            SubobjectDomain::Nodeset(domain) => Ok(domain),
            SubobjectDomain::Mesh(_) => Err(ZincError::argument("field is not a node group")),
        }
    }

    pub fn node_group_nodeset_domain(&self, field: FieldId) -> Option<NodesetDomain> {
        self.node_group_domain(field).ok()
    }

    fn check_node_compatible(&self, field: FieldId, node: NodeRef) -> ZincResult<()> {
        let domain = self.node_group_domain(field)?;
        let region = self.subobject_group(field)?.region;
        if node.region != region || node.domain != domain {
            return Err(ZincError::argument("node is not from the group's master nodeset"));
        }
        self.check_node(node)
    }

    /// `AlreadyExists` if the node was a member.
    #[instrument(level = "trace", skip(self))]
    pub fn node_group_add_node(&mut self, field: FieldId, node: NodeRef) -> ZincResult<()> {
        self.check_node_compatible(field, node)?;
        self.subobject_edit(field, |ctx| ctx.subobject_set_index(field, node.index, true))
    }

    /// `NotFound` if the node was not a member.
    #[instrument(level = "trace", skip(self))]
    pub fn node_group_remove_node(&mut self, field: FieldId, node: NodeRef) -> ZincResult<()> {
        self.check_node_compatible(field, node)?;
        self.subobject_edit(field, |ctx| ctx.subobject_set_index(field, node.index, false))
    }

    pub fn node_group_contains_node(&self, field: FieldId, node: NodeRef) -> bool {
        self.check_node_compatible(field, node).is_ok() && self.subobject_contains_index(field, node.index)
    }

    /// Adds live nodes with identifiers in `first..=last`; returns how many
    /// were added.
    pub fn node_group_add_nodes_in_identifier_range(
        &mut self,
        field: FieldId,
        first: LabelIdentifier,
        last: LabelIdentifier,
    ) -> ZincResult<usize> {
        self.node_group_domain(field)?;
        let indices = self.identifier_range_indices(field, first, last)?;
        self.subobject_edit(field, |ctx| ctx.subobject_set_indices(field, &indices, true))
    }

    pub fn node_group_remove_nodes_in_identifier_range(
        &mut self,
        field: FieldId,
        first: LabelIdentifier,
        last: LabelIdentifier,
    ) -> ZincResult<usize> {
        self.node_group_domain(field)?;
        let indices = self.identifier_range_indices(field, first, last)?;
        self.subobject_edit(field, |ctx| ctx.subobject_set_indices(field, &indices, false))
    }

    /// Adds every node of the master nodeset where `conditional` is true.
    #[instrument(level = "debug", skip(self))]
    pub fn node_group_add_nodes_conditional(&mut self, field: FieldId, conditional: FieldId) -> ZincResult<()> {
        self.node_group_domain(field)?;
        let indices = self.conditional_indices(field, conditional, true)?;
        self.subobject_edit(field, |ctx| ctx.subobject_set_indices(field, &indices, true))?;
        Ok(())
    }

    /// Removes every member where `conditional` is true.
    #[instrument(level = "debug", skip(self))]
    pub fn node_group_remove_nodes_conditional(&mut self, field: FieldId, conditional: FieldId) -> ZincResult<()> {
        self.node_group_domain(field)?;
        if self.subobject_size(field) == 0 {
            return Ok(());
        }
        let indices = self.conditional_indices(field, conditional, false)?;
        self.subobject_edit(field, |ctx| ctx.subobject_set_indices(field, &indices, false))?;
        Ok(())
    }

    fn check_element_nodes_compatible(&self, field: FieldId, element: ElementRef) -> ZincResult<()> {
        if self.node_group_domain(field)? != NodesetDomain::Nodes {
            return Err(ZincError::argument("element nodes only apply to a nodes group"));
        }
        if element.region != self.subobject_group(field)?.region {
            return Err(ZincError::argument("element is not from the group's region"));
        }
        self.check_element(element)
    }

    pub(crate) fn element_node_indices(&self, element: ElementRef) -> ZincResult<Vec<LabelIndex>> {
        Ok(self
            .fe_region(element.region)?
            .element_nodes(element.dimension, element.index))
    }

    /// Adds the nodes of `element`, inherited from a parent for faces.
    pub fn node_group_add_element_nodes(&mut self, field: FieldId, element: ElementRef) -> ZincResult<()> {
        self.check_element_nodes_compatible(field, element)?;
        let indices = self.element_node_indices(element)?;
        self.subobject_edit(field, |ctx| ctx.subobject_set_indices(field, &indices, true))?;
        Ok(())
    }

    pub fn node_group_remove_element_nodes(&mut self, field: FieldId, element: ElementRef) -> ZincResult<()> {
        self.check_element_nodes_compatible(field, element)?;
        let indices = self.element_node_indices(element)?;
        self.subobject_edit(field, |ctx| ctx.subobject_set_indices(field, &indices, false))?;
        Ok(())
    }

    pub fn node_group_clear(&mut self, field: FieldId) -> ZincResult<()> {
        self.node_group_domain(field)?;
        if self.subobject_size(field) == 0 {
            return Ok(());
        }
        self.subobject_edit(field, |ctx| {
            let group = ctx.subobject_group_mut(field)?;
            group.members.clear();
            group.change_detail.change_remove();
            ctx.mark_field_changed(field, FieldChangeFlags::PARTIAL_RESULT);
            Ok(())
        })
    }

    pub fn node_group_size(&self, field: FieldId) -> usize {
        self.subobject_size(field)
    }

    pub fn node_group_is_empty(&self, field: FieldId) -> bool {
        self.node_group_size(field) == 0
    }

    /// Member identifiers in index order.
    pub fn node_group_identifiers(&self, field: FieldId) -> ZincResult<Vec<LabelIdentifier>> {
        self.node_group_domain(field)?;
        self.subobject_identifiers(field)
    }
}
