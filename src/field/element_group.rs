//! Element group: a subset of the mesh of one dimension. In full subelement
//! handling mode a member element implies membership of its faces, their
//! faces in turn, and its nodes, all held by the owning hierarchical group.

use tracing::instrument;

use crate::domain::{
    FieldChangeFlags, LabelIdentifier, LabelIndex, LabelsGroup, NodesetDomain, ZincError, ZincResult,
    MAXIMUM_ELEMENT_XI_DIMENSIONS,
};
use crate::field::{FieldCore, FieldId, FieldKind, SubelementHandlingMode, SubobjectDomain, SubobjectGroup};
use crate::region::{Context, ElementRef, RegionId};

impl Context {
    /// Creates a standalone element group over the region's mesh of
    /// `dimension`.
    pub fn create_field_element_group(&mut self, region: RegionId, dimension: usize) -> ZincResult<FieldId> {
        if dimension == 0 || dimension > MAXIMUM_ELEMENT_XI_DIMENSIONS {
            return Err(ZincError::argument(format!("invalid mesh dimension {}", dimension)));
        }
        let core = FieldCore::ElementGroup(SubobjectGroup::new(region, SubobjectDomain::Mesh(dimension)));
        self.insert_field(region, core)
    }

    pub fn element_group_dimension(&self, field: FieldId) -> Option<usize> {
        self.element_group_mesh(field).ok().map(|(_, dimension)| dimension)
    }

    fn element_group_mesh(&self, field: FieldId) -> ZincResult<(RegionId, usize)> {
        if self.field_kind(field) != Some(FieldKind::ElementGroup) {
            return Err(ZincError::argument("field is not an element group"));
        }
        let group = self.subobject_group(field)?;
        match group.domain {
            SubobjectDomain::Mesh(dimension) => Ok((group.region, dimension)),
            SubobjectDomain::Nodeset(_) => Err(ZincError::argument("field is not an element group")),
        }
    }

    fn check_element_compatible(&self, field: FieldId, element: ElementRef) -> ZincResult<()> {
        let (region, dimension) = self.element_group_mesh(field)?;
        if element.region != region || element.dimension != dimension {
            return Err(ZincError::argument("element is not from the group's master mesh"));
        }
        self.check_element(element)
    }

    /// Subelement handling comes from the owning group; standalone element
    /// groups never cascade.
    fn full_mode_owner(&self, field: FieldId) -> Option<FieldId> {
        let owner = self.subobject_group(field).ok()?.owner_group?;
        (self.group_subelement_handling_mode(owner).ok()? == SubelementHandlingMode::Full).then_some(owner)
    }

    /// `AlreadyExists` if the element was a member. In full mode faces and
    /// nodes are added even then.
    #[instrument(level = "trace", skip(self))]
    pub fn element_group_add_element(&mut self, field: FieldId, element: ElementRef) -> ZincResult<()> {
        self.check_element_compatible(field, element)?;
        let Some(owner) = self.full_mode_owner(field) else {
            return self.subobject_edit(field, |ctx| ctx.subobject_set_index(field, element.index, true));
        };
        self.subobject_edit(field, |ctx| {
            let result = ctx.subobject_set_index(field, element.index, true);
            match result {
                Ok(()) | Err(ZincError::AlreadyExists) => {
                    ctx.add_subelements(owner, element)?;
                    result
                }
                Err(e) => Err(e),
            }
        })
    }

    /// `NotFound` if the element was not a member. In full mode faces and
    /// nodes no longer needed by a remaining element are removed too.
    #[instrument(level = "trace", skip(self))]
    pub fn element_group_remove_element(&mut self, field: FieldId, element: ElementRef) -> ZincResult<()> {
        self.check_element_compatible(field, element)?;
        let Some(owner) = self.full_mode_owner(field) else {
            return self.subobject_edit(field, |ctx| ctx.subobject_set_index(field, element.index, false));
        };
        self.subobject_edit(field, |ctx| {
            let result = ctx.subobject_set_index(field, element.index, false);
            match result {
                Ok(()) | Err(ZincError::NotFound) => {
                    ctx.remove_subelements(owner, field, element)?;
                    result
                }
                Err(e) => Err(e),
            }
        })
    }

    pub fn element_group_contains_element(&self, field: FieldId, element: ElementRef) -> bool {
        self.check_element_compatible(field, element).is_ok()
            && self.subobject_contains_index(field, element.index)
    }

    fn check_parent_element_compatible(&self, field: FieldId, parent: ElementRef) -> ZincResult<()> {
        let (region, dimension) = self.element_group_mesh(field)?;
        if parent.region != region || parent.dimension != dimension + 1 {
            return Err(ZincError::argument("element is not a parent of the group's mesh"));
        }
        self.check_element(parent)
    }

    /// Adds the direct faces of `parent`, which must be one dimension higher.
    pub fn element_group_add_element_faces(&mut self, field: FieldId, parent: ElementRef) -> ZincResult<()> {
        self.check_parent_element_compatible(field, parent)?;
        let faces = self.element_faces(parent);
        self.subobject_edit(field, |ctx| {
            for face in faces {
                match ctx.element_group_add_element(field, face) {
                    Ok(()) | Err(ZincError::AlreadyExists) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })
    }

    pub fn element_group_remove_element_faces(&mut self, field: FieldId, parent: ElementRef) -> ZincResult<()> {
        self.check_parent_element_compatible(field, parent)?;
        let faces = self.element_faces(parent);
        self.subobject_edit(field, |ctx| {
            for face in faces {
                match ctx.element_group_remove_element(field, face) {
                    Ok(()) | Err(ZincError::NotFound) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })
    }

    /// Returns how many elements were added.
    pub fn element_group_add_elements_in_identifier_range(
        &mut self,
        field: FieldId,
        first: LabelIdentifier,
        last: LabelIdentifier,
    ) -> ZincResult<usize> {
        let (region, dimension) = self.element_group_mesh(field)?;
        let indices = self.identifier_range_indices(field, first, last)?;
        let owner = self.full_mode_owner(field);
        self.subobject_edit(field, |ctx| {
            let added = ctx.subobject_set_indices(field, &indices, true)?;
            if let Some(owner) = owner {
                for &index in &indices {
                    ctx.add_subelements(owner, ElementRef { region, dimension, index })?;
                }
            }
            Ok(added)
        })
    }

    pub fn element_group_remove_elements_in_identifier_range(
        &mut self,
        field: FieldId,
        first: LabelIdentifier,
        last: LabelIdentifier,
    ) -> ZincResult<usize> {
        self.element_group_mesh(field)?;
        let indices: Vec<LabelIndex> = self
            .identifier_range_indices(field, first, last)?
            .into_iter()
            .filter(|&index| self.subobject_contains_index(field, index))
            .collect();
        self.remove_element_indices(field, &indices)?;
        Ok(indices.len())
    }

    /// Adds every element of the master mesh where `conditional` is true.
    #[instrument(level = "debug", skip(self))]
    pub fn element_group_add_elements_conditional(&mut self, field: FieldId, conditional: FieldId) -> ZincResult<()> {
        let (region, dimension) = self.element_group_mesh(field)?;
        let indices = self.conditional_indices(field, conditional, true)?;
        let owner = self.full_mode_owner(field);
        self.subobject_edit(field, |ctx| {
            ctx.subobject_set_indices(field, &indices, true)?;
            if let Some(owner) = owner {
                for &index in &indices {
                    ctx.add_subelements(owner, ElementRef { region, dimension, index })?;
                }
            }
            Ok(())
        })
    }

    /// Removes every member where `conditional` is true. A conditional that
    /// is this group, or a group holding it, clears the group.
    #[instrument(level = "debug", skip(self))]
    pub fn element_group_remove_elements_conditional(
        &mut self,
        field: FieldId,
        conditional: FieldId,
    ) -> ZincResult<()> {
        let (_, dimension) = self.element_group_mesh(field)?;
        let is_self = conditional == field
            || self
                .field(conditional)
                .ok()
                .and_then(|f| f.core.as_group())
                .is_some_and(|g| g.local_element_group(dimension) == Some(field));
        if is_self {
            return self.element_group_clear(field);
        }
        if self.subobject_size(field) == 0 {
            return Ok(());
        }
        let indices = self.conditional_indices(field, conditional, false)?;
        self.remove_element_indices(field, &indices)
    }

    fn remove_element_indices(&mut self, field: FieldId, indices: &[LabelIndex]) -> ZincResult<()> {
        let owner = self.full_mode_owner(field);
        self.subobject_edit(field, |ctx| {
            ctx.subobject_set_indices(field, indices, false)?;
            match owner {
                Some(owner) => ctx.remove_subelements_list(owner, field, indices),
                None => Ok(()),
            }
        })
    }

    /// Empties the group; in full mode also drops faces and nodes no longer
    /// used by a remaining element.
    pub fn element_group_clear(&mut self, field: FieldId) -> ZincResult<()> {
        self.element_group_mesh(field)?;
        if self.subobject_size(field) == 0 {
            return Ok(());
        }
        let owner = self.full_mode_owner(field);
        self.subobject_edit(field, |ctx| {
            let mut removed = LabelsGroup::new();
            let group = ctx.subobject_group_mut(field)?;
            removed.swap(&mut group.members);
            group.change_detail.change_remove();
            ctx.mark_field_changed(field, FieldChangeFlags::PARTIAL_RESULT);
            match owner {
                Some(owner) => {
                    let indices: Vec<LabelIndex> = removed.iter().collect();
                    ctx.remove_subelements_list(owner, field, &indices)
                }
                None => Ok(()),
            }
        })
    }

    pub fn element_group_size(&self, field: FieldId) -> usize {
        self.subobject_size(field)
    }

    pub fn element_group_is_empty(&self, field: FieldId) -> bool {
        self.element_group_size(field) == 0
    }

    pub fn element_group_identifiers(&self, field: FieldId) -> ZincResult<Vec<LabelIdentifier>> {
        self.element_group_mesh(field)?;
        self.subobject_identifiers(field)
    }

    fn owner_face_group(&mut self, owner: FieldId, face_dimension: usize, create: bool) -> ZincResult<Option<FieldId>> {
        if face_dimension == 0 {
            return Ok(None);
        }
        match self.owner_subobject_group(owner, SubobjectDomain::Mesh(face_dimension), create) {
            Some(face_group) => Ok(Some(face_group)),
            None if create => Err(ZincError::general(format!(
                "cannot get or create {}-D face element group",
                face_dimension
            ))),
            None => Ok(None),
        }
    }

    fn add_subelements(&mut self, owner: FieldId, element: ElementRef) -> ZincResult<()> {
        if let Some(face_group) = self.owner_face_group(owner, element.dimension - 1, true)? {
            self.add_element_faces_recursive(owner, face_group, element.dimension, element.index)?;
        }
        let node_group = self
            .owner_subobject_group(owner, SubobjectDomain::Nodeset(NodesetDomain::Nodes), true)
            .ok_or_else(|| ZincError::general("cannot get or create node group"))?;
        let indices = self.element_node_indices(element)?;
        self.subobject_set_indices(node_group, &indices, true)?;
        Ok(())
    }

    /// Adds the faces of the parent at `parent_dimension`, then their faces.
    /// Stops at the first failure, keeping what was already added.
    fn add_element_faces_recursive(
        &mut self,
        owner: FieldId,
        face_group: FieldId,
        parent_dimension: usize,
        parent_index: LabelIndex,
    ) -> ZincResult<()> {
        let face_dimension = parent_dimension - 1;
        let sub_face_group = self.owner_face_group(owner, face_dimension - 1, true)?;
        let faces = self.mesh_element_faces(face_group, parent_dimension, parent_index)?;
        let mut added = 0;
        let mut result = Ok(());
        for face in faces {
            match self.subobject_group_mut(face_group)?.members.set_index(face, true) {
                Ok(()) => added += 1,
                Err(ZincError::AlreadyExists) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
            if let Some(sub_face_group) = sub_face_group {
                result = self.add_element_faces_recursive(owner, sub_face_group, face_dimension, face);
                if result.is_err() {
                    break;
                }
            }
        }
        if added > 0 {
            self.subobject_group_mut(face_group)?.change_detail.change_add();
            self.mark_field_changed(face_group, FieldChangeFlags::PARTIAL_RESULT);
        }
        result
    }

    fn mesh_element_faces(
        &self,
        face_group: FieldId,
        parent_dimension: usize,
        parent_index: LabelIndex,
    ) -> ZincResult<Vec<LabelIndex>> {
        let region = self.subobject_group(face_group)?.region;
        let mesh = self
            .fe_region(region)?
            .mesh(parent_dimension)
            .ok_or_else(|| ZincError::argument(format!("no mesh of dimension {}", parent_dimension)))?;
        Ok(mesh.element_faces(parent_index).iter().flatten().copied().collect())
    }

    fn mesh_element_parents(&self, region: RegionId, dimension: usize, index: LabelIndex) -> Vec<LabelIndex> {
        self.fe_region(region)
            .ok()
            .and_then(|fe| fe.mesh(dimension))
            .map(|mesh| mesh.element_parents(index).to_vec())
            .unwrap_or_default()
    }

    /// Removes faces of a removed parent unless another parent still in
    /// `parent_group` uses them, recursing into faces of removed faces.
    fn remove_element_faces_recursive(
        &mut self,
        owner: FieldId,
        face_group: FieldId,
        parent_group: FieldId,
        parent_index: LabelIndex,
    ) -> ZincResult<()> {
        let (region, face_dimension) = self.element_group_mesh(face_group)?;
        let sub_face_group = self.owner_face_group(owner, face_dimension - 1, false)?;
        let faces = self.mesh_element_faces(face_group, face_dimension + 1, parent_index)?;
        let mut removed = 0;
        let mut result = Ok(());
        for face in faces {
            let keep = self
                .mesh_element_parents(region, face_dimension, face)
                .into_iter()
                .any(|parent| self.subobject_contains_index(parent_group, parent));
            if keep {
                continue;
            }
            match self.subobject_group_mut(face_group)?.members.set_index(face, false) {
                Ok(()) => {
                    removed += 1;
                    if let Some(sub_face_group) = sub_face_group {
                        result = self.remove_element_faces_recursive(owner, sub_face_group, face_group, face);
                        if result.is_err() {
                            break;
                        }
                    }
                }
                Err(ZincError::NotFound) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        if removed > 0 {
            self.subobject_group_mut(face_group)?.change_detail.change_remove();
            self.mark_field_changed(face_group, FieldChangeFlags::PARTIAL_RESULT);
        }
        result
    }

    /// Node indices of the nodeset's index space, for scratch membership.
    fn scratch_node_labels(&self, region: RegionId) -> ZincResult<LabelsGroup> {
        let index_size = self
            .fe_region(region)?
            .nodeset(NodesetDomain::Nodes)
            .labels()
            .index_size();
        LabelsGroup::try_with_index_size(index_size)
    }

    fn remove_subelements(&mut self, owner: FieldId, field: FieldId, element: ElementRef) -> ZincResult<()> {
        if let Some(face_group) = self.owner_face_group(owner, element.dimension - 1, false)? {
            self.remove_element_faces_recursive(owner, face_group, field, element.index)?;
        }
        let Some(node_group) =
            self.owner_subobject_group(owner, SubobjectDomain::Nodeset(NodesetDomain::Nodes), false)
        else {
            return Ok(());
        };
        let mut remove_nodes = self.scratch_node_labels(element.region)?;
        for index in self.element_node_indices(element)? {
            let _ = remove_nodes.set_index(index, true);
        }
        // keep nodes of neighbours still in the group
        let neighbours: Vec<LabelIndex> = if element.dimension > 1 {
            self.mesh_element_faces(field, element.dimension, element.index)?
                .into_iter()
                .flat_map(|face| self.mesh_element_parents(element.region, element.dimension - 1, face))
                .filter(|&parent| parent != element.index && self.subobject_contains_index(field, parent))
                .collect()
        } else {
            self.subobject_group(field)?.members.iter().collect()
        };
        for index in neighbours {
            let neighbour = ElementRef { index, ..element };
            for node in self.element_node_indices(neighbour)? {
                let _ = remove_nodes.set_index(node, false);
            }
        }
        let indices: Vec<LabelIndex> = remove_nodes.iter().collect();
        self.subobject_set_indices(node_group, &indices, false)?;
        Ok(())
    }

    fn remove_subelements_list(&mut self, owner: FieldId, field: FieldId, removed: &[LabelIndex]) -> ZincResult<()> {
        let (region, dimension) = self.element_group_mesh(field)?;
        if let Some(face_group) = self.owner_face_group(owner, dimension - 1, false)? {
            for &index in removed {
                self.remove_element_faces_recursive(owner, face_group, field, index)?;
            }
        }
        let Some(node_group) =
            self.owner_subobject_group(owner, SubobjectDomain::Nodeset(NodesetDomain::Nodes), false)
        else {
            return Ok(());
        };
        let mut remove_nodes = self.scratch_node_labels(region)?;
        for &index in removed {
            for node in self.element_node_indices(ElementRef { region, dimension, index })? {
                let _ = remove_nodes.set_index(node, true);
            }
        }
        let remaining: Vec<LabelIndex> = self.subobject_group(field)?.members.iter().collect();
        for index in remaining {
            for node in self.element_node_indices(ElementRef { region, dimension, index })? {
                let _ = remove_nodes.set_index(node, false);
            }
        }
        if remove_nodes.is_empty() {
            return Ok(());
        }
        let indices: Vec<LabelIndex> = remove_nodes.iter().collect();
        self.subobject_set_indices(node_group, &indices, false)?;
        Ok(())
    }
}
