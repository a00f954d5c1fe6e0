//! State and operations shared by node groups and element groups, plus the
//! identifier-set group used for arbitrary domains.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::domain::{
    mesh_name, FieldChangeFlags, LabelChange, LabelIdentifier, LabelIndex, Labels, LabelsGroup,
    NodesetDomain, SubobjectGroupChangeDetail, ZincError, ZincResult,
};
use crate::field::{FieldCache, FieldCore, FieldId, FieldKind};
use crate::region::{Context, ElementRef, NodeRef, RegionId};

/// The nodeset or mesh a subobject group is a subset of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SubobjectDomain {
    Nodeset(NodesetDomain),
    Mesh(usize),
}

impl SubobjectDomain {
    pub fn name(self) -> String {
        match self {
            SubobjectDomain::Nodeset(domain) => domain.name().to_string(),
            SubobjectDomain::Mesh(dimension) => mesh_name(dimension),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SubobjectGroup {
    pub region: RegionId,
    pub domain: SubobjectDomain,
    pub members: LabelsGroup,
    pub change_detail: SubobjectGroupChangeDetail,
    /// Hierarchical group holding this subgroup; not an owning reference.
    pub owner_group: Option<FieldId>,
}

impl SubobjectGroup {
    pub fn new(region: RegionId, domain: SubobjectDomain) -> Self {
        Self {
            region,
            domain,
            members: LabelsGroup::new(),
            change_detail: SubobjectGroupChangeDetail::default(),
            owner_group: None,
        }
    }
}

/// Identifier set over the domain of an arbitrary field.
#[derive(Debug, Clone)]
pub(crate) struct DomainSelectionGroup {
    pub domain_field: FieldId,
    pub identifiers: BTreeSet<LabelIdentifier>,
    pub change_detail: SubobjectGroupChangeDetail,
    pub owner_group: Option<FieldId>,
}

impl Context {
    pub(crate) fn subobject_group(&self, field: FieldId) -> ZincResult<&SubobjectGroup> {
        self.field(field)?
            .core
            .as_subobject_group()
            .ok_or_else(|| ZincError::argument("field is not a node or element group"))
    }

    pub(crate) fn subobject_group_mut(&mut self, field: FieldId) -> ZincResult<&mut SubobjectGroup> {
        self.field_mut(field)?
            .core
            .as_subobject_group_mut()
            .ok_or_else(|| ZincError::argument("field is not a node or element group"))
    }

    /// Runs a membership edit inside one change scope of the group's region.
    pub(crate) fn subobject_edit<T>(
        &mut self,
        field: FieldId,
        edit: impl FnOnce(&mut Self) -> ZincResult<T>,
    ) -> ZincResult<T> {
        let region = self.subobject_group(field)?.region;
        self.begin_change(region)?;
        let result = edit(self);
        self.end_change(region)?;
        result
    }

    pub(crate) fn subobject_contains_index(&self, field: FieldId, index: LabelIndex) -> bool {
        self.subobject_group(field)
            .is_ok_and(|group| group.members.has_index(index))
    }

    pub(crate) fn subobject_size(&self, field: FieldId) -> usize {
        self.subobject_group(field).map_or(0, |group| group.members.size())
    }

    pub(crate) fn master_labels(&self, region: RegionId, domain: SubobjectDomain) -> ZincResult<&Labels> {
        let fe = self.fe_region(region)?;
        match domain {
            SubobjectDomain::Nodeset(domain) => Ok(fe.nodeset(domain).labels()),
            SubobjectDomain::Mesh(dimension) => fe
                .mesh(dimension)
                .map(|mesh| mesh.labels())
                .ok_or_else(|| ZincError::argument(format!("no mesh of dimension {}", dimension))),
        }
    }

    /// Sets membership of one index and records the change.
    pub(crate) fn subobject_set_index(
        &mut self,
        field: FieldId,
        index: LabelIndex,
        in_group: bool,
    ) -> ZincResult<()> {
        let group = self.subobject_group_mut(field)?;
        group.members.set_index(index, in_group)?;
        if in_group {
            group.change_detail.change_add();
        } else {
            group.change_detail.change_remove();
        }
        self.mark_field_changed(field, FieldChangeFlags::PARTIAL_RESULT);
        Ok(())
    }

    /// Sets membership of many indices; returns how many actually changed.
    pub(crate) fn subobject_set_indices(
        &mut self,
        field: FieldId,
        indices: &[LabelIndex],
        in_group: bool,
    ) -> ZincResult<usize> {
        let group = self.subobject_group_mut(field)?;
        let changed = indices
            .iter()
            .filter(|&&index| group.members.set_index(index, in_group).is_ok())
            .count();
        if changed > 0 {
            if in_group {
                group.change_detail.change_add();
            } else {
                group.change_detail.change_remove();
            }
            self.mark_field_changed(field, FieldChangeFlags::PARTIAL_RESULT);
        }
        Ok(changed)
    }

    /// Indices of live labels with identifiers in `first..=last`.
    ///
    /// Scans the whole index space when the range is larger than it, or for
    /// non-contiguous labels larger than `index_size / divisor`; otherwise
    /// looks up each identifier.
    pub(crate) fn identifier_range_indices(
        &self,
        field: FieldId,
        first: LabelIdentifier,
        last: LabelIdentifier,
    ) -> ZincResult<Vec<LabelIndex>> {
        if first > last {
            return Err(ZincError::argument(format!(
                "identifier range {}..{} is reversed",
                first, last
            )));
        }
        let group = self.subobject_group(field)?;
        let labels = self.master_labels(group.region, group.domain)?;
        let span = last as i64 - first as i64;
        let index_size = labels.index_size() as i64;
        let divisor = self.settings.identifier_range_scan_divisor.max(1) as i64;
        if span > index_size || (!labels.is_contiguous() && span > index_size / divisor) {
            debug!("identifier range {}..{}: scanning all labels", first, last);
            Ok(labels
                .iter()
                .filter(|(_, id)| (first..=last).contains(id))
                .map(|(index, _)| index)
                .collect())
        } else {
            Ok((first..=last)
                .filter_map(|id| labels.find_label_by_identifier(id))
                .collect())
        }
    }

    fn subobject_location(
        region: RegionId,
        domain: SubobjectDomain,
        index: LabelIndex,
        cache: &mut FieldCache,
    ) -> ZincResult<()> {
        match domain {
            SubobjectDomain::Nodeset(domain) => cache.set_node(NodeRef {
                region,
                domain,
                index,
            }),
            SubobjectDomain::Mesh(dimension) => cache.set_element(ElementRef {
                region,
                dimension,
                index,
            }),
        }
    }

    /// Snapshot of the indices a conditional add (or remove) would touch.
    ///
    /// A conditional that is, or holds, a subobject group on the same domain
    /// contributes its membership directly; anything else is evaluated per
    /// object.
    #[instrument(level = "trace", skip(self))]
    pub(crate) fn conditional_indices(
        &self,
        field: FieldId,
        conditional: FieldId,
        add: bool,
    ) -> ZincResult<Vec<LabelIndex>> {
        let group = self.subobject_group(field)?;
        let condition = self.field(conditional)?;
        if condition.region != group.region {
            return Err(ZincError::argument("conditional field is from another region"));
        }
        let labels = self.master_labels(group.region, group.domain)?;
        let candidates: Vec<LabelIndex> = if add {
            labels.iter().map(|(index, _)| index).collect()
        } else {
            group.members.iter().collect()
        };
        let source_members = match &condition.core {
            FieldCore::NodeGroup(other) | FieldCore::ElementGroup(other) if other.domain == group.domain => {
                Some(&other.members)
            }
            FieldCore::Group(other) if other.contains_all => return Ok(candidates),
            FieldCore::Group(other) => match other.local_subgroup_for(group.domain) {
                Some(subgroup) => Some(&self.subobject_group(subgroup)?.members),
                None => return Ok(Vec::new()),
            },
            _ => None,
        };
        let mut snapshot = Vec::new();
        if let Some(members) = source_members {
            snapshot
                .try_reserve_exact(members.size())
                .map_err(|e| ZincError::Memory(format!("conditional snapshot: {}", e)))?;
            snapshot.extend(members.iter().filter(|&index| add || group.members.has_index(index)));
            return Ok(snapshot);
        }
        snapshot
            .try_reserve_exact(candidates.len())
            .map_err(|e| ZincError::Memory(format!("conditional snapshot: {}", e)))?;
        let mut cache = FieldCache::new(group.region);
        for index in candidates {
            Self::subobject_location(group.region, group.domain, index, &mut cache)?;
            if self.evaluate_boolean(conditional, &cache) {
                snapshot.push(index);
            }
        }
        Ok(snapshot)
    }

    /// Drops members whose labels were removed from the master domain.
    /// Returns true if the group changed.
    pub(crate) fn subobject_check_dependency(&mut self, field: FieldId) -> bool {
        let Ok(group) = self.subobject_group(field) else {
            return false;
        };
        let Ok(labels) = self.master_labels(group.region, group.domain) else {
            return false;
        };
        if !labels.change_log().contains(LabelChange::REMOVE) || group.members.is_empty() {
            return false;
        }
        let master_empty = labels.size() == 0;
        let stale: Vec<LabelIndex> = group
            .members
            .iter()
            .filter(|&index| !labels.is_valid_index(index))
            .collect();
        let Ok(group) = self.subobject_group_mut(field) else {
            return false;
        };
        if master_empty {
            group.members.clear();
        } else if stale.is_empty() {
            return false;
        } else {
            for index in stale {
                let _ = group.members.set_index(index, false);
            }
        }
        group.change_detail.change_remove();
        self.mark_field_changed(field, FieldChangeFlags::PARTIAL_RESULT);
        true
    }

    pub(crate) fn subobject_identifiers(&self, field: FieldId) -> ZincResult<Vec<LabelIdentifier>> {
        let group = self.subobject_group(field)?;
        let labels = self.master_labels(group.region, group.domain)?;
        Ok(group
            .members
            .iter()
            .filter_map(|index| labels.identifier(index))
            .collect())
    }

    pub(crate) fn set_subgroup_owner(&mut self, subgroup: FieldId, owner: Option<FieldId>) {
        let Ok(field) = self.field_mut(subgroup) else {
            return;
        };
        match &mut field.core {
            FieldCore::NodeGroup(group) | FieldCore::ElementGroup(group) => group.owner_group = owner,
            FieldCore::DomainSelection(group) => group.owner_group = owner,
            _ => {}
        }
    }

    pub(crate) fn subgroup_is_empty(&self, subgroup: FieldId) -> bool {
        match self.field(subgroup).map(|f| &f.core) {
            Ok(FieldCore::NodeGroup(group)) | Ok(FieldCore::ElementGroup(group)) => group.members.is_empty(),
            Ok(FieldCore::DomainSelection(group)) => group.identifiers.is_empty(),
            _ => true,
        }
    }

    pub(crate) fn subgroup_size(&self, subgroup: FieldId) -> usize {
        match self.field(subgroup).map(|f| &f.core) {
            Ok(FieldCore::NodeGroup(group)) | Ok(FieldCore::ElementGroup(group)) => group.members.size(),
            Ok(FieldCore::DomainSelection(group)) => group.identifiers.len(),
            _ => 0,
        }
    }

    pub(crate) fn subgroup_change_detail(&self, subgroup: FieldId) -> SubobjectGroupChangeDetail {
        match self.field(subgroup).map(|f| &f.core) {
            Ok(FieldCore::NodeGroup(group)) | Ok(FieldCore::ElementGroup(group)) => group.change_detail,
            Ok(FieldCore::DomainSelection(group)) => group.change_detail,
            _ => SubobjectGroupChangeDetail::default(),
        }
    }

    pub(crate) fn subgroup_clear(&mut self, subgroup: FieldId) -> ZincResult<()> {
        match self.field(subgroup)?.core.kind() {
            FieldKind::NodeGroup => self.node_group_clear(subgroup),
            FieldKind::ElementGroup => self.element_group_clear(subgroup),
            FieldKind::DomainSelection => self.domain_selection_clear(subgroup),
            _ => Err(ZincError::argument("field is not a subgroup")),
        }
    }

    fn domain_selection(&self, field: FieldId) -> ZincResult<&DomainSelectionGroup> {
        self.field(field)?
            .core
            .as_domain_selection()
            .ok_or_else(|| ZincError::argument("field is not a domain selection group"))
    }

    fn domain_selection_set(
        &mut self,
        field: FieldId,
        identifier: LabelIdentifier,
        in_group: bool,
    ) -> ZincResult<()> {
        let group = self
            .field_mut(field)?
            .core
            .as_domain_selection_mut()
            .ok_or_else(|| ZincError::argument("field is not a domain selection group"))?;
        if in_group {
            if !group.identifiers.insert(identifier) {
                return Err(ZincError::AlreadyExists);
            }
            group.change_detail.change_add();
        } else {
            if !group.identifiers.remove(&identifier) {
                return Err(ZincError::NotFound);
            }
            group.change_detail.change_remove();
        }
        self.field_changed(field, FieldChangeFlags::PARTIAL_RESULT)
    }

    pub fn domain_selection_add_identifier(
        &mut self,
        field: FieldId,
        identifier: LabelIdentifier,
    ) -> ZincResult<()> {
        self.domain_selection_set(field, identifier, true)
    }

    pub fn domain_selection_remove_identifier(
        &mut self,
        field: FieldId,
        identifier: LabelIdentifier,
    ) -> ZincResult<()> {
        self.domain_selection_set(field, identifier, false)
    }

    pub fn domain_selection_contains_identifier(&self, field: FieldId, identifier: LabelIdentifier) -> bool {
        self.domain_selection(field)
            .is_ok_and(|group| group.identifiers.contains(&identifier))
    }

    pub fn domain_selection_size(&self, field: FieldId) -> usize {
        self.domain_selection(field).map_or(0, |group| group.identifiers.len())
    }

    /// The field whose domain the selection's identifiers refer to.
    pub fn domain_selection_domain_field(&self, field: FieldId) -> Option<FieldId> {
        self.domain_selection(field).ok().map(|group| group.domain_field)
    }

    pub fn domain_selection_clear(&mut self, field: FieldId) -> ZincResult<()> {
        let group = self
            .field_mut(field)?
            .core
            .as_domain_selection_mut()
            .ok_or_else(|| ZincError::argument("field is not a domain selection group"))?;
        if group.identifiers.is_empty() {
            return Ok(());
        }
        group.identifiers.clear();
        group.change_detail.change_remove();
        self.field_changed(field, FieldChangeFlags::PARTIAL_RESULT)
    }
}
