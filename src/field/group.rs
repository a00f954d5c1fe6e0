//! Hierarchical group: a named group spanning a region subtree, made of
//! local node/element/domain subgroups plus one group per child region.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::domain::{
    FieldChangeFlags, GroupChange, HierarchicalGroupChangeDetail, NodesetDomain, ZincError,
    ZincResult, MAXIMUM_ELEMENT_XI_DIMENSIONS,
};
use crate::field::{
    DomainSelectionGroup, FieldCore, FieldId, FieldKind, SubobjectDomain, SubobjectGroup,
};
use crate::region::{Context, RegionId};

/// Whether adding an element to a group also adds its faces and nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubelementHandlingMode {
    #[default]
    None,
    Full,
}

impl FromStr for SubelementHandlingMode {
    type Err = ZincError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SubelementHandlingMode::None),
            "full" => Ok(SubelementHandlingMode::Full),
            other => Err(ZincError::Config {
                message: format!("unknown subelement handling mode '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HierarchicalGroup {
    pub region: RegionId,
    pub contains_all: bool,
    pub subelement_handling_mode: SubelementHandlingMode,
    pub local_node_group: Option<FieldId>,
    pub local_data_group: Option<FieldId>,
    pub local_element_groups: [Option<FieldId>; MAXIMUM_ELEMENT_XI_DIMENSIONS],
    /// domain field → domain selection group, in creation order
    pub domain_selection_groups: Vec<(FieldId, FieldId)>,
    /// child region → that region's group of the same name, in creation order
    pub child_region_groups: Vec<(RegionId, FieldId)>,
    pub change_detail: HierarchicalGroupChangeDetail,
}

impl HierarchicalGroup {
    fn new(region: RegionId, subelement_handling_mode: SubelementHandlingMode) -> Self {
        Self {
            region,
            contains_all: false,
            subelement_handling_mode,
            local_node_group: None,
            local_data_group: None,
            local_element_groups: [None; MAXIMUM_ELEMENT_XI_DIMENSIONS],
            domain_selection_groups: Vec::new(),
            child_region_groups: Vec::new(),
            change_detail: HierarchicalGroupChangeDetail::default(),
        }
    }

    pub fn local_element_group(&self, dimension: usize) -> Option<FieldId> {
        if dimension == 0 {
            return None;
        }
        self.local_element_groups.get(dimension - 1).copied().flatten()
    }

    pub fn local_subgroup_for(&self, domain: SubobjectDomain) -> Option<FieldId> {
        match domain {
            SubobjectDomain::Nodeset(NodesetDomain::Nodes) => self.local_node_group,
            SubobjectDomain::Nodeset(NodesetDomain::Datapoints) => self.local_data_group,
            SubobjectDomain::Mesh(dimension) => self.local_element_group(dimension),
        }
    }

    fn local_subgroup_slot(&mut self, domain: SubobjectDomain) -> Option<&mut Option<FieldId>> {
        match domain {
            SubobjectDomain::Nodeset(NodesetDomain::Nodes) => Some(&mut self.local_node_group),
            SubobjectDomain::Nodeset(NodesetDomain::Datapoints) => Some(&mut self.local_data_group),
            SubobjectDomain::Mesh(dimension) if dimension >= 1 => {
                self.local_element_groups.get_mut(dimension - 1)
            }
            SubobjectDomain::Mesh(_) => None,
        }
    }

    /// Node, data, element and domain selection subgroups.
    pub fn local_subgroups(&self) -> Vec<FieldId> {
        [self.local_node_group, self.local_data_group]
            .into_iter()
            .chain(self.local_element_groups)
            .flatten()
            .chain(self.domain_selection_groups.iter().map(|(_, group)| *group))
            .collect()
    }
}

impl Context {
    pub(crate) fn group(&self, field: FieldId) -> ZincResult<&HierarchicalGroup> {
        self.field(field)?
            .core
            .as_group()
            .ok_or_else(|| ZincError::argument("field is not a group"))
    }

    pub(crate) fn group_mut(&mut self, field: FieldId) -> ZincResult<&mut HierarchicalGroup> {
        self.field_mut(field)?
            .core
            .as_group_mut()
            .ok_or_else(|| ZincError::argument("field is not a group"))
    }

    /// Creates an empty group in the region's field directory.
    #[instrument(level = "debug", skip(self))]
    pub fn create_field_group(&mut self, region: RegionId) -> ZincResult<FieldId> {
        let mode = self.settings.default_subelement_handling_mode;
        self.insert_field(region, FieldCore::Group(HierarchicalGroup::new(region, mode)))
    }

    pub fn group_subelement_handling_mode(&self, group: FieldId) -> ZincResult<SubelementHandlingMode> {
        Ok(self.group(group)?.subelement_handling_mode)
    }

    /// Sets the mode on this group and every child-region group below it.
    pub fn group_set_subelement_handling_mode(
        &mut self,
        group: FieldId,
        mode: SubelementHandlingMode,
    ) -> ZincResult<()> {
        let g = self.group_mut(group)?;
        g.subelement_handling_mode = mode;
        let children: Vec<FieldId> = g.child_region_groups.iter().map(|(_, c)| *c).collect();
        for child in children {
            self.group_set_subelement_handling_mode(child, mode)?;
        }
        Ok(())
    }

    /// Group for `subregion` if one is linked: the group itself for its own
    /// region, otherwise the child-region group found in the maps.
    pub fn group_get_subregion_group(&mut self, group: FieldId, subregion: RegionId) -> Option<FieldId> {
        let found = self.get_or_create_subregion_group(group, subregion, true, false)?;
        self.access_field(found).ok()
    }

    /// Creates and links the group for `subregion` and any missing
    /// intermediate groups. A same-named group already in `subregion` is
    /// reconnected instead. Fails if a group is already linked for it or a
    /// non-group field holds the name.
    pub fn group_create_subregion_group(&mut self, group: FieldId, subregion: RegionId) -> Option<FieldId> {
        let created = self.get_or_create_subregion_group(group, subregion, false, true)?;
        self.access_field(created).ok()
    }

    /// Depth-first search of the child-region maps below `group`.
    fn find_linked_subregion_group(&self, group: FieldId, subregion: RegionId) -> Option<FieldId> {
        let g = self.group(group).ok()?;
        for &(child_region, child_group) in &g.child_region_groups {
            if child_region == subregion {
                return Some(child_group);
            }
            if self.contains_subregion(child_region, subregion) {
                if let Some(found) = self.find_linked_subregion_group(child_group, subregion) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Returns a non-accessed handle.
    #[instrument(level = "trace", skip(self))]
    pub(crate) fn get_or_create_subregion_group(
        &mut self,
        group: FieldId,
        subregion: RegionId,
        can_get: bool,
        can_create: bool,
    ) -> Option<FieldId> {
        if !(can_get || can_create) {
            return None;
        }
        let region = self.group(group).ok()?.region;
        if subregion == region {
            return can_get.then_some(group);
        }
        if let Some(linked) = self.find_linked_subregion_group(group, subregion) {
            return can_get.then_some(linked);
        }
        if !can_create {
            return None;
        }
        if !self.contains_subregion(region, subregion) {
            error!("get/create subregion group: subregion is not in region tree");
            return None;
        }
        let name = self.field_name(group)?.to_string();
        let existing = self.find_field_by_name_private(subregion, &name);
        let existing_group = existing.filter(|&f| self.field_kind(f) == Some(FieldKind::Group));
        if existing.is_some() && existing_group.is_none() {
            error!("get/create subregion group: found existing non-group field of name {}", name);
            return None;
        }
        self.begin_hierarchical_change(region).ok()?;
        let result = self.link_subregion_group(group, subregion, &name, existing_group);
        if let Err(e) = self.end_hierarchical_change(region) {
            error!("get/create subregion group: {}", e);
        }
        result
    }

    fn link_subregion_group(
        &mut self,
        group: FieldId,
        subregion: RegionId,
        name: &str,
        existing_group: Option<FieldId>,
    ) -> Option<FieldId> {
        let region = self.group(group).ok()?.region;
        let (subregion_group, created) = match existing_group {
            Some(existing) => (existing, false),
            None => {
                let mode = self.group(group).ok()?.subelement_handling_mode;
                let created = self
                    .insert_field(subregion, FieldCore::Group(HierarchicalGroup::new(subregion, mode)))
                    .ok()?;
                if let Err(e) = self.set_field_name(created, name) {
                    error!("get/create subregion group: cannot name group {}: {}", name, e);
                }
                (created, true)
            }
        };
        let parent_region = self.region_parent(subregion)?;
        let parent_group = if parent_region == region {
            Some(group)
        } else {
            self.get_or_create_subregion_group(group, parent_region, true, true)
        };
        let linked = match parent_group {
            Some(parent_group) => {
                let _ = self.access_field(subregion_group);
                if let Ok(pg) = self.group_mut(parent_group) {
                    pg.child_region_groups.push((subregion, subregion_group));
                    pg.change_detail.merge_non_local(GroupChange::Add);
                }
                self.mark_field_changed(parent_group, FieldChangeFlags::FULL_RESULT);
                true
            }
            None => false,
        };
        if created {
            let _ = self.release_field(subregion_group);
        }
        linked.then_some(subregion_group)
    }

    pub fn group_get_node_group(
        &mut self,
        group: FieldId,
        region: RegionId,
        domain: NodesetDomain,
    ) -> Option<FieldId> {
        let found = self.get_or_create_subobject_group(group, region, SubobjectDomain::Nodeset(domain), true, false)?;
        self.access_field(found).ok()
    }

    pub fn group_create_node_group(
        &mut self,
        group: FieldId,
        region: RegionId,
        domain: NodesetDomain,
    ) -> Option<FieldId> {
        let created = self.get_or_create_subobject_group(group, region, SubobjectDomain::Nodeset(domain), false, true)?;
        self.access_field(created).ok()
    }

    pub fn group_get_element_group(
        &mut self,
        group: FieldId,
        region: RegionId,
        dimension: usize,
    ) -> Option<FieldId> {
        let found = self.get_or_create_subobject_group(group, region, SubobjectDomain::Mesh(dimension), true, false)?;
        self.access_field(found).ok()
    }

    pub fn group_create_element_group(
        &mut self,
        group: FieldId,
        region: RegionId,
        dimension: usize,
    ) -> Option<FieldId> {
        let created = self.get_or_create_subobject_group(group, region, SubobjectDomain::Mesh(dimension), false, true)?;
        self.access_field(created).ok()
    }

    /// Subgroup of `owner` in its own region, created on demand.
    pub(crate) fn owner_subobject_group(
        &mut self,
        owner: FieldId,
        domain: SubobjectDomain,
        create: bool,
    ) -> Option<FieldId> {
        let region = self.group(owner).ok()?.region;
        self.get_or_create_subobject_group(owner, region, domain, true, create)
    }

    /// Returns a non-accessed handle. Subgroups in other regions are reached
    /// through the subregion group.
    #[instrument(level = "trace", skip(self))]
    pub(crate) fn get_or_create_subobject_group(
        &mut self,
        group: FieldId,
        subregion: RegionId,
        domain: SubobjectDomain,
        can_get: bool,
        can_create: bool,
    ) -> Option<FieldId> {
        let g = self.group(group).ok()?;
        if g.contains_all || !(can_get || can_create) {
            return None;
        }
        if let SubobjectDomain::Mesh(dimension) = domain {
            if dimension == 0 || dimension > MAXIMUM_ELEMENT_XI_DIMENSIONS {
                error!("get/create element group: invalid dimension {}", dimension);
                return None;
            }
        }
        let region = g.region;
        if subregion == region {
            self.begin_change(region).ok()?;
            let result = self.get_or_create_local_subobject_group(group, domain, can_get, can_create);
            if let Err(e) = self.end_change(region) {
                error!("get/create subobject group: {}", e);
            }
            return result;
        }
        self.begin_hierarchical_change(region).ok()?;
        let group_name = self.field_name(group)?.to_string();
        let derived_name = format!("{}.{}", group_name, domain.name());
        let derived_exists = self.find_field_by_name_private(subregion, &derived_name).is_some();
        let result = self
            .get_or_create_subregion_group(group, subregion, true, can_create || derived_exists)
            .and_then(|target| self.get_or_create_local_subobject_group(target, domain, can_get, can_create));
        if let Err(e) = self.end_hierarchical_change(region) {
            error!("get/create subobject group: {}", e);
        }
        result
    }

    fn get_or_create_local_subobject_group(
        &mut self,
        group: FieldId,
        domain: SubobjectDomain,
        can_get: bool,
        can_create: bool,
    ) -> Option<FieldId> {
        let g = self.group(group).ok()?;
        let region = g.region;
        if let Some(local) = g.local_subgroup_for(domain) {
            if !can_get {
                error!("create subobject group: found existing {} group field", domain.name());
            }
            return can_get.then_some(local);
        }
        let name = format!("{}.{}", self.field_name(group)?, domain.name());
        let existing = self.find_field_by_name_private(region, &name);
        let mut candidate = None;
        if let Some(existing) = existing {
            match self.subobject_group(existing) {
                Ok(subgroup) if subgroup.domain != domain => {
                    error!("get/create subobject group: found existing group field {} for wrong domain", name);
                }
                Ok(_) if !can_get => {
                    error!("create subobject group: found existing group field {}", name);
                }
                Ok(_) => candidate = Some(existing),
                Err(_) => {
                    error!("get/create subobject group: found existing non-group field {}", name);
                }
            }
        }
        let mut created = false;
        if existing.is_none() && can_create {
            let core = match domain {
                SubobjectDomain::Nodeset(_) => FieldCore::NodeGroup(SubobjectGroup::new(region, domain)),
                SubobjectDomain::Mesh(_) => FieldCore::ElementGroup(SubobjectGroup::new(region, domain)),
            };
            let field = self.insert_field(region, core).ok()?;
            if let Err(e) = self.set_field_name(field, &name) {
                error!("create subobject group: cannot name {}: {}", name, e);
            }
            candidate = Some(field);
            created = true;
        }
        let subgroup = candidate?;
        let _ = self.access_field(subgroup);
        self.set_subgroup_owner(subgroup, Some(group));
        if let Ok(g) = self.group_mut(group) {
            if let Some(slot) = g.local_subgroup_slot(domain) {
                *slot = Some(subgroup);
            }
            g.change_detail.merge_non_local(GroupChange::Add);
        }
        self.mark_field_changed(group, FieldChangeFlags::FULL_RESULT);
        if created {
            let _ = self.release_field(subgroup);
        }
        Some(subgroup)
    }

    pub fn group_get_domain_selection_group(&mut self, group: FieldId, domain_field: FieldId) -> Option<FieldId> {
        let found = self.get_or_create_domain_selection_group(group, domain_field, true, false)?;
        self.access_field(found).ok()
    }

    /// Creates the identifier-set subgroup for the domain of `domain_field`,
    /// which must be in the group's region.
    pub fn group_create_domain_selection_group(&mut self, group: FieldId, domain_field: FieldId) -> Option<FieldId> {
        let created = self.get_or_create_domain_selection_group(group, domain_field, false, true)?;
        self.access_field(created).ok()
    }

    fn get_or_create_domain_selection_group(
        &mut self,
        group: FieldId,
        domain_field: FieldId,
        can_get: bool,
        can_create: bool,
    ) -> Option<FieldId> {
        let g = self.group(group).ok()?;
        let region = g.region;
        if self.field_region(domain_field) != Some(region) {
            error!("get/create domain selection group: domain field is from another region");
            return None;
        }
        if let Some(&(_, existing)) = g.domain_selection_groups.iter().find(|(d, _)| *d == domain_field) {
            return can_get.then_some(existing);
        }
        let name = format!("{}.{}", self.field_name(group)?, self.field_name(domain_field)?);
        let existing = self.find_field_by_name_private(region, &name);
        let mut candidate = None;
        if let Some(existing) = existing {
            match self.field(existing).ok().and_then(|f| f.core.as_domain_selection()) {
                Some(selection) if selection.domain_field == domain_field && can_get => {
                    candidate = Some(existing)
                }
                Some(_) => {
                    error!("get/create domain selection group: cannot use existing field {}", name);
                }
                None => {
                    error!("get/create domain selection group: found existing non-group field {}", name);
                }
            }
        }
        let mut created = false;
        if existing.is_none() && can_create {
            let core = FieldCore::DomainSelection(DomainSelectionGroup {
                domain_field,
                identifiers: Default::default(),
                change_detail: Default::default(),
                owner_group: None,
            });
            let field = self.insert_field(region, core).ok()?;
            if let Err(e) = self.set_field_name(field, &name) {
                error!("create domain selection group: cannot name {}: {}", name, e);
            }
            candidate = Some(field);
            created = true;
        }
        let subgroup = candidate?;
        let _ = self.access_field(subgroup);
        self.set_subgroup_owner(subgroup, Some(group));
        if let Ok(g) = self.group_mut(group) {
            g.domain_selection_groups.push((domain_field, subgroup));
            g.change_detail.merge_non_local(GroupChange::Add);
        }
        if let Err(e) = self.field_changed(group, FieldChangeFlags::FULL_RESULT) {
            error!("create domain selection group: {}", e);
        }
        if created {
            let _ = self.release_field(subgroup);
        }
        Some(subgroup)
    }

    /// Marks every location in the group's own region as a member.
    pub fn group_add_local_region(&mut self, group: FieldId) -> ZincResult<()> {
        let g = self.group_mut(group)?;
        if g.contains_all {
            return Ok(());
        }
        g.contains_all = true;
        g.change_detail.change_add_local();
        self.field_changed(group, FieldChangeFlags::FULL_RESULT)
    }

    pub fn group_remove_local_region(&mut self, group: FieldId) -> ZincResult<()> {
        let g = self.group_mut(group)?;
        if !g.contains_all {
            return Ok(());
        }
        g.contains_all = false;
        g.change_detail.change_remove_local();
        self.field_changed(group, FieldChangeFlags::FULL_RESULT)
    }

    pub fn group_contains_local_region(&self, group: FieldId) -> bool {
        self.group(group).is_ok_and(|g| g.contains_all)
    }

    /// Sets `contains_all` on the (possibly new) group for `region`, with a
    /// single notification.
    #[instrument(level = "debug", skip(self))]
    pub fn group_add_region(&mut self, group: FieldId, region: RegionId) -> ZincResult<()> {
        let group_region = self.group(group)?.region;
        if !self.contains_subregion(group_region, region) {
            return Err(ZincError::argument("region is not in the group's region tree"));
        }
        self.begin_hierarchical_change(group_region)?;
        let result = match self.get_or_create_subregion_group(group, region, true, true) {
            Some(subgroup) => self.group_add_local_region(subgroup),
            None => Err(ZincError::general("cannot get or create subregion group")),
        };
        self.end_hierarchical_change(group_region)?;
        result
    }

    /// Clears the local membership of the group for `region`.
    #[instrument(level = "debug", skip(self))]
    pub fn group_remove_region(&mut self, group: FieldId, region: RegionId) -> ZincResult<()> {
        let group_region = self.group(group)?.region;
        if !self.contains_subregion(group_region, region) {
            return Err(ZincError::argument("region is not in the group's region tree"));
        }
        self.begin_hierarchical_change(group_region)?;
        let result = match self.get_or_create_subregion_group(group, region, true, false) {
            Some(subgroup) => self.group_clear_local(subgroup),
            None => Err(ZincError::NotFound),
        };
        self.end_hierarchical_change(group_region)?;
        result
    }

    pub fn group_contains_region(&mut self, group: FieldId, region: RegionId) -> bool {
        self.get_or_create_subregion_group(group, region, true, false)
            .is_some_and(|subgroup| self.group_contains_local_region(subgroup))
    }

    pub fn group_is_empty_local(&self, group: FieldId) -> bool {
        self.group(group).map_or(true, |g| {
            !g.contains_all
                && g.local_subgroups()
                    .into_iter()
                    .all(|subgroup| self.subgroup_is_empty(subgroup))
        })
    }

    pub fn group_is_empty_non_local(&self, group: FieldId) -> bool {
        self.group(group).map_or(true, |g| {
            g.child_region_groups
                .iter()
                .all(|&(_, child)| self.group_is_empty(child))
        })
    }

    pub fn group_is_empty(&self, group: FieldId) -> bool {
        self.group_is_empty_local(group) && self.group_is_empty_non_local(group)
    }

    /// True while the group has a change not yet flushed.
    pub fn group_was_modified(&self, group: FieldId) -> bool {
        self.group(group)
            .is_ok_and(|g| g.change_detail.summary() != GroupChange::None)
    }

    /// Records a pending remove if the subgroup has or had members, then
    /// optionally clears it and optionally drops it from the group.
    fn clear_remove_local_subgroup(
        &mut self,
        group: FieldId,
        subgroup: FieldId,
        clear: bool,
        remove: bool,
    ) -> ZincResult<()> {
        if !self.subgroup_is_empty(subgroup) || self.subgroup_change_detail(subgroup).is_change_remove() {
            self.group_mut(group)?.change_detail.change_remove_local();
        }
        if clear {
            self.subgroup_clear(subgroup)?;
        }
        if remove {
            let g = self.group_mut(group)?;
            for slot in [&mut g.local_node_group, &mut g.local_data_group]
                .into_iter()
                .chain(g.local_element_groups.iter_mut())
            {
                if *slot == Some(subgroup) {
                    *slot = None;
                }
            }
            g.domain_selection_groups.retain(|&(_, s)| s != subgroup);
            self.set_subgroup_owner(subgroup, None);
            self.release_field(subgroup)?;
        }
        Ok(())
    }

    /// Empties `contains_all` and every local subgroup; child-region groups
    /// are left alone.
    #[instrument(level = "debug", skip(self))]
    pub fn group_clear_local(&mut self, group: FieldId) -> ZincResult<()> {
        if self.group_is_empty_local(group) {
            return Ok(());
        }
        let region = self.group(group)?.region;
        self.begin_change(region)?;
        let result = self.clear_local_subgroups(group);
        self.mark_field_changed(group, FieldChangeFlags::FULL_RESULT);
        self.end_change(region)?;
        result
    }

    fn clear_local_subgroups(&mut self, group: FieldId) -> ZincResult<()> {
        let g = self.group_mut(group)?;
        // subgroups are all emptied, so no subelement cascade is needed
        let mode = std::mem::take(&mut g.subelement_handling_mode);
        if g.contains_all {
            g.contains_all = false;
            g.change_detail.change_remove_local();
        }
        let subgroups = g.local_subgroups();
        let mut result = Ok(());
        for subgroup in subgroups {
            result = self.clear_remove_local_subgroup(group, subgroup, true, false);
            if result.is_err() {
                break;
            }
        }
        self.group_mut(group)?.subelement_handling_mode = mode;
        result
    }

    /// Clears every child-region group, then the local membership.
    #[instrument(level = "debug", skip(self))]
    pub fn group_clear(&mut self, group: FieldId) -> ZincResult<()> {
        let region = self.group(group)?.region;
        self.begin_change(region)?;
        let children: Vec<FieldId> = self.group(group)?.child_region_groups.iter().map(|(_, c)| *c).collect();
        let mut result = Ok(());
        for child in children {
            result = self.group_clear(child);
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() {
            result = self.group_clear_local(group);
        }
        self.end_change(region)?;
        result
    }

    /// Drops empty local subgroups and empty child-region groups, children
    /// first so a child emptied by its own pruning is dropped too.
    #[instrument(level = "debug", skip(self))]
    pub fn group_remove_empty_subgroups(&mut self, group: FieldId) -> ZincResult<()> {
        let region = self.group(group)?.region;
        self.begin_change(region)?;
        let result = self.remove_empty_subgroups_private(group);
        self.end_change(region)?;
        result
    }

    fn remove_empty_subgroups_private(&mut self, group: FieldId) -> ZincResult<()> {
        let subgroups = self.group(group)?.local_subgroups();
        for subgroup in subgroups {
            if self.subgroup_is_empty(subgroup) {
                self.clear_remove_local_subgroup(group, subgroup, false, true)?;
            }
        }
        let children = self.group(group)?.child_region_groups.clone();
        for (child_region, child) in children {
            self.group_remove_empty_subgroups(child)?;
            if self.group_is_empty(child) {
                let pending = self.group(child)?.change_detail.summary();
                let g = self.group_mut(group)?;
                g.change_detail.merge_non_local(pending);
                g.child_region_groups.retain(|&(r, _)| r != child_region);
                self.mark_field_changed(group, FieldChangeFlags::FULL_RESULT);
                self.release_field(child)?;
            }
        }
        Ok(())
    }

    /// This group if it has local members, else the first non-empty group
    /// found depth-first among child-region groups. Returned with one access.
    pub fn group_get_first_non_empty_group(&mut self, group: FieldId) -> Option<FieldId> {
        let found = self.first_non_empty_group(group)?;
        self.access_field(found).ok()
    }

    fn first_non_empty_group(&self, group: FieldId) -> Option<FieldId> {
        if !self.group_is_empty_local(group) {
            return Some(group);
        }
        self.group(group)
            .ok()?
            .child_region_groups
            .iter()
            .find_map(|&(_, child)| self.first_non_empty_group(child))
    }

    /// Visits this group then every child-region group, pre-order. Returns
    /// false as soon as the visitor does.
    pub fn group_for_each_hierarchical<F>(&self, group: FieldId, mut visitor: F) -> bool
    where
        F: FnMut(FieldId) -> bool,
    {
        self.for_each_group_hierarchical(group, &mut visitor)
    }

    fn for_each_group_hierarchical(&self, group: FieldId, visitor: &mut dyn FnMut(FieldId) -> bool) -> bool {
        if !visitor(group) {
            return false;
        }
        let Ok(g) = self.group(group) else {
            return false;
        };
        g.child_region_groups
            .iter()
            .all(|&(_, child)| self.for_each_group_hierarchical(child, visitor))
    }

    /// Folds this cycle's subgroup changes into the group's local change.
    pub(crate) fn group_check_dependency(&mut self, group: FieldId) {
        let Ok(g) = self.group(group) else {
            return;
        };
        let mut merged = GroupChange::None;
        let mut changed = false;
        for subgroup in g.local_subgroups() {
            let Ok(field) = self.field(subgroup) else {
                continue;
            };
            if field.change.intersects(FieldChangeFlags::RESULT) {
                merged = merged.merge(self.subgroup_change_detail(subgroup).summary());
                changed = true;
            }
        }
        if changed {
            if let Ok(g) = self.group_mut(group) {
                g.change_detail.merge_local(merged);
            }
            self.mark_field_changed(group, FieldChangeFlags::FULL_RESULT);
        }
    }

    /// Drops the child-region group for `child_region` from `group`.
    fn remove_child_group(&mut self, group: FieldId, child_region: RegionId) -> ZincResult<()> {
        let g = self.group_mut(group)?;
        let Some(position) = g.child_region_groups.iter().position(|&(r, _)| r == child_region) else {
            return Ok(());
        };
        let (_, child) = g.child_region_groups.remove(position);
        if !self.group_is_empty(child) {
            self.group_mut(group)?.change_detail.merge_non_local(GroupChange::Remove);
            self.mark_field_changed(group, FieldChangeFlags::FULL_RESULT);
        }
        debug!("dropped subregion group for removed region");
        self.release_field(child)
    }

    /// Every group in `parent` forgets its group for the departing child.
    pub(crate) fn subregion_removed(&mut self, parent: RegionId, child_region: RegionId) -> ZincResult<()> {
        for field in self.fields(parent) {
            if self.field_kind(field) == Some(FieldKind::Group) {
                self.remove_child_group(field, child_region)?;
            }
        }
        Ok(())
    }
}
