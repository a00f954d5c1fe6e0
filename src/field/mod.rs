//! Fields: named, reference-counted entries of a region's field directory
//! whose behaviour is one of a closed set of cores.

mod cache;
mod element_group;
mod group;
mod manager;
mod node_group;
mod subobject;

use generational_arena::Index;
use tracing::{debug, error, instrument, trace};

use crate::domain::{FieldChangeFlags, ZincError, ZincResult};
use crate::region::{Context, RegionId};

pub use cache::{FieldCache, Location};
pub use group::SubelementHandlingMode;
pub use manager::{FieldChange, FieldManagerMessage, FieldModuleEvent};

pub(crate) use group::HierarchicalGroup;
pub(crate) use subobject::{DomainSelectionGroup, SubobjectDomain, SubobjectGroup};

/// Handle of a field. Functions returning a `FieldId` hand the caller one
/// access, to be given back with `release_field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(pub(crate) Index);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Constant,
    Not,
    And,
    Or,
    NodeGroup,
    ElementGroup,
    Group,
    DomainSelection,
}

#[derive(Debug, Clone)]
pub(crate) enum FieldCore {
    Constant(f64),
    Not(FieldId),
    And(FieldId, FieldId),
    Or(FieldId, FieldId),
    NodeGroup(SubobjectGroup),
    ElementGroup(SubobjectGroup),
    Group(HierarchicalGroup),
    DomainSelection(DomainSelectionGroup),
}

impl FieldCore {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldCore::Constant(_) => FieldKind::Constant,
            FieldCore::Not(_) => FieldKind::Not,
            FieldCore::And(..) => FieldKind::And,
            FieldCore::Or(..) => FieldKind::Or,
            FieldCore::NodeGroup(_) => FieldKind::NodeGroup,
            FieldCore::ElementGroup(_) => FieldKind::ElementGroup,
            FieldCore::Group(_) => FieldKind::Group,
            FieldCore::DomainSelection(_) => FieldKind::DomainSelection,
        }
    }

    pub fn source_fields(&self) -> Vec<FieldId> {
        match self {
            FieldCore::Not(a) => vec![*a],
            FieldCore::And(a, b) | FieldCore::Or(a, b) => vec![*a, *b],
            _ => Vec::new(),
        }
    }

    pub fn as_group(&self) -> Option<&HierarchicalGroup> {
        match self {
            FieldCore::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut HierarchicalGroup> {
        match self {
            FieldCore::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Node or element group.
    pub fn as_subobject_group(&self) -> Option<&SubobjectGroup> {
        match self {
            FieldCore::NodeGroup(group) | FieldCore::ElementGroup(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_subobject_group_mut(&mut self) -> Option<&mut SubobjectGroup> {
        match self {
            FieldCore::NodeGroup(group) | FieldCore::ElementGroup(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_domain_selection(&self) -> Option<&DomainSelectionGroup> {
        match self {
            FieldCore::DomainSelection(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_domain_selection_mut(&mut self) -> Option<&mut DomainSelectionGroup> {
        match self {
            FieldCore::DomainSelection(group) => Some(group),
            _ => None,
        }
    }
}

pub(crate) struct Field {
    pub name: String,
    pub region: RegionId,
    pub access_count: usize,
    pub managed: bool,
    pub core: FieldCore,
    pub change: FieldChangeFlags,
}

impl Context {
    pub(crate) fn field(&self, id: FieldId) -> ZincResult<&Field> {
        self.fields
            .get(id.0)
            .ok_or_else(|| ZincError::argument("field no longer exists"))
    }

    pub(crate) fn field_mut(&mut self, id: FieldId) -> ZincResult<&mut Field> {
        self.fields
            .get_mut(id.0)
            .ok_or_else(|| ZincError::argument("field no longer exists"))
    }

    /// Adds a field to the region's directory under a temporary name.
    /// The caller receives the single access.
    pub(crate) fn insert_field(&mut self, region: RegionId, core: FieldCore) -> ZincResult<FieldId> {
        let prefix = self.settings.temporary_field_prefix.clone();
        let node = self.node_mut(region)?;
        let name = loop {
            let candidate = format!("{}{}", prefix, node.next_temporary_field);
            node.next_temporary_field += 1;
            if !node.fields.contains_key(&candidate) {
                break candidate;
            }
        };
        let id = FieldId(self.fields.insert(Field {
            name: name.clone(),
            region,
            access_count: 1,
            managed: false,
            core,
            change: FieldChangeFlags::empty(),
        }));
        self.node_mut(region)?.fields.insert(name, id);
        trace!("created field {:?}", id);
        self.field_changed(id, FieldChangeFlags::ADD)?;
        Ok(id)
    }

    pub fn field_exists(&self, field: FieldId) -> bool {
        self.fields.contains(field.0)
    }

    pub fn field_name(&self, field: FieldId) -> Option<&str> {
        self.field(field).ok().map(|f| f.name.as_str())
    }

    pub fn field_region(&self, field: FieldId) -> Option<RegionId> {
        self.field(field).ok().map(|f| f.region)
    }

    pub fn field_kind(&self, field: FieldId) -> Option<FieldKind> {
        self.field(field).ok().map(|f| f.core.kind())
    }

    pub fn field_access_count(&self, field: FieldId) -> usize {
        self.field(field).map_or(0, |f| f.access_count)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_field_name(&mut self, field: FieldId, name: &str) -> ZincResult<()> {
        if name.is_empty() {
            return Err(ZincError::argument("field name must not be empty"));
        }
        let (region, old_name) = {
            let f = self.field(field)?;
            (f.region, f.name.clone())
        };
        if old_name == name {
            return Ok(());
        }
        let node = self.node_mut(region)?;
        if node.fields.contains_key(name) {
            return Err(ZincError::AlreadyExists);
        }
        node.fields.remove(&old_name);
        node.fields.insert(name.to_string(), field);
        self.field_mut(field)?.name = name.to_string();
        self.field_changed(field, FieldChangeFlags::IDENTIFIER)
    }

    /// Field of that name in the region, with one access for the caller.
    pub fn find_field_by_name(&mut self, region: RegionId, name: &str) -> Option<FieldId> {
        let field = self.find_field_by_name_private(region, name)?;
        self.access_field(field).ok()
    }

    pub(crate) fn find_field_by_name_private(&self, region: RegionId, name: &str) -> Option<FieldId> {
        self.node(region).ok()?.fields.get(name).copied()
    }

    /// Fields of the region in name order.
    pub fn fields(&self, region: RegionId) -> Vec<FieldId> {
        self.node(region)
            .map(|n| n.fields.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn access_field(&mut self, field: FieldId) -> ZincResult<FieldId> {
        self.field_mut(field)?.access_count += 1;
        Ok(field)
    }

    /// Gives back one access; an unmanaged field with no accesses is destroyed.
    pub fn release_field(&mut self, field: FieldId) -> ZincResult<()> {
        let f = self.field_mut(field)?;
        f.access_count = f.access_count.saturating_sub(1);
        if f.access_count == 0 && !f.managed {
            self.destroy_field(field);
        }
        Ok(())
    }

    pub fn is_field_managed(&self, field: FieldId) -> bool {
        self.field(field).map_or(false, |f| f.managed)
    }

    /// A managed field stays in its region's directory without any access.
    pub fn set_field_managed(&mut self, field: FieldId, managed: bool) -> ZincResult<()> {
        let f = self.field_mut(field)?;
        f.managed = managed;
        if !managed && f.access_count == 0 {
            self.destroy_field(field);
        }
        Ok(())
    }

    /// True if `field` is `other` or evaluates it through its sources.
    pub fn field_depends_on(&self, field: FieldId, other: FieldId) -> bool {
        if field == other {
            return true;
        }
        self.field(field).map_or(false, |f| {
            f.core
                .source_fields()
                .into_iter()
                .any(|source| self.field_depends_on(source, other))
        })
    }

    fn destroy_field(&mut self, field: FieldId) {
        let Some(removed) = self.fields.remove(field.0) else {
            return;
        };
        debug!("destroying field '{}'", removed.name);
        let region = removed.region;
        if let Ok(node) = self.node_mut(region) {
            node.fields.remove(&removed.name);
            node.removed_fields.push((field, removed.name.clone()));
        }
        let mut released = removed.core.source_fields();
        if let FieldCore::Group(group) = removed.core {
            for subgroup in group.local_subgroups() {
                self.set_subgroup_owner(subgroup, None);
                released.push(subgroup);
            }
            released.extend(group.child_region_groups.iter().map(|(_, child)| *child));
        }
        for source in released {
            let _ = self.release_field(source);
        }
        if self.begin_change(region).is_ok() {
            if let Err(e) = self.end_change(region) {
                error!("destroy field '{}': {}", removed.name, e);
            }
        }
    }

    /// Empties a group's child-region map, returning the handles it held.
    pub(crate) fn take_child_region_groups(&mut self, field: FieldId) -> Vec<FieldId> {
        self.field_mut(field)
            .ok()
            .and_then(|f| f.core.as_group_mut())
            .map(|group| {
                std::mem::take(&mut group.child_region_groups)
                    .into_iter()
                    .map(|(_, child)| child)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn create_field_with_sources(
        &mut self,
        sources: &[FieldId],
        core: FieldCore,
    ) -> ZincResult<FieldId> {
        let mut region = None;
        for &source in sources {
            let source_region = self.field(source)?.region;
            if region.is_some_and(|r| r != source_region) {
                return Err(ZincError::argument("source fields are from different regions"));
            }
            region = Some(source_region);
        }
        let region = region.ok_or_else(|| ZincError::argument("no source fields"))?;
        for &source in sources {
            self.access_field(source)?;
        }
        self.insert_field(region, core)
    }

    pub fn create_field_constant(&mut self, region: RegionId, value: f64) -> ZincResult<FieldId> {
        self.insert_field(region, FieldCore::Constant(value))
    }

    /// 1 where the source is zero, 0 elsewhere.
    pub fn create_field_not(&mut self, source: FieldId) -> ZincResult<FieldId> {
        self.create_field_with_sources(&[source], FieldCore::Not(source))
    }

    pub fn create_field_and(&mut self, a: FieldId, b: FieldId) -> ZincResult<FieldId> {
        self.create_field_with_sources(&[a, b], FieldCore::And(a, b))
    }

    pub fn create_field_or(&mut self, a: FieldId, b: FieldId) -> ZincResult<FieldId> {
        self.create_field_with_sources(&[a, b], FieldCore::Or(a, b))
    }

    /// The field itself if it is a hierarchical group, with one access.
    pub fn cast_group(&mut self, field: FieldId) -> Option<FieldId> {
        self.cast_kind(field, FieldKind::Group)
    }

    pub fn cast_node_group(&mut self, field: FieldId) -> Option<FieldId> {
        self.cast_kind(field, FieldKind::NodeGroup)
    }

    pub fn cast_element_group(&mut self, field: FieldId) -> Option<FieldId> {
        self.cast_kind(field, FieldKind::ElementGroup)
    }

    fn cast_kind(&mut self, field: FieldId, kind: FieldKind) -> Option<FieldId> {
        if self.field_kind(field)? != kind {
            return None;
        }
        self.access_field(field).ok()
    }
}
