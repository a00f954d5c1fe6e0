//! Field manager change protocol: accumulate change flags while a region is
//! caching, then flush one message per region and pass group changes up to
//! the parent region's groups.

use tracing::{instrument, trace, warn};

use crate::domain::{FieldChangeDetail, FieldChangeFlags, GroupChange};
use crate::domain::ZincResult;
use crate::field::{FieldCore, FieldId, FieldKind};
use crate::region::{Context, RegionId};

/// One field's entry in a manager message.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: FieldId,
    pub name: String,
    pub flags: FieldChangeFlags,
    pub detail: Option<FieldChangeDetail>,
}

/// All field changes of one region flushed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldManagerMessage {
    changes: Vec<FieldChange>,
}

impl FieldManagerMessage {
    pub fn changes(&self) -> &[FieldChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Union of the flags of every entry.
    pub fn summary(&self) -> FieldChangeFlags {
        self.changes
            .iter()
            .fold(FieldChangeFlags::empty(), |acc, c| acc | c.flags)
    }

    pub fn field_change(&self, field: FieldId) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    pub fn field_change_flags(&self, field: FieldId) -> FieldChangeFlags {
        self.field_change(field)
            .map_or(FieldChangeFlags::empty(), |c| c.flags)
    }
}

/// Delivered to field callbacks of a region once per flush.
#[derive(Debug, Clone)]
pub struct FieldModuleEvent {
    pub region: RegionId,
    pub message: FieldManagerMessage,
}

impl FieldModuleEvent {
    pub fn summary(&self) -> FieldChangeFlags {
        self.message.summary()
    }

    pub fn field_change_flags(&self, field: FieldId) -> FieldChangeFlags {
        self.message.field_change_flags(field)
    }

    pub fn change_detail(&self, field: FieldId) -> Option<FieldChangeDetail> {
        self.message.field_change(field).and_then(|c| c.detail)
    }
}

impl Context {
    pub(crate) fn mark_field_changed(&mut self, field: FieldId, flags: FieldChangeFlags) {
        if let Ok(f) = self.field_mut(field) {
            f.change |= flags;
        }
    }

    /// Marks a change and flushes unless the field's region is caching.
    pub(crate) fn field_changed(&mut self, field: FieldId, flags: FieldChangeFlags) -> ZincResult<()> {
        let region = self.field(field)?.region;
        self.begin_change(region)?;
        self.mark_field_changed(field, flags);
        self.end_change(region)
    }

    /// True if the field has an unflushed change.
    pub fn field_has_pending_change(&self, field: FieldId) -> bool {
        self.field(field).is_ok_and(|f| !f.change.is_empty())
    }

    #[instrument(level = "trace", skip(self))]
    pub(crate) fn flush_field_changes(&mut self, region: RegionId) -> ZincResult<()> {
        let field_ids = self.fields(region);

        if self.fe_region(region)?.has_removals() {
            for &field in &field_ids {
                if matches!(
                    self.field_kind(field),
                    Some(FieldKind::NodeGroup) | Some(FieldKind::ElementGroup)
                ) {
                    self.subobject_check_dependency(field);
                }
            }
        }

        for &field in &field_ids {
            if self.field_kind(field) == Some(FieldKind::Group) {
                self.group_check_dependency(field);
            }
        }

        self.propagate_source_changes(&field_ids);

        let mut message = FieldManagerMessage::default();
        for &field in &field_ids {
            let Ok(f) = self.field_mut(field) else {
                continue;
            };
            if f.change.is_empty() {
                continue;
            }
            let flags = std::mem::take(&mut f.change);
            let detail = extract_change_detail(&mut f.core);
            message.changes.push(FieldChange {
                field,
                name: f.name.clone(),
                flags,
                detail,
            });
        }
        let node = self.node_mut(region)?;
        for (field, name) in std::mem::take(&mut node.removed_fields) {
            message.changes.push(FieldChange {
                field,
                name,
                flags: FieldChangeFlags::REMOVE,
                detail: None,
            });
        }
        node.fe_region.clear_change_logs();

        if message.is_empty() {
            return Ok(());
        }
        trace!("field manager message: {} change(s)", message.changes.len());
        let event = FieldModuleEvent { region, message };
        let mut callbacks = std::mem::take(&mut self.node_mut(region)?.field_callbacks);
        for (_, callback) in callbacks.iter_mut() {
            callback(&event);
        }
        if let Ok(node) = self.node_mut(region) {
            callbacks.append(&mut node.field_callbacks);
            node.field_callbacks = callbacks;
        }

        if event
            .summary()
            .intersects(FieldChangeFlags::RESULT | FieldChangeFlags::ADD)
        {
            if let Some(parent) = self.region_parent(region) {
                self.propagate_hierarchical_field_changes(parent, &event.message)?;
            }
        }
        Ok(())
    }

    /// Marks fields whose sources changed, until nothing more changes.
    fn propagate_source_changes(&mut self, field_ids: &[FieldId]) {
        loop {
            let mut dependents = Vec::new();
            for &field in field_ids {
                let Ok(f) = self.field(field) else {
                    continue;
                };
                if f.change.intersects(FieldChangeFlags::RESULT) {
                    continue;
                }
                let sources_changed = f.core.source_fields().into_iter().any(|source| {
                    self.field(source)
                        .is_ok_and(|s| s.change.intersects(FieldChangeFlags::RESULT))
                });
                if sources_changed {
                    dependents.push(field);
                }
            }
            if dependents.is_empty() {
                break;
            }
            for field in dependents {
                self.mark_field_changed(field, FieldChangeFlags::FULL_RESULT);
            }
        }
    }

    /// Merges the change of a child-region group named in the message into
    /// the non-local change of each group in `parent` holding it. Only the
    /// first changed child group per parent group is merged.
    #[instrument(level = "trace", skip(self, message))]
    pub(crate) fn propagate_hierarchical_field_changes(
        &mut self,
        parent: RegionId,
        message: &FieldManagerMessage,
    ) -> ZincResult<()> {
        self.begin_change(parent)?;
        for group_field in self.fields(parent) {
            let Some(children) = self
                .field(group_field)
                .ok()
                .and_then(|f| f.core.as_group())
                .map(|g| g.child_region_groups.clone())
            else {
                continue;
            };
            for (_, child_group) in children {
                let Some(change) = message.field_change(child_group) else {
                    continue;
                };
                match change.detail {
                    Some(FieldChangeDetail::Hierarchical(detail)) => {
                        let summary = detail.summary();
                        if summary != GroupChange::None {
                            if let Some(group) = self
                                .field_mut(group_field)
                                .ok()
                                .and_then(|f| f.core.as_group_mut())
                            {
                                group.change_detail.merge_non_local(summary);
                            }
                            self.mark_field_changed(group_field, FieldChangeFlags::FULL_RESULT);
                        }
                    }
                    Some(FieldChangeDetail::Subobject(_)) => {
                        warn!("sub-region group changes could not be propagated");
                    }
                    None => {}
                }
                break;
            }
        }
        self.end_change(parent)
    }
}

/// Takes the pending change detail of a group core, leaving it cleared.
fn extract_change_detail(core: &mut FieldCore) -> Option<FieldChangeDetail> {
    match core {
        FieldCore::NodeGroup(group) | FieldCore::ElementGroup(group) => {
            let detail = group.change_detail;
            group.change_detail.clear();
            (detail.summary() != GroupChange::None).then_some(FieldChangeDetail::Subobject(detail))
        }
        FieldCore::DomainSelection(group) => {
            let detail = group.change_detail;
            group.change_detail.clear();
            (detail.summary() != GroupChange::None).then_some(FieldChangeDetail::Subobject(detail))
        }
        FieldCore::Group(group) => {
            let detail = group.change_detail;
            group.change_detail.clear();
            (detail.summary() != GroupChange::None).then_some(FieldChangeDetail::Hierarchical(detail))
        }
        _ => None,
    }
}
