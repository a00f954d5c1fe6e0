//! Change summaries for group fields and field manager change flags.

use bitflags::bitflags;

/// How a group's membership changed since the last notification.
///
/// Merging is a bitwise union: `Add` and `Remove` together give `AddAndRemove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupChange {
    #[default]
    None,
    Add,
    Remove,
    AddAndRemove,
}

impl GroupChange {
    fn bits(self) -> u8 {
        match self {
            GroupChange::None => 0,
            GroupChange::Add => 1,
            GroupChange::Remove => 2,
            GroupChange::AddAndRemove => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            1 => GroupChange::Add,
            2 => GroupChange::Remove,
            3 => GroupChange::AddAndRemove,
            _ => GroupChange::None,
        }
    }

    pub fn merge(self, other: GroupChange) -> GroupChange {
        GroupChange::from_bits(self.bits() | other.bits())
    }

    pub fn has_add(self) -> bool {
        self.bits() & 1 != 0
    }

    pub fn has_remove(self) -> bool {
        self.bits() & 2 != 0
    }
}

/// Change record of a node, element or domain selection group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubobjectGroupChangeDetail {
    change: GroupChange,
}

impl SubobjectGroupChangeDetail {
    pub fn change_add(&mut self) {
        self.change = self.change.merge(GroupChange::Add);
    }

    pub fn change_remove(&mut self) {
        self.change = self.change.merge(GroupChange::Remove);
    }

    pub fn merge(&mut self, change: GroupChange) {
        self.change = self.change.merge(change);
    }

    pub fn summary(&self) -> GroupChange {
        self.change
    }

    pub fn is_change_remove(&self) -> bool {
        self.change.has_remove()
    }

    pub fn clear(&mut self) {
        self.change = GroupChange::None;
    }
}

/// Change record of a hierarchical group.
///
/// `local` covers the group's own subgroups in its region; `non_local` covers
/// changes bubbled up from child-region groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HierarchicalGroupChangeDetail {
    local: GroupChange,
    non_local: GroupChange,
}

impl HierarchicalGroupChangeDetail {
    pub fn change_add_local(&mut self) {
        self.local = self.local.merge(GroupChange::Add);
    }

    pub fn change_remove_local(&mut self) {
        self.local = self.local.merge(GroupChange::Remove);
    }

    pub fn merge_local(&mut self, change: GroupChange) {
        self.local = self.local.merge(change);
    }

    pub fn merge_non_local(&mut self, change: GroupChange) {
        self.non_local = self.non_local.merge(change);
    }

    pub fn local(&self) -> GroupChange {
        self.local
    }

    pub fn non_local(&self) -> GroupChange {
        self.non_local
    }

    pub fn summary(&self) -> GroupChange {
        self.local.merge(self.non_local)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Change detail attached to one entry of a field manager message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChangeDetail {
    Subobject(SubobjectGroupChangeDetail),
    Hierarchical(HierarchicalGroupChangeDetail),
}

impl FieldChangeDetail {
    pub fn summary(&self) -> GroupChange {
        match self {
            FieldChangeDetail::Subobject(detail) => detail.summary(),
            FieldChangeDetail::Hierarchical(detail) => detail.summary(),
        }
    }
}

bitflags! {
    /// Field manager change flags for one field within a message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldChangeFlags: u32 {
        const ADD = 1 << 0;
        const REMOVE = 1 << 1;
        const IDENTIFIER = 1 << 2;
        const DEFINITION = 1 << 3;
        const FULL_RESULT = 1 << 4;
        const PARTIAL_RESULT = 1 << 5;
        const RESULT = Self::FULL_RESULT.bits() | Self::PARTIAL_RESULT.bits();
    }
}
