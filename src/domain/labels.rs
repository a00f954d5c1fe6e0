//! Label identifiers, dense label indices and membership sets over them.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::domain::error::{ZincError, ZincResult};

/// Application-visible identifier of a node or element.
pub type LabelIdentifier = i32;
/// Dense position of a label in its `Labels` index space.
pub type LabelIndex = usize;

bitflags! {
    /// What happened to a `Labels` since its change log was last cleared.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LabelChange: u8 {
        const ADD = 0b001;
        const REMOVE = 0b010;
        const IDENTIFIER = 0b100;
    }
}

/// Maps identifiers to dense indices for one nodeset or mesh.
///
/// Removing a label marks its slot invalid; indices are never reused, so a
/// membership bit left behind for a removed label can never match a new one.
#[derive(Debug, Clone, Default)]
pub struct Labels {
    identifiers: Vec<Option<LabelIdentifier>>,
    lookup: BTreeMap<LabelIdentifier, LabelIndex>,
    contiguous: bool,
    change_log: LabelChange,
}

impl Labels {
    pub fn new() -> Self {
        Self {
            identifiers: Vec::new(),
            lookup: BTreeMap::new(),
            contiguous: true,
            change_log: LabelChange::empty(),
        }
    }

    /// Number of live labels.
    pub fn size(&self) -> usize {
        self.lookup.len()
    }

    /// Number of index slots handed out, including removed ones.
    pub fn index_size(&self) -> usize {
        self.identifiers.len()
    }

    /// True while every live label has identifier `index + 1` with no holes.
    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    pub fn identifier(&self, index: LabelIndex) -> Option<LabelIdentifier> {
        self.identifiers.get(index).copied().flatten()
    }

    pub fn is_valid_index(&self, index: LabelIndex) -> bool {
        self.identifier(index).is_some()
    }

    pub fn find_label_by_identifier(&self, identifier: LabelIdentifier) -> Option<LabelIndex> {
        self.lookup.get(&identifier).copied()
    }

    /// First identifier not in use, starting from `start` (at least 1).
    /// `None` when every identifier from `start` up to `i32::MAX` is taken.
    pub fn first_free_identifier(&self, start: LabelIdentifier) -> Option<LabelIdentifier> {
        let mut candidate = start.max(1);
        for (&identifier, _) in self.lookup.range(candidate..) {
            if identifier != candidate {
                break;
            }
            candidate = candidate.checked_add(1)?;
        }
        Some(candidate)
    }

    /// Creates a label; `None` picks the next free identifier.
    pub fn create_label(&mut self, identifier: Option<LabelIdentifier>) -> ZincResult<LabelIndex> {
        let identifier = match identifier {
            Some(id) if id < 0 => {
                return Err(ZincError::argument(format!("negative identifier {}", id)))
            }
            Some(id) => id,
            None => self
                .lookup
                .keys()
                .next_back()
                .map_or(Some(1), |&id| id.checked_add(1))
                .and_then(|start| self.first_free_identifier(start))
                .or_else(|| self.first_free_identifier(1))
                .ok_or_else(|| ZincError::argument("no free identifier left"))?,
        };
        if self.lookup.contains_key(&identifier) {
            return Err(ZincError::AlreadyExists);
        }
        let index = self.identifiers.len();
        self.identifiers.push(Some(identifier));
        self.lookup.insert(identifier, index);
        if identifier as i64 != index as i64 + 1 {
            self.contiguous = false;
        }
        self.change_log |= LabelChange::ADD;
        Ok(index)
    }

    pub fn remove_label(&mut self, index: LabelIndex) -> ZincResult<()> {
        let identifier = self.identifier(index).ok_or(ZincError::NotFound)?;
        self.lookup.remove(&identifier);
        self.identifiers[index] = None;
        self.contiguous = false;
        self.change_log |= LabelChange::REMOVE;
        Ok(())
    }

    pub fn set_identifier(&mut self, index: LabelIndex, identifier: LabelIdentifier) -> ZincResult<()> {
        let old = self.identifier(index).ok_or(ZincError::NotFound)?;
        if old == identifier {
            return Ok(());
        }
        if self.lookup.contains_key(&identifier) {
            return Err(ZincError::AlreadyExists);
        }
        self.lookup.remove(&old);
        self.lookup.insert(identifier, index);
        self.identifiers[index] = Some(identifier);
        if identifier as i64 != index as i64 + 1 {
            self.contiguous = false;
        }
        self.change_log |= LabelChange::IDENTIFIER;
        Ok(())
    }

    /// Live labels as `(index, identifier)` in index order.
    pub fn iter(&self) -> impl Iterator<Item = (LabelIndex, LabelIdentifier)> + '_ {
        self.identifiers
            .iter()
            .enumerate()
            .filter_map(|(index, identifier)| identifier.map(|id| (index, id)))
    }

    pub fn change_log(&self) -> LabelChange {
        self.change_log
    }

    pub fn clear_change_log(&mut self) {
        self.change_log = LabelChange::empty();
    }
}

/// Membership set over the indices of one `Labels`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelsGroup {
    members: Vec<bool>,
    size: usize,
}

impl LabelsGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty group with room for `index_size` slots; reports `Memory` if the
    /// allocation cannot be made.
    pub fn try_with_index_size(index_size: usize) -> ZincResult<Self> {
        let mut members = Vec::new();
        members
            .try_reserve_exact(index_size)
            .map_err(|e| ZincError::Memory(format!("labels group of {} slots: {}", index_size, e)))?;
        Ok(Self { members, size: 0 })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn has_index(&self, index: LabelIndex) -> bool {
        self.members.get(index).copied().unwrap_or(false)
    }

    /// Adds or removes `index`; `AlreadyExists`/`NotFound` when nothing changed.
    pub fn set_index(&mut self, index: LabelIndex, in_group: bool) -> ZincResult<()> {
        if in_group {
            if self.has_index(index) {
                return Err(ZincError::AlreadyExists);
            }
            if index >= self.members.len() {
                self.members.resize(index + 1, false);
            }
            self.members[index] = true;
            self.size += 1;
        } else {
            if !self.has_index(index) {
                return Err(ZincError::NotFound);
            }
            self.members[index] = false;
            self.size -= 1;
            if self.size == 0 {
                self.members.clear();
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.size = 0;
    }

    pub fn swap(&mut self, other: &mut LabelsGroup) {
        std::mem::swap(self, other);
    }

    /// Member indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = LabelIndex> + '_ {
        self.members
            .iter()
            .enumerate()
            .filter_map(|(index, &member)| member.then_some(index))
    }

    /// First member after `index`, or the first member when `index` is `None`.
    pub fn increment_index(&self, index: Option<LabelIndex>) -> Option<LabelIndex> {
        let start = index.map_or(0, |i| i + 1);
        (start..self.members.len()).find(|&i| self.members[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_auto_identifiers_when_created_then_contiguous() {
        let mut labels = Labels::new();
        for _ in 0..3 {
            labels.create_label(None).unwrap();
        }
        assert_eq!(labels.size(), 3);
        assert!(labels.is_contiguous());
        assert_eq!(labels.identifier(2), Some(3));
    }

    #[test]
    fn given_removed_label_when_looked_up_then_index_is_invalid_and_not_reused() {
        let mut labels = Labels::new();
        let a = labels.create_label(Some(5)).unwrap();
        let b = labels.create_label(Some(7)).unwrap();
        labels.remove_label(a).unwrap();

        assert_eq!(labels.identifier(a), None);
        assert_eq!(labels.find_label_by_identifier(5), None);
        assert_eq!(labels.index_size(), 2);
        assert!(labels.change_log().contains(LabelChange::REMOVE));

        let c = labels.create_label(Some(5)).unwrap();
        assert_ne!(c, a);
        assert_eq!(labels.find_label_by_identifier(7), Some(b));
    }

    #[test]
    fn given_last_label_removed_when_recreated_then_new_index() {
        let mut labels = Labels::new();
        let a = labels.create_label(Some(10)).unwrap();
        labels.remove_label(a).unwrap();
        assert_eq!(labels.size(), 0);

        let b = labels.create_label(Some(9)).unwrap();

        assert_ne!(a, b);
        assert!(!labels.is_valid_index(a));
        assert_eq!(labels.index_size(), 2);
    }

    #[test]
    fn given_duplicate_identifier_when_created_then_already_exists() {
        let mut labels = Labels::new();
        labels.create_label(Some(1)).unwrap();
        assert_eq!(labels.create_label(Some(1)), Err(ZincError::AlreadyExists));
    }

    #[test]
    fn given_gap_when_first_free_identifier_then_fills_gap() {
        let mut labels = Labels::new();
        labels.create_label(Some(1)).unwrap();
        labels.create_label(Some(2)).unwrap();
        labels.create_label(Some(4)).unwrap();
        assert_eq!(labels.first_free_identifier(1), Some(3));
        assert_eq!(labels.first_free_identifier(4), Some(5));
    }

    #[test]
    fn given_max_identifier_taken_when_auto_created_then_lowest_gap_used() {
        let mut labels = Labels::new();
        labels.create_label(Some(i32::MAX)).unwrap();
        labels.create_label(Some(1)).unwrap();

        let index = labels.create_label(None).unwrap();

        assert_eq!(labels.identifier(index), Some(2));
        assert_eq!(labels.first_free_identifier(i32::MAX), None);
    }

    #[test]
    fn given_group_when_set_twice_then_reports_no_op() {
        let mut group = LabelsGroup::new();
        assert_eq!(group.set_index(4, true), Ok(()));
        assert_eq!(group.set_index(4, true), Err(ZincError::AlreadyExists));
        assert_eq!(group.size(), 1);
        assert_eq!(group.set_index(4, false), Ok(()));
        assert_eq!(group.set_index(4, false), Err(ZincError::NotFound));
        assert!(group.is_empty());
    }

    #[test]
    fn given_members_when_iterated_then_ascending() {
        let mut group = LabelsGroup::new();
        for index in [9, 2, 5] {
            group.set_index(index, true).unwrap();
        }
        assert_eq!(group.iter().collect::<Vec<_>>(), vec![2, 5, 9]);
        assert_eq!(group.increment_index(None), Some(2));
        assert_eq!(group.increment_index(Some(5)), Some(9));
        assert_eq!(group.increment_index(Some(9)), None);
    }
}
