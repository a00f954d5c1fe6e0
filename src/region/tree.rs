//! Region tree navigation and mutation: names, paths, reparenting, removal.

use itertools::Itertools;
use tracing::{debug, error, instrument, warn};

use crate::domain::{ZincError, ZincResult};
use crate::region::{Context, RegionId};

pub const REGION_PATH_SEPARATOR: char = '/';
pub const REGION_PATH_PARENT_NAME: &str = "..";

fn validate_region_name(name: &str) -> ZincResult<()> {
    if name.is_empty() || name.contains(REGION_PATH_SEPARATOR) || name == REGION_PATH_PARENT_NAME {
        return Err(ZincError::argument(format!("invalid region name '{}'", name)));
    }
    Ok(())
}

impl Context {
    pub fn region_name(&self, region: RegionId) -> Option<&str> {
        self.node(region).ok().and_then(|n| n.name.as_deref())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_region_name(&mut self, region: RegionId, name: &str) -> ZincResult<()> {
        validate_region_name(name)?;
        if self.region_name(region) == Some(name) {
            return Ok(());
        }
        if let Some(parent) = self.region_parent(region) {
            if self.find_child_by_name(parent, name).is_some() {
                return Err(ZincError::argument(format!(
                    "sibling region already named '{}'",
                    name
                )));
            }
        }
        self.begin_change(region)?;
        let node = self.node_mut(region)?;
        node.name = Some(name.to_string());
        node.pending.name_changed = true;
        self.end_change(region)
    }

    pub fn region_parent(&self, region: RegionId) -> Option<RegionId> {
        self.node(region).ok().and_then(|n| n.parent)
    }

    pub fn region_children(&self, region: RegionId) -> Vec<RegionId> {
        self.node(region)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn first_child(&self, region: RegionId) -> Option<RegionId> {
        self.node(region).ok().and_then(|n| n.children.first().copied())
    }

    pub fn next_sibling(&self, region: RegionId) -> Option<RegionId> {
        let siblings = &self.node(self.region_parent(region)?).ok()?.children;
        let position = siblings.iter().position(|&c| c == region)?;
        siblings.get(position + 1).copied()
    }

    pub fn previous_sibling(&self, region: RegionId) -> Option<RegionId> {
        let siblings = &self.node(self.region_parent(region)?).ok()?.children;
        let position = siblings.iter().position(|&c| c == region)?;
        position.checked_sub(1).and_then(|p| siblings.get(p).copied())
    }

    pub fn region_root(&self, region: RegionId) -> RegionId {
        let mut root = region;
        while let Some(parent) = self.region_parent(root) {
            root = parent;
        }
        root
    }

    pub fn is_root(&self, region: RegionId) -> bool {
        self.region_parent(region).is_none()
    }

    pub fn find_child_by_name(&self, region: RegionId, name: &str) -> Option<RegionId> {
        self.node(region)
            .ok()?
            .children
            .iter()
            .copied()
            .find(|&child| self.region_name(child) == Some(name))
    }

    /// True if `subregion` is `region` or lies below it.
    pub fn contains_subregion(&self, region: RegionId, subregion: RegionId) -> bool {
        let mut current = Some(subregion);
        while let Some(r) = current {
            if r == region {
                return true;
            }
            current = self.region_parent(r);
        }
        false
    }

    /// Resolves a `/`-separated path; `..` is the parent and a leading `/` is
    /// ignored. The empty path is the region itself.
    pub fn find_subregion_at_path(&self, region: RegionId, path: &str) -> Option<RegionId> {
        let mut current = region;
        for segment in path.split(REGION_PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            current = if segment == REGION_PATH_PARENT_NAME {
                self.region_parent(current)?
            } else {
                self.find_child_by_name(current, segment)?
            };
        }
        self.node(current).ok().map(|_| current)
    }

    /// Creates a named child region owned by `parent`.
    #[instrument(level = "debug", skip(self))]
    pub fn create_child(&mut self, parent: RegionId, name: &str) -> ZincResult<RegionId> {
        validate_region_name(name)?;
        if self.find_child_by_name(parent, name).is_some() {
            return Err(ZincError::argument(format!(
                "child region '{}' already exists",
                name
            )));
        }
        let child = self.create_region();
        self.node_mut(child)?.name = Some(name.to_string());
        let appended = self.append_child(parent, child);
        self.release_region(child)?;
        appended.map(|_| child)
    }

    /// Creates every missing region along `path` in one hierarchical change.
    /// Returns `None` if the path already existed or could not be created.
    #[instrument(level = "debug", skip(self))]
    pub fn create_subregion(&mut self, region: RegionId, path: &str) -> Option<RegionId> {
        if self.find_subregion_at_path(region, path).is_some() {
            return None;
        }
        self.begin_hierarchical_change(region).ok()?;
        let mut current = Some(region);
        for segment in path.split(REGION_PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            let Some(here) = current else { break };
            current = if segment == REGION_PATH_PARENT_NAME {
                self.region_parent(here)
            } else if let Some(child) = self.find_child_by_name(here, segment) {
                Some(child)
            } else {
                match self.create_child(here, segment) {
                    Ok(child) => Some(child),
                    Err(e) => {
                        warn!("create_subregion: cannot create '{}': {}", segment, e);
                        None
                    }
                }
            };
        }
        if let Err(e) = self.end_hierarchical_change(region) {
            error!("create_subregion: {}", e);
        }
        current
    }

    /// Path from the root, names joined by `/`; empty for a root region.
    pub fn region_path(&self, region: RegionId) -> String {
        let mut names = Vec::new();
        let mut current = region;
        while let Some(parent) = self.region_parent(current) {
            names.push(self.region_name(current).unwrap_or_default().to_string());
            current = parent;
        }
        names.iter().rev().join("/")
    }

    /// Path of `region` relative to `base`, going up with `..` as needed.
    /// `None` if the regions are in different trees.
    pub fn region_relative_path(&self, region: RegionId, base: RegionId) -> Option<String> {
        let mut segments_up = Vec::new();
        let mut common = base;
        while !self.contains_subregion(common, region) {
            common = self.region_parent(common)?;
            segments_up.push(REGION_PATH_PARENT_NAME.to_string());
        }
        let mut segments_down = Vec::new();
        let mut current = region;
        while current != common {
            segments_down.push(self.region_name(current).unwrap_or_default().to_string());
            current = self.region_parent(current)?;
        }
        Some(
            segments_up
                .into_iter()
                .chain(segments_down.into_iter().rev())
                .join("/"),
        )
    }

    pub fn append_child(&mut self, parent: RegionId, new_child: RegionId) -> ZincResult<()> {
        self.insert_child_before(parent, new_child, None)
    }

    /// Inserts `new_child` before `ref_child` (or at the end), detaching it
    /// from any previous parent first.
    #[instrument(level = "debug", skip(self))]
    pub fn insert_child_before(
        &mut self,
        parent: RegionId,
        new_child: RegionId,
        ref_child: Option<RegionId>,
    ) -> ZincResult<()> {
        self.node(parent)?;
        let name = self
            .node(new_child)?
            .name
            .clone()
            .ok_or_else(|| ZincError::argument("cannot insert an unnamed region"))?;
        if self.contains_subregion(new_child, parent) {
            error!("insert_child_before: new child contains this region");
            return Err(ZincError::argument("new child contains the parent region"));
        }
        if let Some(reference) = ref_child {
            if self.region_parent(reference) != Some(parent) {
                return Err(ZincError::argument("reference region is not a child"));
            }
        }
        if let Some(existing) = self.find_child_by_name(parent, &name) {
            if existing != new_child {
                return Err(ZincError::argument(format!(
                    "child region '{}' already exists",
                    name
                )));
            }
        }
        self.begin_change(parent)?;
        // the access taken here becomes the new parent's ownership of the child
        self.access_region(new_child)?;
        let result = self.link_child(parent, new_child, ref_child);
        self.end_change(parent)?;
        result
    }

    fn link_child(
        &mut self,
        parent: RegionId,
        new_child: RegionId,
        ref_child: Option<RegionId>,
    ) -> ZincResult<()> {
        if let Some(old_parent) = self.region_parent(new_child) {
            self.remove_child(old_parent, new_child)?;
        }
        let node = self.node_mut(parent)?;
        let position = ref_child
            .and_then(|r| node.children.iter().position(|&c| c == r))
            .unwrap_or(node.children.len());
        node.children.insert(position, new_child);
        self.node_mut(new_child)?.parent = Some(parent);
        let delta = self.sum_hierarchical_change_level(parent) as isize;
        if delta != 0 {
            self.tree_change(new_child, delta)?;
        }
        self.note_child_event(parent, new_child, true)
    }

    /// Detaches `child`; groups in the parent drop their subgroup for it first.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_child(&mut self, parent: RegionId, child: RegionId) -> ZincResult<()> {
        if self.region_parent(child) != Some(parent) {
            return Err(ZincError::argument("region is not a child of this region"));
        }
        self.begin_change(parent)?;
        let result = self
            .subregion_removed(parent, child)
            .and_then(|_| self.unlink_child(parent, child));
        self.end_change(parent)?;
        result
    }

    fn unlink_child(&mut self, parent: RegionId, child: RegionId) -> ZincResult<()> {
        let delta = self.sum_hierarchical_change_level(parent) as isize;
        self.node_mut(parent)?.children.retain(|&c| c != child);
        self.node_mut(child)?.parent = None;
        self.note_child_event(parent, child, false)?;
        if delta != 0 {
            self.tree_change(child, -delta)?;
        }
        debug!("removed child {:?}", self.region_name(child));
        self.release_region(child)
    }
}
