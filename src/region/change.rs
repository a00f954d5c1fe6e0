//! Change caching: nested begin/end change scopes per region and across a
//! subtree, with one flush and one callback round at the outermost end.

use tracing::{error, instrument, trace};

use crate::domain::{ZincError, ZincResult};
use crate::region::{Context, RegionChanges, RegionId};

impl Context {
    /// Starts caching changes to the region's children, name and fields.
    #[instrument(level = "trace", skip(self))]
    pub fn begin_change(&mut self, region: RegionId) -> ZincResult<()> {
        self.node_mut(region)?.change_level += 1;
        Ok(())
    }

    /// Ends one change scope. At the outermost end the field manager flushes
    /// and region callbacks run once with the coalesced changes.
    #[instrument(level = "trace", skip(self))]
    pub fn end_change(&mut self, region: RegionId) -> ZincResult<()> {
        let node = self.node_mut(region)?;
        match node.change_level {
            0 => {
                error!("end_change: change level is already zero");
                Err(ZincError::general("change level is already zero"))
            }
            1 => {
                // level stays at one while flushing so follow-on changes are cached
                let flushed = self.flush_field_changes(region);
                self.node_mut(region)?.change_level = 0;
                flushed?;
                self.notify_region_changes(region)
            }
            _ => {
                node.change_level -= 1;
                Ok(())
            }
        }
    }

    pub fn change_level(&self, region: RegionId) -> usize {
        self.node(region).map_or(0, |n| n.change_level)
    }

    /// Begins a change scope on the region and every region below it.
    #[instrument(level = "debug", skip(self))]
    pub fn begin_hierarchical_change(&mut self, region: RegionId) -> ZincResult<()> {
        self.node_mut(region)?.hierarchical_change_level += 1;
        self.tree_change(region, 1)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn end_hierarchical_change(&mut self, region: RegionId) -> ZincResult<()> {
        let node = self.node_mut(region)?;
        if node.hierarchical_change_level == 0 {
            error!("end_hierarchical_change: hierarchical change level is already zero");
            return Err(ZincError::general("hierarchical change level is already zero"));
        }
        node.hierarchical_change_level -= 1;
        self.tree_change(region, -1)
    }

    /// Hierarchical change levels of the region and all its ancestors.
    pub(crate) fn sum_hierarchical_change_level(&self, region: RegionId) -> usize {
        let mut sum = 0;
        let mut current = Some(region);
        while let Some(r) = current {
            match self.node(r) {
                Ok(node) => {
                    sum += node.hierarchical_change_level;
                    current = node.parent;
                }
                Err(_) => break,
            }
        }
        sum
    }

    /// Applies `delta` begin (positive) or end (negative) changes to the
    /// subtree. Children end before their parent so their notifications reach
    /// a parent that is still caching.
    pub(crate) fn tree_change(&mut self, region: RegionId, delta: isize) -> ZincResult<()> {
        for _ in 0..delta.max(0) {
            self.begin_change(region)?;
        }
        let children = self.node(region)?.children.clone();
        for child in children {
            self.tree_change(child, delta)?;
        }
        for _ in 0..(-delta).max(0) {
            self.end_change(region)?;
        }
        Ok(())
    }

    /// Records a child event; a second event in the same batch drops both
    /// child references.
    pub(crate) fn note_child_event(
        &mut self,
        parent: RegionId,
        child: RegionId,
        added: bool,
    ) -> ZincResult<()> {
        let pending = &mut self.node_mut(parent)?.pending;
        if !pending.children_changed {
            pending.children_changed = true;
            if added {
                pending.child_added = Some(child);
            } else {
                pending.child_removed = Some(child);
            }
            self.access_region(child)?;
        } else {
            let stale = [pending.child_added.take(), pending.child_removed.take()];
            for region in stale.into_iter().flatten() {
                self.release_region(region)?;
            }
        }
        Ok(())
    }

    fn notify_region_changes(&mut self, region: RegionId) -> ZincResult<()> {
        let node = self.node_mut(region)?;
        if node.pending.is_empty() {
            return Ok(());
        }
        let changes = std::mem::take(&mut node.pending);
        let mut callbacks = std::mem::take(&mut node.region_callbacks);
        trace!(
            "region callbacks: {} for {:?}",
            callbacks.len(),
            changes
        );
        for (_, callback) in callbacks.iter_mut() {
            callback(region, &changes);
        }
        if let Ok(node) = self.node_mut(region) {
            callbacks.append(&mut node.region_callbacks);
            node.region_callbacks = callbacks;
        }
        self.release_pending_children(changes)
    }

    fn release_pending_children(&mut self, changes: RegionChanges) -> ZincResult<()> {
        for child in [changes.child_added, changes.child_removed].into_iter().flatten() {
            self.release_region(child)?;
        }
        Ok(())
    }
}
