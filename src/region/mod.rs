//! Region tree: arena-owned regions with reference counts, change caching and
//! change callbacks. Fields live in a second arena of the same `Context`.

mod change;
mod display;
mod fe;
mod tree;

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use generational_arena::{Arena, Index};
use tracing::{debug, instrument, trace};

use crate::config::Settings;
use crate::domain::{FeRegion, ZincError, ZincResult};
use crate::field::{Field, FieldId, FieldModuleEvent};

pub use fe::{ElementRef, NodeRef};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle of a region. Handles do not own the region; see `access_region`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId {
    context: u64,
    index: Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

/// Tree changes coalesced over one outermost change scope.
///
/// `child_added` / `child_removed` are only set when exactly one child event
/// happened in the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionChanges {
    pub children_changed: bool,
    pub name_changed: bool,
    pub child_added: Option<RegionId>,
    pub child_removed: Option<RegionId>,
}

impl RegionChanges {
    pub fn is_empty(&self) -> bool {
        !self.children_changed && !self.name_changed
    }
}

pub type RegionCallback = Box<dyn FnMut(RegionId, &RegionChanges)>;
pub type FieldCallback = Box<dyn FnMut(&FieldModuleEvent)>;

pub(crate) struct RegionNode {
    pub name: Option<String>,
    pub parent: Option<RegionId>,
    pub children: Vec<RegionId>,
    pub access_count: usize,
    pub change_level: usize,
    pub hierarchical_change_level: usize,
    pub pending: RegionChanges,
    pub fe_region: FeRegion,
    /// Field directory: name → field
    pub fields: BTreeMap<String, FieldId>,
    /// Destroyed since the last manager flush
    pub removed_fields: Vec<(FieldId, String)>,
    pub next_temporary_field: usize,
    pub region_callbacks: Vec<(CallbackId, RegionCallback)>,
    pub field_callbacks: Vec<(CallbackId, FieldCallback)>,
}

impl RegionNode {
    fn new() -> Self {
        Self {
            name: None,
            parent: None,
            children: Vec::new(),
            access_count: 1,
            change_level: 0,
            hierarchical_change_level: 0,
            pending: RegionChanges::default(),
            fe_region: FeRegion::new(),
            fields: BTreeMap::new(),
            removed_fields: Vec::new(),
            next_temporary_field: 1,
            region_callbacks: Vec::new(),
            field_callbacks: Vec::new(),
        }
    }
}

/// Owner of every region and field of one or more region trees.
pub struct Context {
    id: u64,
    pub(crate) settings: Settings,
    pub(crate) regions: Arena<RegionNode>,
    pub(crate) fields: Arena<Field>,
    next_callback_id: u64,
    pub(crate) evaluations: Cell<u64>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("regions", &self.regions.len())
            .field("fields", &self.fields.len())
            .finish()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            settings,
            regions: Arena::new(),
            fields: Arena::new(),
            next_callback_id: 1,
            evaluations: Cell::new(0),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Creates a parentless region holding one access for the caller.
    #[instrument(level = "debug", skip(self))]
    pub fn create_region(&mut self) -> RegionId {
        let index = self.regions.insert(RegionNode::new());
        RegionId {
            context: self.id,
            index,
        }
    }

    pub fn region_exists(&self, region: RegionId) -> bool {
        region.context == self.id && self.regions.contains(region.index)
    }

    pub fn region_access_count(&self, region: RegionId) -> usize {
        self.node(region).map_or(0, |n| n.access_count)
    }

    pub fn access_region(&mut self, region: RegionId) -> ZincResult<RegionId> {
        self.node_mut(region)?.access_count += 1;
        Ok(region)
    }

    /// Drops one access; the region is destroyed when none remain.
    #[instrument(level = "trace", skip(self))]
    pub fn release_region(&mut self, region: RegionId) -> ZincResult<()> {
        let node = self.node_mut(region)?;
        node.access_count = node.access_count.saturating_sub(1);
        if node.access_count == 0 {
            self.destroy_region(region);
        }
        Ok(())
    }

    /// Releases the region's fields and children, then frees it.
    fn destroy_region(&mut self, region: RegionId) {
        debug!("destroying region {:?}", self.region_name(region));
        let field_ids: Vec<FieldId> = self
            .node(region)
            .map(|n| n.fields.values().copied().collect())
            .unwrap_or_default();
        for &field in &field_ids {
            for child_group in self.take_child_region_groups(field) {
                let _ = self.release_field(child_group);
            }
        }
        for field in field_ids {
            self.fields.remove(field.0);
        }
        let children = self
            .node(region)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            if let Ok(child_node) = self.node_mut(child) {
                child_node.parent = None;
            }
            let _ = self.release_region(child);
        }
        self.regions.remove(region.index);
    }

    pub(crate) fn node(&self, region: RegionId) -> ZincResult<&RegionNode> {
        if region.context != self.id {
            return Err(ZincError::argument("region belongs to another context"));
        }
        self.regions
            .get(region.index)
            .ok_or_else(|| ZincError::argument("region no longer exists"))
    }

    pub(crate) fn node_mut(&mut self, region: RegionId) -> ZincResult<&mut RegionNode> {
        if region.context != self.id {
            return Err(ZincError::argument("region belongs to another context"));
        }
        self.regions
            .get_mut(region.index)
            .ok_or_else(|| ZincError::argument("region no longer exists"))
    }

    fn next_callback_id(&mut self) -> CallbackId {
        let id = CallbackId(self.next_callback_id);
        self.next_callback_id += 1;
        id
    }

    /// Registers a callback run once per outermost change scope that changed
    /// the region's children or name.
    pub fn add_callback<F>(&mut self, region: RegionId, callback: F) -> ZincResult<CallbackId>
    where
        F: FnMut(RegionId, &RegionChanges) + 'static,
    {
        let id = self.next_callback_id();
        self.node_mut(region)?
            .region_callbacks
            .push((id, Box::new(callback)));
        trace!("added region callback {:?}", id);
        Ok(id)
    }

    pub fn remove_callback(&mut self, region: RegionId, id: CallbackId) -> ZincResult<()> {
        let callbacks = &mut self.node_mut(region)?.region_callbacks;
        let before = callbacks.len();
        callbacks.retain(|(cb, _)| *cb != id);
        if callbacks.len() == before {
            return Err(ZincError::NotFound);
        }
        Ok(())
    }

    /// Registers a callback receiving one event per field manager flush.
    pub fn add_field_callback<F>(&mut self, region: RegionId, callback: F) -> ZincResult<CallbackId>
    where
        F: FnMut(&FieldModuleEvent) + 'static,
    {
        let id = self.next_callback_id();
        self.node_mut(region)?
            .field_callbacks
            .push((id, Box::new(callback)));
        Ok(id)
    }

    pub fn remove_field_callback(&mut self, region: RegionId, id: CallbackId) -> ZincResult<()> {
        let callbacks = &mut self.node_mut(region)?.field_callbacks;
        let before = callbacks.len();
        callbacks.retain(|(cb, _)| *cb != id);
        if callbacks.len() == before {
            return Err(ZincError::NotFound);
        }
        Ok(())
    }

    /// Number of field evaluations performed so far.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluations.get()
    }
}
