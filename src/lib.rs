//! Hierarchical regions with per-region field directories, and group fields
//! selecting nodes and elements across a region subtree.
//!
//! All state lives in a [`Context`]; regions and fields are addressed by
//! copyable handles ([`RegionId`], [`FieldId`]).

pub mod config;
pub mod domain;
pub mod field;
pub mod region;
pub mod util;

pub use config::Settings;
pub use domain::{
    ElementShape, FieldChangeDetail, FieldChangeFlags, GroupChange, LabelIdentifier, NodesetDomain,
    ZincError, ZincResult,
};
pub use field::{
    FieldCache, FieldChange, FieldId, FieldKind, FieldManagerMessage, FieldModuleEvent, Location,
    SubelementHandlingMode,
};
pub use region::{CallbackId, Context, ElementRef, NodeRef, RegionChanges, RegionId};
