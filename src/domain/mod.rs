//! Domain layer: labels, finite-element domains, change summaries and errors
//!
//! This layer is independent of external concerns (no I/O, no config loading, no callbacks).

pub mod change;
pub mod error;
pub mod labels;
pub mod mesh;

pub use change::{
    FieldChangeDetail, FieldChangeFlags, GroupChange, HierarchicalGroupChangeDetail,
    SubobjectGroupChangeDetail,
};
pub use error::{ZincError, ZincResult};
pub use labels::{LabelChange, LabelIdentifier, LabelIndex, Labels, LabelsGroup};
pub use mesh::{
    mesh_name, ElementShape, FeRegion, Mesh, Nodeset, NodesetDomain, MAXIMUM_ELEMENT_XI_DIMENSIONS,
};
