//! Field evaluation at a node or element location.

use tracing::warn;

use crate::domain::{ZincError, ZincResult, MAXIMUM_ELEMENT_XI_DIMENSIONS};
use crate::field::{FieldCore, FieldId, SubobjectDomain};
use crate::region::{Context, ElementRef, NodeRef, RegionId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Location {
    None,
    Node(NodeRef),
    Element {
        element: ElementRef,
        xi: [f64; MAXIMUM_ELEMENT_XI_DIMENSIONS],
    },
}

/// Evaluation location bound to one region.
#[derive(Debug, Clone)]
pub struct FieldCache {
    region: RegionId,
    location: Location,
}

impl FieldCache {
    pub fn new(region: RegionId) -> Self {
        Self {
            region,
            location: Location::None,
        }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn set_node(&mut self, node: NodeRef) -> ZincResult<()> {
        if node.region != self.region {
            return Err(ZincError::argument("node is not from the cache's region"));
        }
        self.location = Location::Node(node);
        Ok(())
    }

    pub fn set_element(&mut self, element: ElementRef) -> ZincResult<()> {
        self.set_element_xi(element, &vec![0.0; element.dimension])
    }

    pub fn set_element_xi(&mut self, element: ElementRef, xi: &[f64]) -> ZincResult<()> {
        if element.region != self.region {
            return Err(ZincError::argument("element is not from the cache's region"));
        }
        if xi.len() != element.dimension {
            return Err(ZincError::argument(format!(
                "{} xi values for element of dimension {}",
                xi.len(),
                element.dimension
            )));
        }
        let mut location_xi = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        location_xi[..xi.len()].copy_from_slice(xi);
        self.location = Location::Element {
            element,
            xi: location_xi,
        };
        Ok(())
    }

    pub fn clear_location(&mut self) {
        self.location = Location::None;
    }
}

impl Context {
    pub fn create_field_cache(&self, region: RegionId) -> ZincResult<FieldCache> {
        self.node(region)?;
        Ok(FieldCache::new(region))
    }

    /// Value of the field at the cache's location, `None` where it has no
    /// value there.
    pub fn evaluate(&self, field: FieldId, cache: &FieldCache) -> Option<f64> {
        self.evaluations.set(self.evaluations.get() + 1);
        let region = self.field(field).ok()?.region;
        if region != cache.region() {
            warn!("evaluate: field is not from the cache's region");
            return None;
        }
        self.evaluate_core(field, cache.location())
    }

    /// Nonzero value; no value counts as false.
    pub fn evaluate_boolean(&self, field: FieldId, cache: &FieldCache) -> bool {
        self.evaluate(field, cache).is_some_and(|v| v != 0.0)
    }

    fn evaluate_core(&self, field: FieldId, location: Location) -> Option<f64> {
        let bool_value = |b: bool| if b { 1.0 } else { 0.0 };
        match &self.field(field).ok()?.core {
            FieldCore::Constant(value) => Some(*value),
            FieldCore::Not(a) => self.evaluate_core(*a, location).map(|v| bool_value(v == 0.0)),
            FieldCore::And(a, b) => {
                let a = self.evaluate_core(*a, location)?;
                let b = self.evaluate_core(*b, location)?;
                Some(bool_value(a != 0.0 && b != 0.0))
            }
            FieldCore::Or(a, b) => {
                let a = self.evaluate_core(*a, location)?;
                let b = self.evaluate_core(*b, location)?;
                Some(bool_value(a != 0.0 || b != 0.0))
            }
            FieldCore::NodeGroup(group) | FieldCore::ElementGroup(group) => {
                let index = match (group.domain, location) {
                    (SubobjectDomain::Nodeset(domain), Location::Node(node)) => {
                        if node.domain != domain {
                            return Some(0.0);
                        }
                        self.node_identifier(node)?;
                        node.index
                    }
                    (SubobjectDomain::Mesh(dimension), Location::Element { element, .. })
                        if element.dimension == dimension =>
                    {
                        self.element_identifier(element)?;
                        element.index
                    }
                    _ => return None,
                };
                Some(bool_value(group.members.has_index(index)))
            }
            FieldCore::Group(group) => {
                if matches!(location, Location::None) {
                    return None;
                }
                if group.contains_all {
                    return Some(1.0);
                }
                let subgroups = match location {
                    Location::Node(_) => vec![group.local_node_group, group.local_data_group],
                    Location::Element { element, .. } => {
                        vec![group.local_element_group(element.dimension)]
                    }
                    Location::None => Vec::new(),
                };
                let member = subgroups
                    .into_iter()
                    .flatten()
                    .any(|subgroup| self.evaluate_core(subgroup, location).is_some_and(|v| v != 0.0));
                Some(bool_value(member))
            }
            // no location kind for arbitrary domains
            FieldCore::DomainSelection(_) => None,
        }
    }
}
