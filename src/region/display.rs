//! Text rendering of region trees and hierarchical groups as `termtree` trees.

use itertools::Itertools;
use termtree::Tree;
use tracing::instrument;

use crate::field::FieldId;
use crate::region::{Context, RegionId};

impl Context {
    /// Region subtree with each region's field names.
    #[instrument(level = "debug", skip(self))]
    pub fn region_tree(&self, region: RegionId) -> Tree<String> {
        let name = self.region_name(region).unwrap_or("/");
        let fields = self
            .fields(region)
            .into_iter()
            .filter_map(|field| self.field_name(field))
            .join(", ");
        let label = if fields.is_empty() {
            name.to_string()
        } else {
            format!("{} [{}]", name, fields)
        };
        let leaves: Vec<_> = self
            .region_children(region)
            .into_iter()
            .map(|child| self.region_tree(child))
            .collect();
        Tree::new(label).with_leaves(leaves)
    }

    /// Group and its child-region groups, each labelled with its region
    /// path and local membership counts.
    pub fn group_tree(&self, group: FieldId) -> Tree<String> {
        let Ok(g) = self.group(group) else {
            return Tree::new("not a group".to_string());
        };
        let mut counts = Vec::new();
        if g.contains_all {
            counts.push("all".to_string());
        }
        for subgroup in g.local_subgroups() {
            if let Some(name) = self.field_name(subgroup) {
                let suffix = name.rsplit('.').next().unwrap_or(name);
                counts.push(format!("{}={}", suffix, self.subgroup_size(subgroup)));
            }
        }
        let label = format!(
            "{}:{} ({})",
            self.region_path(g.region),
            self.field_name(group).unwrap_or_default(),
            counts.iter().join(" ")
        );
        let leaves: Vec<_> = g
            .child_region_groups
            .iter()
            .map(|&(_, child)| self.group_tree(child))
            .collect();
        Tree::new(label).with_leaves(leaves)
    }
}
