//! Tests for hierarchical groups spanning a region tree.

use std::cell::RefCell;
use std::rc::Rc;

use regiongroup::util::testing;
use regiongroup::{
    Context, ElementShape, FieldChangeDetail, FieldId, GroupChange, NodeRef, NodesetDomain,
    RegionId, SubelementHandlingMode, ZincError,
};
use rstest::{fixture, rstest};

/// Region tree `/a/b` plus `/c`, every region with nodes 1..=3, and a group
/// named "bob" in the root.
struct Tree {
    ctx: Context,
    root: RegionId,
    a: RegionId,
    b: RegionId,
    c: RegionId,
    bob: FieldId,
}

impl Tree {
    fn node(&self, region: RegionId, id: i32) -> NodeRef {
        self.ctx
            .find_node_by_identifier(region, NodesetDomain::Nodes, id)
            .unwrap()
    }

    /// Adds node `id` of `region` to bob's node group there.
    fn select_node(&mut self, region: RegionId, id: i32) -> FieldId {
        let node = self.node(region, id);
        let nodes = match self.ctx.group_get_node_group(self.bob, region, NodesetDomain::Nodes) {
            Some(nodes) => nodes,
            None => self
                .ctx
                .group_create_node_group(self.bob, region, NodesetDomain::Nodes)
                .unwrap(),
        };
        self.ctx.node_group_add_node(nodes, node).unwrap();
        nodes
    }
}

#[fixture]
fn tree() -> Tree {
    testing::init_test_setup();
    let mut ctx = Context::new();
    let root = ctx.create_region();
    let a = ctx.create_child(root, "a").unwrap();
    let b = ctx.create_child(a, "b").unwrap();
    let c = ctx.create_child(root, "c").unwrap();
    for region in [root, a, b, c] {
        for id in 1..=3 {
            ctx.create_node(region, NodesetDomain::Nodes, Some(id)).unwrap();
        }
    }
    let bob = ctx.create_field_group(root).unwrap();
    ctx.set_field_name(bob, "bob").unwrap();
    Tree {
        ctx,
        root,
        a,
        b,
        c,
        bob,
    }
}

// ============================================================
// Subregion groups
// ============================================================

#[rstest]
fn given_created_subregion_group_when_getting_then_same_group(mut tree: Tree) {
    let (bob, b) = (tree.bob, tree.b);
    let ctx = &mut tree.ctx;

    let created = ctx.group_create_subregion_group(bob, b).unwrap();
    let fetched = ctx.group_get_subregion_group(bob, b).unwrap();

    assert_eq!(created, fetched);
    assert_eq!(ctx.field_name(created), Some("bob"));
    assert_eq!(ctx.field_region(created), Some(b));
    assert_eq!(ctx.group_create_subregion_group(bob, b), None);
}

#[rstest]
fn given_deep_subregion_group_when_created_then_intermediate_group_linked(mut tree: Tree) {
    let (bob, a, b) = (tree.bob, tree.a, tree.b);
    let ctx = &mut tree.ctx;

    let gb = ctx.group_create_subregion_group(bob, b).unwrap();

    let ga = ctx.group_get_subregion_group(bob, a).unwrap();
    assert_eq!(ctx.field_region(ga), Some(a));
    assert_eq!(ctx.group_get_subregion_group(ga, b), Some(gb));
}

#[rstest]
fn given_own_region_when_getting_subregion_group_then_returns_self(mut tree: Tree) {
    let (bob, root) = (tree.bob, tree.root);

    assert_eq!(tree.ctx.group_get_subregion_group(bob, root), Some(bob));
}

#[rstest]
fn given_region_outside_tree_when_creating_subregion_group_then_none(mut tree: Tree) {
    let bob = tree.bob;
    let stranger = tree.ctx.create_region();

    assert_eq!(tree.ctx.group_create_subregion_group(bob, stranger), None);
}

#[rstest]
fn given_same_named_group_in_subregion_when_creating_then_reconnects_it(mut tree: Tree) {
    // Arrange
    let (bob, a) = (tree.bob, tree.a);
    let ctx = &mut tree.ctx;
    let existing = ctx.create_field_group(a).unwrap();
    ctx.set_field_name(existing, "bob").unwrap();
    ctx.set_field_managed(existing, true).unwrap();

    // Act
    let created = ctx.group_create_subregion_group(bob, a);

    // Assert
    assert_eq!(created, Some(existing));
    assert_eq!(ctx.group_get_subregion_group(bob, a), Some(existing));
    assert_eq!(ctx.group_create_subregion_group(bob, a), None);
}

#[rstest]
fn given_unlinked_same_named_group_when_getting_then_none_and_not_linked(mut tree: Tree) {
    let (bob, a) = (tree.bob, tree.a);
    let ctx = &mut tree.ctx;
    let existing = ctx.create_field_group(a).unwrap();
    ctx.set_field_name(existing, "bob").unwrap();

    assert_eq!(ctx.group_get_subregion_group(bob, a), None);
    assert!(!ctx.group_was_modified(bob));
    assert_eq!(ctx.group_create_subregion_group(bob, a), Some(existing));
}

#[rstest]
fn given_same_named_non_group_in_subregion_when_creating_then_none(mut tree: Tree) {
    let (bob, a) = (tree.bob, tree.a);
    let ctx = &mut tree.ctx;
    let constant = ctx.create_field_constant(a, 2.0).unwrap();
    ctx.set_field_name(constant, "bob").unwrap();

    assert_eq!(ctx.group_create_subregion_group(bob, a), None);
    assert_eq!(ctx.group_get_subregion_group(bob, a), None);
}

#[rstest]
fn given_subregion_groups_when_setting_mode_then_children_follow(mut tree: Tree) {
    let (bob, b) = (tree.bob, tree.b);
    let ctx = &mut tree.ctx;
    let gb = ctx.group_create_subregion_group(bob, b).unwrap();

    ctx.group_set_subelement_handling_mode(bob, SubelementHandlingMode::Full)
        .unwrap();

    assert_eq!(
        ctx.group_subelement_handling_mode(gb).unwrap(),
        SubelementHandlingMode::Full
    );
}

// ============================================================
// Emptiness
// ============================================================

#[rstest]
fn given_node_selected_deep_in_tree_when_checking_emptiness_then_non_local_only(mut tree: Tree) {
    // Arrange
    let (bob, b) = (tree.bob, tree.b);
    tree.select_node(b, 2);
    let ctx = &mut tree.ctx;

    // Assert
    assert!(ctx.group_is_empty_local(bob));
    assert!(!ctx.group_is_empty_non_local(bob));
    assert!(!ctx.group_is_empty(bob));

    // Act
    ctx.group_clear(bob).unwrap();

    // Assert
    assert!(ctx.group_is_empty(bob));
}

#[rstest]
fn given_nodes_in_subregion_when_clearing_local_then_subregion_kept(mut tree: Tree) {
    let (bob, root, a) = (tree.bob, tree.root, tree.a);
    tree.select_node(root, 1);
    tree.select_node(a, 1);
    let ctx = &mut tree.ctx;

    ctx.group_clear_local(bob).unwrap();

    assert!(ctx.group_is_empty_local(bob));
    assert!(!ctx.group_is_empty(bob));
}

// ============================================================
// Whole regions
// ============================================================

#[rstest]
fn given_local_region_added_when_evaluating_then_everything_is_member(mut tree: Tree) {
    // Arrange
    let (bob, root) = (tree.bob, tree.root);
    let n3 = tree.node(root, 3);
    let ctx = &mut tree.ctx;
    let line = ctx
        .create_element(root, 1, Some(1), ElementShape::Line, &[1, 2])
        .unwrap();

    // Act
    ctx.group_add_local_region(bob).unwrap();

    // Assert
    let mut cache = ctx.create_field_cache(root).unwrap();
    cache.set_node(n3).unwrap();
    assert_eq!(ctx.evaluate(bob, &cache), Some(1.0));
    cache.set_element(line).unwrap();
    assert_eq!(ctx.evaluate(bob, &cache), Some(1.0));
    assert!(ctx.group_contains_local_region(bob));
    assert_eq!(ctx.group_create_node_group(bob, root, NodesetDomain::Nodes), None);
    assert_eq!(ctx.group_get_element_group(bob, root, 1), None);
}

#[rstest]
fn given_subregion_added_when_querying_then_only_that_region_contained(mut tree: Tree) {
    let (bob, a, b, c) = (tree.bob, tree.a, tree.b, tree.c);
    let ctx = &mut tree.ctx;

    ctx.group_add_region(bob, b).unwrap();

    assert!(ctx.group_contains_region(bob, b));
    assert!(!ctx.group_contains_region(bob, a));
    assert!(!ctx.group_contains_region(bob, c));
    assert!(!ctx.group_is_empty(bob));

    ctx.group_remove_region(bob, b).unwrap();
    assert!(!ctx.group_contains_region(bob, b));
    assert!(ctx.group_is_empty(bob));
}

#[rstest]
fn given_region_without_group_when_removing_region_then_not_found(mut tree: Tree) {
    let (bob, c) = (tree.bob, tree.c);

    assert_eq!(tree.ctx.group_remove_region(bob, c), Err(ZincError::NotFound));
}

#[rstest]
fn given_region_outside_tree_when_adding_region_then_argument_error(mut tree: Tree) {
    let bob = tree.bob;
    let stranger = tree.ctx.create_region();

    let result = tree.ctx.group_add_region(bob, stranger);

    assert!(matches!(result, Err(ZincError::Argument(_))));
}

// ============================================================
// Pruning and traversal
// ============================================================

#[rstest]
fn given_cleared_group_when_removing_empty_subgroups_then_subregion_groups_dropped(mut tree: Tree) {
    // Arrange
    let (bob, a, b) = (tree.bob, tree.a, tree.b);
    let nodes = tree.select_node(b, 1);
    let ctx = &mut tree.ctx;
    ctx.release_field(nodes).unwrap();
    ctx.group_clear(bob).unwrap();

    // Act
    ctx.group_remove_empty_subgroups(bob).unwrap();

    // Assert
    assert_eq!(ctx.group_get_subregion_group(bob, b), None);
    assert_eq!(ctx.group_get_subregion_group(bob, a), None);
    assert_eq!(ctx.find_field_by_name(b, "bob.nodes"), None);
}

#[rstest]
fn given_member_in_grandchild_when_finding_first_non_empty_then_grandchild_group(mut tree: Tree) {
    let (bob, b) = (tree.bob, tree.b);
    tree.select_node(b, 3);
    let ctx = &mut tree.ctx;
    let gb = ctx.group_get_subregion_group(bob, b).unwrap();

    assert_eq!(ctx.group_get_first_non_empty_group(bob), Some(gb));
}

#[rstest]
fn given_group_tree_when_visiting_then_pre_order_and_abortable(mut tree: Tree) {
    let (bob, a, b, c) = (tree.bob, tree.a, tree.b, tree.c);
    let ctx = &mut tree.ctx;
    let gb = ctx.group_create_subregion_group(bob, b).unwrap();
    let gc = ctx.group_create_subregion_group(bob, c).unwrap();
    let ga = ctx.group_get_subregion_group(bob, a).unwrap();

    let mut visited = Vec::new();
    let completed = ctx.group_for_each_hierarchical(bob, |group| {
        visited.push(group);
        true
    });
    assert!(completed);
    assert_eq!(visited, vec![bob, ga, gb, gc]);

    let mut count = 0;
    let completed = ctx.group_for_each_hierarchical(bob, |group| {
        count += 1;
        group != ga
    });
    assert!(!completed);
    assert_eq!(count, 2);
}

// ============================================================
// Domain selection
// ============================================================

#[rstest]
fn given_domain_field_when_creating_selection_then_named_after_it(mut tree: Tree) {
    // Arrange
    let (bob, root) = (tree.bob, tree.root);
    let ctx = &mut tree.ctx;
    let surface = ctx.create_field_constant(root, 0.0).unwrap();
    ctx.set_field_name(surface, "surface").unwrap();

    // Act
    let selection = ctx.group_create_domain_selection_group(bob, surface).unwrap();
    ctx.domain_selection_add_identifier(selection, 7).unwrap();

    // Assert
    assert_eq!(ctx.field_name(selection), Some("bob.surface"));
    assert_eq!(ctx.group_get_domain_selection_group(bob, surface), Some(selection));
    assert_eq!(ctx.group_create_domain_selection_group(bob, surface), None);
    assert_eq!(ctx.domain_selection_domain_field(selection), Some(surface));
    assert!(ctx.domain_selection_contains_identifier(selection, 7));
    assert!(!ctx.group_is_empty_local(bob));

    ctx.group_clear_local(bob).unwrap();
    assert_eq!(ctx.domain_selection_size(selection), 0);
    assert!(ctx.group_is_empty(bob));
}

// ============================================================
// Region removal
// ============================================================

#[rstest]
fn given_selection_in_child_when_child_removed_then_group_notified_of_remove(mut tree: Tree) {
    // Arrange
    let (bob, root, a) = (tree.bob, tree.root, tree.a);
    tree.select_node(a, 1);
    let ctx = &mut tree.ctx;
    let details = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&details);
    ctx.add_field_callback(root, move |event| {
        sink.borrow_mut().push(event.change_detail(bob));
    })
    .unwrap();

    // Act
    ctx.remove_child(root, a).unwrap();

    // Assert
    assert!(ctx.group_is_empty(bob));
    let details = details.borrow();
    assert_eq!(details.len(), 1);
    match details[0] {
        Some(FieldChangeDetail::Hierarchical(detail)) => {
            assert_eq!(detail.non_local(), GroupChange::Remove);
            assert_eq!(detail.local(), GroupChange::None);
        }
        other => panic!("unexpected change detail {:?}", other),
    }
}
