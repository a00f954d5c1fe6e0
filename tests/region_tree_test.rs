//! Tests for the region tree: naming, paths, reparenting and tree change
//! callbacks.

use std::cell::RefCell;
use std::rc::Rc;

use regiongroup::util::testing;
use regiongroup::{Context, NodesetDomain, RegionChanges, RegionId, ZincError};
use rstest::{fixture, rstest};

struct Regions {
    ctx: Context,
    root: RegionId,
}

#[fixture]
fn regions() -> Regions {
    testing::init_test_setup();
    let mut ctx = Context::new();
    let root = ctx.create_region();
    Regions { ctx, root }
}

fn record_changes(ctx: &mut Context, region: RegionId) -> Rc<RefCell<Vec<RegionChanges>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    ctx.add_callback(region, move |_, changes| sink.borrow_mut().push(changes.clone()))
        .unwrap();
    seen
}

// ============================================================
// Names and paths
// ============================================================

#[rstest]
fn given_nested_children_when_resolving_paths_then_round_trip(mut regions: Regions) {
    let ctx = &mut regions.ctx;
    let root = regions.root;
    let heart = ctx.create_child(root, "heart").unwrap();
    let lv = ctx.create_child(heart, "lv").unwrap();

    assert_eq!(ctx.region_path(lv), "heart/lv");
    assert_eq!(ctx.find_subregion_at_path(root, "/heart/lv"), Some(lv));
    assert_eq!(ctx.find_subregion_at_path(lv, "../../heart"), Some(heart));
    assert_eq!(ctx.find_subregion_at_path(root, ""), Some(root));
    assert_eq!(ctx.find_subregion_at_path(root, "lungs"), None);
    assert_eq!(ctx.region_root(lv), root);
    assert!(ctx.is_root(root));
}

#[rstest]
fn given_sibling_branches_when_relative_path_then_goes_up_and_down(mut regions: Regions) {
    let ctx = &mut regions.ctx;
    let root = regions.root;
    let heart = ctx.create_subregion(root, "body/heart").unwrap();
    let lungs = ctx.create_subregion(root, "body/lungs/left").unwrap();

    assert_eq!(
        ctx.region_relative_path(lungs, heart).as_deref(),
        Some("../lungs/left")
    );
    assert_eq!(ctx.region_relative_path(heart, heart).as_deref(), Some(""));
    let stranger = ctx.create_region();
    assert_eq!(ctx.region_relative_path(stranger, heart), None);
}

#[rstest]
#[case("")]
#[case("a/b")]
#[case("..")]
fn given_invalid_name_when_creating_child_then_argument_error(mut regions: Regions, #[case] name: &str) {
    let result = regions.ctx.create_child(regions.root, name);

    assert!(matches!(result, Err(ZincError::Argument(_))));
}

#[rstest]
fn given_existing_child_when_creating_same_name_then_argument_error(mut regions: Regions) {
    let root = regions.root;
    regions.ctx.create_child(root, "a").unwrap();

    let result = regions.ctx.create_child(root, "a");

    assert!(matches!(result, Err(ZincError::Argument(_))));
    assert_eq!(regions.ctx.region_children(root).len(), 1);
}

#[rstest]
fn given_existing_path_when_creating_subregion_then_none(mut regions: Regions) {
    let root = regions.root;
    let created = regions.ctx.create_subregion(root, "x/y/z");

    assert!(created.is_some());
    assert_eq!(regions.ctx.region_path(created.unwrap()), "x/y/z");
    assert_eq!(regions.ctx.create_subregion(root, "x/y/z"), None);
}

#[rstest]
fn given_sibling_name_when_renaming_then_argument_error(mut regions: Regions) {
    let root = regions.root;
    let a = regions.ctx.create_child(root, "a").unwrap();
    regions.ctx.create_child(root, "b").unwrap();

    let result = regions.ctx.set_region_name(a, "b");

    assert!(matches!(result, Err(ZincError::Argument(_))));
    assert_eq!(regions.ctx.region_name(a), Some("a"));
}

// ============================================================
// Insertion and removal
// ============================================================

#[rstest]
fn given_three_children_when_inserting_before_first_then_reordered(mut regions: Regions) {
    let ctx = &mut regions.ctx;
    let root = regions.root;
    let a = ctx.create_child(root, "a").unwrap();
    let b = ctx.create_child(root, "b").unwrap();
    let c = ctx.create_child(root, "c").unwrap();

    ctx.insert_child_before(root, c, Some(a)).unwrap();

    assert_eq!(ctx.region_children(root), vec![c, a, b]);
    assert_eq!(ctx.first_child(root), Some(c));
    assert_eq!(ctx.next_sibling(c), Some(a));
    assert_eq!(ctx.previous_sibling(c), None);
}

#[rstest]
fn given_ancestor_when_appended_to_descendant_then_argument_error(mut regions: Regions) {
    let ctx = &mut regions.ctx;
    let root = regions.root;
    let a = ctx.create_child(root, "a").unwrap();
    let b = ctx.create_child(a, "b").unwrap();

    let result = ctx.append_child(b, a);

    assert!(matches!(result, Err(ZincError::Argument(_))));
    assert_eq!(ctx.region_parent(a), Some(root));
}

#[rstest]
fn given_child_of_other_parent_when_appended_then_moved(mut regions: Regions) {
    let ctx = &mut regions.ctx;
    let root = regions.root;
    let a = ctx.create_child(root, "a").unwrap();
    let b = ctx.create_child(root, "b").unwrap();
    let x = ctx.create_child(a, "x").unwrap();

    ctx.append_child(b, x).unwrap();

    assert_eq!(ctx.region_parent(x), Some(b));
    assert!(ctx.region_children(a).is_empty());
    assert_eq!(ctx.region_path(x), "b/x");
}

#[rstest]
fn given_non_child_when_removing_then_argument_error(mut regions: Regions) {
    let ctx = &mut regions.ctx;
    let root = regions.root;
    let a = ctx.create_child(root, "a").unwrap();
    let b = ctx.create_child(a, "b").unwrap();

    let result = ctx.remove_child(root, b);

    assert!(matches!(result, Err(ZincError::Argument(_))));
}

#[rstest]
fn given_held_child_when_removed_then_survives_as_root(mut regions: Regions) {
    let ctx = &mut regions.ctx;
    let root = regions.root;
    let a = ctx.create_child(root, "a").unwrap();
    ctx.access_region(a).unwrap();

    ctx.remove_child(root, a).unwrap();

    assert!(ctx.region_exists(a));
    assert!(ctx.is_root(a));
    assert_eq!(ctx.region_access_count(a), 1);
    ctx.release_region(a).unwrap();
    assert!(!ctx.region_exists(a));
}

// ============================================================
// Callbacks
// ============================================================

#[rstest]
fn given_single_child_added_when_notified_then_child_reported(mut regions: Regions) {
    let root = regions.root;
    let seen = record_changes(&mut regions.ctx, root);

    let a = regions.ctx.create_child(root, "a").unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].children_changed);
    assert_eq!(seen[0].child_added, Some(a));
    assert_eq!(seen[0].child_removed, None);
}

#[rstest]
fn given_two_children_added_in_one_scope_when_notified_then_once_without_child(mut regions: Regions) {
    let root = regions.root;
    let seen = record_changes(&mut regions.ctx, root);

    regions.ctx.begin_change(root).unwrap();
    regions.ctx.create_child(root, "a").unwrap();
    regions.ctx.create_child(root, "b").unwrap();
    assert!(seen.borrow().is_empty());
    regions.ctx.end_change(root).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].children_changed);
    assert_eq!(seen[0].child_added, None);
    assert_eq!(seen[0].child_removed, None);
}

#[rstest]
fn given_rename_when_notified_then_name_changed(mut regions: Regions) {
    let root = regions.root;
    let a = regions.ctx.create_child(root, "a").unwrap();
    let seen = record_changes(&mut regions.ctx, a);

    regions.ctx.set_region_name(a, "renamed").unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].name_changed);
    assert!(!seen[0].children_changed);
}

#[rstest]
fn given_removed_callback_when_changing_then_not_called(mut regions: Regions) {
    let root = regions.root;
    let calls = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&calls);
    let id = regions
        .ctx
        .add_callback(root, move |_, _| *sink.borrow_mut() += 1)
        .unwrap();

    regions.ctx.remove_callback(root, id).unwrap();
    regions.ctx.create_child(root, "a").unwrap();

    assert_eq!(*calls.borrow(), 0);
    assert_eq!(regions.ctx.remove_callback(root, id), Err(ZincError::NotFound));
}

// ============================================================
// Change levels
// ============================================================

#[rstest]
fn given_unbalanced_end_when_ending_change_then_general_error_and_level_zero(mut regions: Regions) {
    let root = regions.root;
    regions.ctx.begin_change(root).unwrap();
    regions.ctx.end_change(root).unwrap();

    let result = regions.ctx.end_change(root);

    assert!(matches!(result, Err(ZincError::General(_))));
    assert_eq!(regions.ctx.change_level(root), 0);
}

#[rstest]
fn given_hierarchical_change_when_moving_child_out_then_levels_rebalanced(mut regions: Regions) {
    // Arrange
    let ctx = &mut regions.ctx;
    let root = regions.root;
    let a = ctx.create_child(root, "a").unwrap();
    let b = ctx.create_child(root, "b").unwrap();
    let c = ctx.create_child(a, "c").unwrap();
    ctx.begin_hierarchical_change(a).unwrap();
    assert_eq!(ctx.change_level(c), 1);

    // Act
    ctx.append_child(b, c).unwrap();

    // Assert
    assert_eq!(ctx.change_level(c), 0);
    ctx.end_hierarchical_change(a).unwrap();
    assert_eq!(ctx.change_level(a), 0);
    assert_eq!(ctx.change_level(c), 0);
}

#[rstest]
fn given_hierarchical_change_when_moving_child_in_then_child_caches_until_end(mut regions: Regions) {
    // Arrange
    let ctx = &mut regions.ctx;
    let root = regions.root;
    let a = ctx.create_child(root, "a").unwrap();
    let b = ctx.create_child(root, "b").unwrap();
    let d = ctx.create_child(b, "d").unwrap();
    ctx.begin_hierarchical_change(a).unwrap();

    // Act
    ctx.append_child(a, d).unwrap();

    // Assert
    assert_eq!(ctx.change_level(d), 1);
    ctx.end_hierarchical_change(a).unwrap();
    assert_eq!(ctx.change_level(d), 0);
}

#[rstest]
fn given_no_hierarchical_change_when_ending_then_general_error(mut regions: Regions) {
    let root = regions.root;

    let result = regions.ctx.end_hierarchical_change(root);

    assert!(matches!(result, Err(ZincError::General(_))));
}

// ============================================================
// Display
// ============================================================

#[rstest]
fn given_regions_with_fields_when_rendering_tree_then_names_and_fields_shown(mut regions: Regions) {
    let ctx = &mut regions.ctx;
    let root = regions.root;
    let heart = ctx.create_child(root, "heart").unwrap();
    ctx.create_node(heart, NodesetDomain::Nodes, Some(1)).unwrap();
    let group = ctx.create_field_group(heart).unwrap();
    ctx.set_field_name(group, "bob").unwrap();
    let nodes = ctx
        .group_create_node_group(group, heart, NodesetDomain::Nodes)
        .unwrap();
    ctx.node_group_add_nodes_in_identifier_range(nodes, 1, 1)
        .unwrap();

    let rendered = ctx.region_tree(root).to_string();
    let group_rendered = ctx.group_tree(group).to_string();

    assert!(rendered.starts_with('/'));
    assert!(rendered.contains("heart [bob, bob.nodes]"), "{}", rendered);
    assert!(group_rendered.contains("heart:bob (nodes=1)"), "{}", group_rendered);
}
