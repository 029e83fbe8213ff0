use std::rc::Rc;
use std::sync::Arc;

use forum_access::store::{MemoryAccess, MemoryCategoryStore, MemoryUserDirectory};
use forum_access::{Category, Forum, ForumConfig, ForumServices, User};

fn forum_with(categories: Vec<Category>) -> Forum {
    let store = MemoryCategoryStore::with_categories(categories).unwrap();
    ForumServices::new(
        ForumConfig::default(),
        Arc::new(store),
        Arc::new(MemoryUserDirectory::new()),
        Arc::new(MemoryAccess::new()),
    )
    .session(User::guest())
}

#[test]
fn section_sums_children_and_picks_latest() {
    let forum = forum_with(vec![
        Category::new(1, 0, "Section"),
        Category::new(2, 1, "Older").with_counts(3, 10).with_last_post(11, 110, 100),
        Category::new(3, 1, "Newer").with_counts(5, 20).with_last_post(12, 120, 200),
    ]);
    let section = forum.category(1).unwrap();

    assert_eq!(forum.topics(&section).unwrap(), 8);
    assert_eq!(forum.posts(&section).unwrap(), 30);
    assert_eq!(forum.replies(&section).unwrap(), 22);
    assert_eq!(forum.last_category(&section).unwrap().id, Some(3));
    assert!(forum.is_section(&section).unwrap());
}

#[test]
fn replies_never_go_negative() {
    let forum = forum_with(vec![Category::new(1, 0, "Broken").with_counts(9, 4)]);
    let broken = forum.category(1).unwrap();
    assert_eq!(forum.replies(&broken).unwrap(), 0);
}

#[test]
fn negative_counters_are_clamped() {
    let forum = forum_with(vec![
        Category::new(1, 0, "Section"),
        Category::new(2, 1, "Corrupt").with_counts(-4, -9),
        Category::new(3, 1, "Fine").with_counts(2, 6),
    ]);
    let section = forum.category(1).unwrap();
    assert_eq!(forum.topics(&section).unwrap(), 2);
    assert_eq!(forum.posts(&section).unwrap(), 6);
}

#[test]
fn huge_counters_saturate() {
    let forum = forum_with(vec![
        Category::new(1, 0, "Section"),
        Category::new(2, 1, "Busy").with_counts(i64::MAX, i64::MAX),
        Category::new(3, 1, "Busier").with_counts(i64::MAX, i64::MAX),
    ]);
    let section = forum.category(1).unwrap();
    assert_eq!(forum.topics(&section).unwrap(), i64::MAX);
    assert_eq!(forum.posts(&section).unwrap(), i64::MAX);
    assert_eq!(forum.replies(&section).unwrap(), 0);
}

#[test]
fn deep_trees_count_every_level_once() {
    let forum = forum_with(vec![
        Category::new(1, 0, "Section").with_counts(1, 1),
        Category::new(2, 1, "Child").with_counts(2, 2),
        Category::new(3, 2, "Grandchild").with_counts(4, 4).with_last_post(30, 300, 500),
        Category::new(4, 3, "Great-grandchild").with_counts(8, 8),
    ]);
    let section = forum.category(1).unwrap();
    assert_eq!(forum.topics(&section).unwrap(), 15);
    assert_eq!(forum.last_category(&section).unwrap().id, Some(3));

    let child = forum.category(2).unwrap();
    assert_eq!(forum.topics(&child).unwrap(), 14);
    assert!(!forum.is_section(&child).unwrap());
}

#[test]
fn channel_content_is_included() {
    let forum = forum_with(vec![
        Category::new(1, 0, "Section"),
        Category::new(2, 1, "Source").with_counts(6, 12).with_last_post(1, 2, 50),
        Category::new(3, 0, "Other section"),
        Category::new(4, 3, "Alias").with_channels("2"),
    ]);
    let alias = forum.category(4).unwrap();
    assert_eq!(forum.topics(&alias).unwrap(), 6);
    assert_eq!(forum.last_category(&alias).unwrap().id, Some(2));
}

#[test]
fn cyclic_channels_terminate() {
    let forum = forum_with(vec![
        Category::new(1, 0, "Section"),
        Category::new(2, 1, "Left").with_channels("THIS,3").with_counts(1, 1),
        Category::new(3, 1, "Right").with_channels("THIS,2").with_counts(2, 2),
    ]);
    let left = forum.category(2).unwrap();
    let right = forum.category(3).unwrap();

    // Right is folded into left while left is still being built, so right
    // sees only left's own counters.
    assert_eq!(forum.topics(&left).unwrap(), 4);
    assert_eq!(forum.topics(&right).unwrap(), 3);
    assert!(forum.topics(&forum.category(1).unwrap()).unwrap() > 0);
}

#[test]
fn equal_timestamps_keep_the_first_candidate() {
    let forum = forum_with(vec![
        Category::new(1, 0, "Section").with_last_post(1, 1, 100),
        Category::new(2, 1, "Same time").with_last_post(2, 2, 100),
        Category::new(3, 1, "Same time too").with_last_post(3, 3, 100),
    ]);
    let section = forum.category(1).unwrap();
    assert_eq!(forum.last_category(&section).unwrap().id, Some(1));
}

#[test]
fn aggregate_is_built_once() {
    let forum = forum_with(vec![
        Category::new(1, 0, "Section"),
        Category::new(2, 1, "Child").with_counts(1, 3),
    ]);
    let section = forum.category(1).unwrap();
    let first = forum.build_info(&section).unwrap();
    let second = forum.build_info(&section).unwrap();
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
fn saving_rebuilds_aggregates() {
    let forum = forum_with(vec![
        Category::new(1, 0, "Section"),
        Category::new(2, 1, "Child").with_counts(1, 3),
    ]);
    let section = forum.category(1).unwrap();
    assert_eq!(forum.topics(&section).unwrap(), 1);

    let child = forum.category(2).unwrap();
    forum
        .save_category(child.as_ref().clone().with_counts(7, 9))
        .unwrap();

    let section = forum.category(1).unwrap();
    assert_eq!(forum.topics(&section).unwrap(), 7);
}
