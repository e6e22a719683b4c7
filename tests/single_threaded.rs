use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::prelude::*;
use rand::{thread_rng, Rng};

use aatree::WalkOrder;
use common::{assert_valid, counted_tree, keys, tree, wait_for_releases, Entry, Tree};

mod common;

#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn test_insertion(elements: Vec<(usize, usize)>) -> Tree {
    common::init_tracing();
    let tree = tree();
    for &(key, value) in &elements {
        let guard = crossbeam_epoch::pin();
        assert!(tree.insert(&key, Entry::boxed(key, value), &guard).is_ok());
    }
    assert_valid(&tree);

    let expected: BTreeMap<usize, usize> = elements.into_iter().collect();
    let guard = crossbeam_epoch::pin();
    let mut scanned = Vec::with_capacity(tree.len());
    tree.walk(
        WalkOrder::InOrder,
        |entry| scanned.push((entry.key, entry.value)),
        &guard,
    );
    assert_eq!(scanned, expected.into_iter().collect::<Vec<_>>());
    tree
}

fn fill(tree: &Tree, size: usize) -> Vec<(usize, usize)> {
    let mut expected_items = Vec::with_capacity(size);
    for key in 0..size {
        let value = thread_rng().gen::<usize>();
        let guard = crossbeam_epoch::pin();
        assert!(tree.insert(&key, Entry::boxed(key, value), &guard).is_ok());
        expected_items.push((key, value));
    }
    expected_items
}

fn remove_all(tree: &Tree, items: &[(usize, usize)]) {
    for (i, (key, value)) in items.iter().enumerate() {
        let guard = crossbeam_epoch::pin();
        let found = tree
            .search(key, &guard)
            .unwrap_or_else(|| panic!("Inserted key {} not found", key));
        assert_eq!(found.value, *value);
        assert!(
            tree.remove(key, &guard),
            "Inserted element cannot be removed because not found"
        );
        assert!(tree.search(key, &guard).is_none());
        if i % 64 == 0 {
            assert_valid(tree);
        }
    }
    assert!(tree.is_empty(), "Tree not empty");
    assert!(keys(tree).is_empty());
}

#[test]
fn sequential_key_insert() {
    let size = thread_rng().gen_range(5000..10000);
    println!("Tree size: {:?}", size);
    let elems = (0..size).map(|i| (i, thread_rng().gen())).collect();
    test_insertion(elems);
}

#[test]
fn reversed_key_insert() {
    let size = thread_rng().gen_range(5000..10000);
    println!("Tree size: {:?}", size);
    let elems = (0..size).rev().map(|i| (i, thread_rng().gen())).collect();
    test_insertion(elems);
}

#[test]
fn random_key_insert() {
    let size = thread_rng().gen_range(5000..10000);
    println!("Tree size: {:?}", size);
    let mut elems: Vec<(usize, usize)> = (0..size).map(|i| (i, thread_rng().gen())).collect();
    elems.shuffle(&mut thread_rng());
    test_insertion(elems);
}

/// Runs of ascending and descending keys which land between already inserted ones.
#[test]
fn interleaved_runs_insert() {
    let mut elems = Vec::new();
    for i in 0..15 {
        elems.push((i + 100, i));
    }
    for i in (86..100).rev() {
        elems.push((i, i));
    }
    for i in 130..145 {
        elems.push((i, i));
    }
    for i in 115..130 {
        elems.push((i, i));
    }
    test_insertion(elems);
}

#[test]
fn duplicate_insert_keeps_first_entry() {
    let tree = tree();
    let guard = crossbeam_epoch::pin();
    for key in 0..100 {
        assert!(tree.insert(&key, Entry::boxed(key, 1), &guard).is_ok());
    }
    let shape: Vec<usize> = {
        let mut shape = Vec::new();
        tree.walk(WalkOrder::PreOrder, |entry| shape.push(entry.key), &guard);
        shape
    };

    for key in 0..100 {
        let rejected = tree
            .insert(&key, Entry::boxed(key, 2), &guard)
            .expect_err("Duplicate key inserted");
        assert_eq!(rejected.key, key);
        assert_eq!(rejected.value, 2);
        assert_eq!(tree.search(&key, &guard).map(|e| e.value), Some(1));
    }

    let mut after = Vec::new();
    tree.walk(WalkOrder::PreOrder, |entry| after.push(entry.key), &guard);
    assert_eq!(shape, after);
    assert_eq!(tree.len(), 100);
}

#[test]
fn walk_orders_agree() {
    let tree = tree();
    let mut keys: Vec<usize> = (0..1000).collect();
    keys.shuffle(&mut thread_rng());
    let guard = crossbeam_epoch::pin();
    for key in keys {
        assert!(tree.insert(&key, Entry::boxed(key, key), &guard).is_ok());
    }

    let mut pre = Vec::new();
    let mut post = Vec::new();
    tree.walk(WalkOrder::PreOrder, |entry| pre.push(entry.key), &guard);
    tree.walk(WalkOrder::PostOrder, |entry| post.push(entry.key), &guard);
    assert_eq!(pre.len(), 1000);
    assert_eq!(post.len(), 1000);
    // root first in pre-order and last in post-order
    assert_eq!(pre.first(), post.last());

    pre.sort_unstable();
    post.sort_unstable();
    assert_eq!(pre, (0..1000).collect::<Vec<usize>>());
    assert_eq!(post, pre);
}

#[test]
fn deletes_starting_from_tree_start() {
    let size = thread_rng().gen_range(1000..5000);
    println!("Tree size: {:?}", size);
    let tree = tree();
    for _ in 0..2 {
        let expected_items = fill(&tree, size);
        remove_all(&tree, &expected_items);
    }
}

#[test]
fn deletes_starting_from_tree_end() {
    let size = thread_rng().gen_range(1000..5000);
    println!("Tree size: {:?}", size);
    let tree = tree();
    for _ in 0..2 {
        let mut expected_items = fill(&tree, size);
        expected_items.reverse();
        remove_all(&tree, &expected_items);
    }
}

#[test]
fn deletes_at_random_positions() {
    let size = thread_rng().gen_range(1000..5000);
    println!("Tree size: {:?}", size);
    let tree = tree();
    for _ in 0..2 {
        let mut expected_items = fill(&tree, size);
        expected_items.shuffle(&mut thread_rng());
        remove_all(&tree, &expected_items);
    }
}

#[test]
fn mixed_operations() {
    common::init_tracing();
    let tree = tree();
    let mut model = BTreeMap::new();
    for _ in 0..20000 {
        let key = thread_rng().gen_range(0..500);
        let guard = crossbeam_epoch::pin();
        match thread_rng().gen_range(0..3) {
            0 => {
                let value = thread_rng().gen::<usize>();
                let inserted = tree.insert(&key, Entry::boxed(key, value), &guard).is_ok();
                assert_eq!(inserted, !model.contains_key(&key));
                model.entry(key).or_insert(value);
            }
            1 => assert_eq!(tree.remove(&key, &guard), model.remove(&key).is_some()),
            _ => assert_eq!(
                tree.search(&key, &guard).map(|e| e.value),
                model.get(&key).copied()
            ),
        }
        assert_eq!(tree.len(), model.len());
    }
    assert_valid(&tree);
    assert_eq!(keys(&tree), model.keys().copied().collect::<Vec<usize>>());
}

#[test]
fn release_after_remove_and_destroy() {
    let released = Arc::new(AtomicUsize::new(0));
    let mut tree = counted_tree(released.clone());
    let items = fill(&tree, 1000);

    for (key, _) in items.iter().filter(|(key, _)| key % 4 == 0) {
        let guard = crossbeam_epoch::pin();
        assert!(tree.remove(key, &guard));
        // release deferred while guard pinned
        assert!(tree.search(key, &guard).is_none());
    }
    wait_for_releases(&released, 250);
    assert_eq!(released.load(Ordering::Acquire), 250);

    tree.destroy();
    assert_eq!(released.load(Ordering::Acquire), 1000);
    assert!(tree.is_empty());

    // tree reusable after destroy
    let items = fill(&tree, 100);
    assert_valid(&tree);
    remove_all(&tree, &items);
    wait_for_releases(&released, 1100);
}
