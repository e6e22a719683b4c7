//! Shared fixtures of integration tests.
//!
//! Set `RUST_LOG=aatree=trace` to see claim conflicts and retries of tree operations.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use aatree::{AaNode, AaTree, Linked, WalkOrder};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install test subscriber once per test binary.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Tree entry: key used for ordering and value which identifies concrete insert.
pub struct Entry {
    pub key: usize,
    pub value: usize,
    node: AaNode<Entry>,
}

impl Entry {
    pub fn boxed(key: usize, value: usize) -> Box<Entry> {
        Box::new(Entry {
            key,
            value,
            node: AaNode::new(),
        })
    }
}

unsafe impl Linked for Entry {
    fn links(&self) -> &AaNode<Self> {
        &self.node
    }
}

pub type Tree = AaTree<usize, Entry>;

pub fn tree() -> Tree {
    AaTree::new(|key: &usize, entry: &Entry| key.cmp(&entry.key))
}

/// Tree which counts released entries.
pub fn counted_tree(released: Arc<AtomicUsize>) -> Tree {
    AaTree::with_release(
        |key: &usize, entry: &Entry| key.cmp(&entry.key),
        move |_: Box<Entry>| {
            released.fetch_add(1, Ordering::AcqRel);
        },
    )
}

pub fn keys(tree: &Tree) -> Vec<usize> {
    let guard = crossbeam_epoch::pin();
    let mut keys = Vec::with_capacity(tree.len());
    tree.walk(WalkOrder::InOrder, |entry| keys.push(entry.key), &guard);
    keys
}

/// Assert that every invariant of tree holds.
pub fn assert_valid(tree: &Tree) {
    let guard = crossbeam_epoch::pin();
    if let Err(e) = tree.verify(&guard) {
        panic!("Tree invariant violated: {}", e);
    }
    let keys = keys(tree);
    assert!(
        keys.windows(2).all(|pair| pair[0] < pair[1]),
        "In-order walk is not strictly ascending: {:?}",
        keys
    );
}

/// Wait until deferred release callbacks of removed entries executed.
pub fn wait_for_releases(released: &AtomicUsize, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while released.load(Ordering::Acquire) < expected {
        assert!(
            Instant::now() < deadline,
            "Only {} of {} entries released",
            released.load(Ordering::Acquire),
            expected
        );
        crossbeam_epoch::pin().flush();
        std::thread::yield_now();
    }
}
