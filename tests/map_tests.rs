//! FutureMap Tests
//!
//! Tests verify:
//! - Resolve-before-get and get-before-resolve
//! - Fan-out to many waiters
//! - Overwrite and delete semantics
//! - Simultaneous writers
//! - Setter and map drop behaviour
//! - Supplementary read operations

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::thread;
use std::time::Duration;

use futurekv::{FutureKvError, FutureMap};
use parking_lot::Mutex;

// =============================================================================
// Helper Functions
// =============================================================================

fn new_map() -> FutureMap<String, String> {
    FutureMap::new()
}

fn key(s: &str) -> String {
    s.to_string()
}

fn seeded_map() -> FutureMap<String, String> {
    let mut values = HashMap::new();
    values.insert(key("hello"), key("world"));
    FutureMap::from_map(values)
}

// =============================================================================
// Basic Resolution Tests
// =============================================================================

#[test]
fn test_set_then_get() {
    let map = new_map();

    map.set(key("hello")).send(key("world"));
    let promise = map.get(key("hello"));

    assert!(promise.is_ready());
    assert_eq!(promise.wait().unwrap(), "world");
}

#[test]
fn test_get_then_set() {
    let map = new_map();

    let promise = map.get(key("hello"));
    assert!(!promise.is_ready());

    map.set(key("hello")).send(key("world"));

    assert!(promise.is_ready());
    assert_eq!(promise.wait().unwrap(), "world");
}

#[test]
fn test_get_then_set_from_another_thread() {
    let map = new_map();
    let promise = map.get(key("hello"));

    let writer = map.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        writer.set(key("hello")).send(key("world"));
    });

    assert_eq!(promise.wait().unwrap(), "world");
    handle.join().unwrap();
}

#[test]
fn test_setter_obtained_before_get() {
    let map = new_map();

    let setter = map.set(key("hello"));
    let promise = map.get(key("hello"));
    assert!(!promise.is_ready());

    setter.send(key("world"));
    assert_eq!(promise.wait().unwrap(), "world");
}

#[test]
fn test_insert_shorthand() {
    let map = new_map();

    map.insert(key("hello"), key("world"));

    assert_eq!(map.try_get("hello"), Some(key("world")));
}

#[test]
fn test_seeded_map_serves_initial_values() {
    let map = seeded_map();

    let promise = map.get(key("hello"));

    assert!(promise.is_ready());
    assert_eq!(promise.wait().unwrap(), "world");
}

#[test]
fn test_from_hashmap_conversion() {
    let mut values = HashMap::new();
    values.insert(1u32, 10u64);
    values.insert(2u32, 20u64);

    let map: FutureMap<u32, u64> = values.into();

    assert_eq!(map.len(), 2);
    assert_eq!(map.get(2).wait().unwrap(), 20);
}

// =============================================================================
// Fan-out Tests
// =============================================================================

#[test]
fn test_multiple_reads_after_set() {
    let map = new_map();
    map.set(key("hello")).send(key("world"));

    let first = map.get(key("hello"));
    let second = map.get(key("hello"));
    let third = map.get(key("hello"));

    assert_eq!(first.wait().unwrap(), "world");
    assert_eq!(second.wait().unwrap(), "world");
    assert_eq!(third.wait().unwrap(), "world");

    assert_eq!(map.get(key("hello")).wait().unwrap(), "world");
}

#[test]
fn test_fan_out_to_pending_waiters() {
    let map = new_map();

    let promises: Vec<_> = (0..16).map(|_| map.get(key("hello"))).collect();
    assert_eq!(map.waiter_count("hello"), 16);

    map.set(key("hello")).send(key("world"));

    assert_eq!(map.waiter_count("hello"), 0);
    for promise in promises {
        assert_eq!(promise.wait().unwrap(), "world");
    }
}

#[test]
fn test_waiters_fulfilled_in_registration_order() {
    let map: FutureMap<u32, u32> = FutureMap::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut promises: Vec<_> = (0..8).map(|_| map.get(1)).collect();
    for (index, promise) in promises.iter_mut().enumerate() {
        let order = Arc::clone(&order);
        let waker = waker_fn::waker_fn(move || order.lock().push(index));
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(promise).poll(&mut cx).is_pending());
    }

    map.insert(1, 100);

    assert_eq!(*order.lock(), (0..8).collect::<Vec<usize>>());
    for promise in promises {
        assert_eq!(promise.wait().unwrap(), 100);
    }
}

#[test]
fn test_fan_out_across_threads() {
    let map: Arc<FutureMap<u32, u32>> = Arc::new(FutureMap::new());

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let promise = map.get(7);
            thread::spawn(move || promise.wait().unwrap())
        })
        .collect();

    map.set(7).send(49);

    for reader in readers {
        assert_eq!(reader.join().unwrap(), 49);
    }
}

#[test]
fn test_waiters_only_affect_their_key() {
    let map = new_map();

    let hello = map.get(key("hello"));
    let other = map.get(key("other"));

    map.insert(key("hello"), key("world"));

    assert!(hello.is_ready());
    assert!(!other.is_ready());
    assert!(map.is_pending("other"));
    assert!(!map.is_pending("hello"));
}

// =============================================================================
// Overwrite / Delete Tests
// =============================================================================

#[test]
fn test_overwrite() {
    let map = new_map();

    map.set(key("hello")).send(key("world"));
    map.set(key("hello")).send(key("universe"));

    assert_eq!(map.get(key("hello")).wait().unwrap(), "universe");
    assert_eq!(map.len(), 1);
}

#[test]
fn test_delete_removes_visibility() {
    let map = seeded_map();

    let removed = map.delete("hello");
    let mut promise = map.get(key("hello"));

    assert_eq!(removed, Some(key("world")));
    assert!(!promise.is_ready());
    assert!(promise.try_take().is_none());
    assert!(map.is_empty());
}

#[test]
fn test_delete_absent_key_is_noop() {
    let map = seeded_map();

    assert_eq!(map.delete("missing"), None);
    assert_eq!(map.len(), 1);
}

#[test]
fn test_delete_leaves_waiters_registered() {
    let map = new_map();

    let promise = map.get(key("hello"));
    map.delete("hello");

    assert_eq!(map.waiter_count("hello"), 1);

    map.insert(key("hello"), key("world"));
    assert_eq!(promise.wait().unwrap(), "world");
}

#[test]
fn test_set_after_delete_resolves_again() {
    let map = seeded_map();

    map.delete("hello");
    let promise = map.get(key("hello"));
    map.insert(key("hello"), key("again"));

    assert_eq!(promise.wait().unwrap(), "again");
}

// =============================================================================
// Simultaneous Write Tests
// =============================================================================

#[test]
fn test_simultaneous_writes() {
    let map = new_map();
    let promise = map.get(key("hello"));

    let first = map.set(key("hello"));
    let second = map.set(key("hello"));

    let a = thread::spawn(move || first.send(key("world")));
    let b = thread::spawn(move || second.send(key("universe")));
    a.join().unwrap();
    b.join().unwrap();

    let value = promise.wait().unwrap();
    assert!(value == "world" || value == "universe");

    let stored = map.try_get("hello").unwrap();
    assert!(stored == "world" || stored == "universe");
}

#[test]
fn test_concurrent_writers_distinct_keys() {
    let map: FutureMap<u32, u32> = FutureMap::new();

    let writers: Vec<_> = (0..8)
        .map(|t| {
            let map = map.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let k = t * 100 + i;
                    map.insert(k, k * 2);
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(map.len(), 800);
    assert_eq!(map.try_get(&799), Some(1598));
}

// =============================================================================
// Liveness Tests
// =============================================================================

#[test]
fn test_dropped_setter_leaves_waiters_pending() {
    let map = new_map();
    let promise = map.get(key("hello"));

    drop(map.set(key("hello")));

    assert_eq!(
        promise.wait_timeout(Duration::from_millis(50)),
        Err(FutureKvError::Timeout)
    );
    assert!(map.is_pending("hello"));
}

#[test]
fn test_dropping_map_closes_waiters() {
    let map = new_map();
    let promise = map.get(key("hello"));

    drop(map);

    assert_eq!(promise.wait(), Err(FutureKvError::MapDropped));
}

#[test]
fn test_outstanding_setter_keeps_storage_alive() {
    let map = new_map();
    let promise = map.get(key("hello"));
    let setter = map.set(key("hello"));

    drop(map);
    setter.send(key("world"));

    assert_eq!(promise.wait().unwrap(), "world");
}

// =============================================================================
// Read Operation Tests
// =============================================================================

#[test]
fn test_try_get_does_not_register() {
    let map = new_map();

    assert_eq!(map.try_get("hello"), None);
    assert_eq!(map.waiter_count("hello"), 0);
    assert!(!map.is_pending("hello"));
}

#[test]
fn test_contains_key() {
    let map = seeded_map();

    assert!(map.contains_key("hello"));
    assert!(!map.contains_key("missing"));
}

#[test]
fn test_clones_share_storage() {
    let map = new_map();
    let other = map.clone();

    other.insert(key("hello"), key("world"));

    assert_eq!(map.try_get("hello"), Some(key("world")));
}

#[test]
fn test_debug_output() {
    let map = seeded_map();
    let _pending = map.get(key("missing"));

    let debug = format!("{:?}", map);

    assert!(debug.contains("values: 1"));
    assert!(debug.contains("pending_keys: 1"));
}
