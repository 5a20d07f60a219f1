//! FutureMap Module
//!
//! Thread-safe key-value map whose reads can wait for values that do not
//! exist yet.
//!
//! ## Responsibilities
//! - Serve already-resolved keys on a shared read lock
//! - Register waiters for absent keys and hand back a [`Promise`]
//! - Resolve a key: store the value, flush every waiter, clear the wave
//! - Run `get_else_set` producers off the caller's thread, once per absent key
//!
//! ## Per-key states
//!
//! ```text
//!   Absent ──get──▶ Pending ──resolve──▶ Resolved ──delete──▶ Absent
//!                                          │   ▲
//!                                          └───┘ resolve (overwrite)
//! ```
//!
//! There is no `Pending → Absent` edge: `delete` never touches waiters.

use std::any::Any;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::Waker;

use parking_lot::RwLock;

use crate::config::MapConfig;
use crate::error::{FutureKvError, Result};
use crate::executor::Executor;
use crate::promise::{Promise, Resolver};

/// Outcome of flushing one key's waiters
///
/// Async wakers are held here until the map lock is released.
#[must_use]
struct Flush {
    waiters: usize,
    wakers: Vec<Waker>,
}

impl Flush {
    fn wake(self) -> usize {
        for waker in self.wakers {
            waker.wake();
        }
        self.waiters
    }
}

/// State guarded by the map-wide lock
struct State<K, V> {
    /// Resolved values
    values: HashMap<K, V>,

    /// Pending waiters per key, in registration order
    waiters: HashMap<K, Vec<Resolver<V>>>,

    /// Number of producers currently running per key
    in_flight: HashMap<K, usize>,
}

impl<K, V> State<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Register a waiter for `key`
    fn register(&mut self, key: K) -> Promise<V> {
        let (resolver, promise) = Promise::pending();
        self.waiters.entry(key).or_default().push(resolver);
        promise
    }

    /// Store `value` and deliver it to every waiter for `key`, in
    /// registration order
    fn resolve(&mut self, key: K, value: V) -> Flush {
        let waiters = self.waiters.remove(&key).unwrap_or_default();
        let flush = Flush {
            waiters: waiters.len(),
            wakers: waiters
                .into_iter()
                .filter_map(|waiter| waiter.resolve(value.clone()))
                .collect(),
        };
        self.values.insert(key, value);
        flush
    }

    /// Fail every waiter registered for `key` without storing anything
    fn reject(&mut self, key: &K, error: FutureKvError) -> Flush {
        let waiters = self.waiters.remove(key).unwrap_or_default();
        Flush {
            waiters: waiters.len(),
            wakers: waiters
                .into_iter()
                .filter_map(|waiter| waiter.reject(error.clone()))
                .collect(),
        }
    }

    fn producer_started(&mut self, key: K) {
        *self.in_flight.entry(key).or_insert(0) += 1;
    }

    fn producer_finished(&mut self, key: &K) {
        if let Some(running) = self.in_flight.get_mut(key) {
            *running -= 1;
            if *running == 0 {
                self.in_flight.remove(key);
            }
        }
    }
}

/// Storage shared by every map handle, setter, and running producer
struct Shared<K, V> {
    state: RwLock<State<K, V>>,
}

impl<K, V> Shared<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Fast path: read-locked lookup of a resolved value
    fn lookup<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.state.read().values.get(key).cloned()
    }

    /// Resolve `key` under a single write-lock acquisition
    fn resolve(&self, key: K, value: V) {
        let flush = self.state.write().resolve(key, value);
        let flushed = flush.wake();
        tracing::debug!("Resolved key, flushed {} waiters", flushed);
    }

    /// Run a producer and resolve (or fail) its key with the outcome
    fn run_producer<F>(&self, key: K, producer: F)
    where
        F: FnOnce() -> V,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(producer));

        let mut state = self.state.write();
        state.producer_finished(&key);

        match outcome {
            Ok(value) => {
                let flush = state.resolve(key, value);
                drop(state);
                let flushed = flush.wake();
                tracing::debug!("Producer resolved key, flushed {} waiters", flushed);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let flush = state.reject(&key, FutureKvError::ProducerPanicked(message.clone()));
                drop(state);
                let rejected = flush.wake();
                tracing::warn!(
                    "Producer panicked ({}), failed {} waiters",
                    message,
                    rejected
                );
            }
        }
    }
}

/// Best-effort text of a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Thread-safe map whose reads return promises
///
/// ## Concurrency Model
///
/// - **Resolved reads** (`get` hit, `try_get`): shared read lock only
/// - **Everything else** (register, resolve + flush, delete): one map-wide
///   write lock, so a resolution and its flush are atomic with respect to
///   every other registration and resolution; async wakers of the flushed
///   promises are woken only after the lock is released
/// - **Producers** run on the configured executor, never while the lock is held
///
/// Cloning a `FutureMap` gives another handle to the same storage.
///
/// Nothing here ever times out: a promise for a key that is never resolved
/// stays pending. Keys are kept until explicitly deleted.
pub struct FutureMap<K, V> {
    shared: Arc<Shared<K, V>>,

    /// Where `get_else_set` producers run
    executor: Arc<Executor>,

    /// Attach late `get_else_set` callers to an in-flight producer
    coalesce_producers: bool,
}

impl<K, V> FutureMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty map with the default config
    pub fn new() -> Self {
        Self::from_map(HashMap::new())
    }

    /// Create a map pre-seeded with `values`, using the default config
    pub fn from_map(values: HashMap<K, V>) -> Self {
        let config = MapConfig::default();
        let executor = Executor::thread_per_task(&config.thread_name);
        Self::from_parts(values, executor, &config)
    }

    /// Create an empty map with the given config
    pub fn with_config(config: MapConfig) -> Result<Self> {
        let values = HashMap::with_capacity(config.initial_capacity);
        Self::from_map_with_config(values, config)
    }

    /// Create a map pre-seeded with `values`, using the given config
    pub fn from_map_with_config(values: HashMap<K, V>, config: MapConfig) -> Result<Self> {
        config.validate()?;
        let executor = Executor::from_config(&config)?;
        Ok(Self::from_parts(values, executor, &config))
    }

    fn from_parts(values: HashMap<K, V>, executor: Executor, config: &MapConfig) -> Self {
        let state = State {
            values,
            waiters: HashMap::new(),
            in_flight: HashMap::new(),
        };
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(state),
            }),
            executor: Arc::new(executor),
            coalesce_producers: config.coalesce_producers,
        }
    }

    /// Get a promise for the value of `key`
    ///
    /// Already fulfilled if the key is resolved; otherwise registers a waiter
    /// that the next resolution of `key` fulfils. Never blocks on the value.
    pub fn get(&self, key: K) -> Promise<V> {
        if let Some(value) = self.shared.lookup(&key) {
            tracing::trace!("Fast path hit");
            return Promise::ready(value);
        }

        let mut state = self.shared.state.write();

        // A resolution may have landed between the read and write locks
        if let Some(value) = state.values.get(&key) {
            return Promise::ready(value.clone());
        }

        tracing::trace!("Registering waiter");
        state.register(key)
    }

    /// Get a sink that resolves `key` once a value is sent into it
    ///
    /// Obtaining the sink never blocks. The thread that calls
    /// [`Setter::send`] performs the store and the flush.
    pub fn set(&self, key: K) -> Setter<K, V> {
        Setter {
            key: Some(key),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Resolve `key` with `value` right away
    pub fn insert(&self, key: K, value: V) {
        self.set(key).send(value);
    }

    /// Get the value of `key`, computing it with `producer` if absent
    ///
    /// If the key is resolved this behaves like [`get`](Self::get) and the
    /// producer is dropped without running. Otherwise a waiter is registered
    /// and the producer runs on the executor; its result resolves the key for
    /// every waiter. With producer coalescing enabled (the default), callers
    /// that arrive while a producer for the same key is running attach to it
    /// instead of starting another.
    ///
    /// A panicking producer fails every waiter of that wave with
    /// `FutureKvError::ProducerPanicked` and leaves the key absent.
    pub fn get_else_set<F>(&self, key: K, producer: F) -> Promise<V>
    where
        F: FnOnce() -> V + Send + 'static,
    {
        if let Some(value) = self.shared.lookup(&key) {
            tracing::trace!("Fast path hit, producer skipped");
            return Promise::ready(value);
        }

        let promise = {
            let mut state = self.shared.state.write();

            if let Some(value) = state.values.get(&key) {
                return Promise::ready(value.clone());
            }

            let promise = state.register(key.clone());

            if self.coalesce_producers && state.in_flight.contains_key(&key) {
                tracing::debug!("Attached to in-flight producer");
                return promise;
            }

            state.producer_started(key.clone());
            promise
        };

        let shared = Arc::clone(&self.shared);
        let job_key = key.clone();
        let submitted = self
            .executor
            .submit(Box::new(move || shared.run_producer(job_key, producer)));

        if let Err(error) = submitted {
            tracing::error!("Failed to schedule producer: {}", error);
            let flush = {
                let mut state = self.shared.state.write();
                state.producer_finished(&key);
                state.reject(&key, error)
            };
            flush.wake();
        }

        promise
    }

    /// Remove the resolved value for `key`
    ///
    /// Waiters registered for the key are left untouched.
    pub fn delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.state.write().values.remove(key)
    }

    /// Peek at the resolved value for `key` without registering a waiter
    pub fn try_get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.lookup(key)
    }

    /// Whether `key` currently has a resolved value
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.state.read().values.contains_key(key)
    }

    /// Number of resolved keys
    pub fn len(&self) -> usize {
        self.shared.state.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of waiters registered for `key` and not yet flushed
    pub fn waiter_count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.state.read().waiters.get(key).map_or(0, Vec::len)
    }

    /// Whether `key` has waiters or a running producer
    pub fn is_pending<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let state = self.shared.state.read();
        state.waiters.contains_key(key) || state.in_flight.contains_key(key)
    }
}

impl<K, V> Clone for FutureMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            executor: Arc::clone(&self.executor),
            coalesce_producers: self.coalesce_producers,
        }
    }
}

impl<K, V> Default for FutureMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> From<HashMap<K, V>> for FutureMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn from(values: HashMap<K, V>) -> Self {
        Self::from_map(values)
    }
}

impl<K, V> fmt::Debug for FutureMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("FutureMap")
            .field("values", &state.values.len())
            .field("pending_keys", &state.waiters.len())
            .field("producers_in_flight", &state.in_flight.len())
            .finish()
    }
}

/// Single-use sink that resolves one key
///
/// Returned by [`FutureMap::set`]. Sending consumes the setter, so a key
/// cannot be resolved twice through the same sink. A setter dropped without
/// sending resolves nothing and its key's waiters keep waiting.
pub struct Setter<K, V> {
    key: Option<K>,
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Setter<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Store `value` and flush every waiter for the key
    pub fn send(mut self, value: V) {
        if let Some(key) = self.key.take() {
            self.shared.resolve(key, value);
        }
    }
}

impl<K, V> Drop for Setter<K, V> {
    fn drop(&mut self) {
        if self.key.is_some() {
            tracing::debug!("Setter dropped without a value; waiters stay pending");
        }
    }
}

impl<K, V> fmt::Debug for Setter<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("sent", &self.key.is_none())
            .finish()
    }
}
