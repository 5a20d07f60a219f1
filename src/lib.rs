//! # FutureKV
//!
//! A thread-safe in-memory key-value map that doubles as a meeting point
//! between producers and consumers of values that are not available yet:
//! - Reads of resolved keys are served on a shared read lock
//! - Reads of absent keys return a [`Promise`] instead of blocking
//! - Writers resolve a key once and every waiting reader receives the value
//! - `get_else_set` computes a missing value once, off the caller's thread
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐  get / get_else_set   ┌──────────────────────────────┐
//! │   Readers    │ ────────────────────▶ │          FutureMap           │
//! │ (Promise<V>) │ ◀──── fulfilled ───── │  RwLock ┬─ values            │
//! └──────────────┘                       │         ├─ waiters (per key) │
//!                                        │         └─ in-flight         │
//! ┌──────────────┐  set(key).send(v)     │                              │
//! │   Writers    │ ────────────────────▶ │  store → flush → clear       │
//! └──────────────┘                       └──────────────┬───────────────┘
//!                                                       │ producers
//!                                                       ▼
//!                                              ┌─────────────────┐
//!                                              │    Executor     │
//!                                              │ (threads/pool)  │
//!                                              └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use futurekv::FutureMap;
//!
//! let map: FutureMap<String, String> = FutureMap::new();
//! let greeting = map.get("hello".to_string());
//! map.set("hello".to_string()).send("world".to_string());
//! assert_eq!(greeting.wait().unwrap(), "world");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod promise;
pub mod map;

mod executor;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FutureKvError, Result};
pub use config::{MapConfig, ProducerStrategy};
pub use map::{FutureMap, Setter};
pub use promise::Promise;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of FutureKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
