//! Configuration for FutureKV
//!
//! Centralized configuration with sensible defaults.

use crate::error::{FutureKvError, Result};

/// Main configuration for a FutureMap instance
#[derive(Debug, Clone)]
pub struct MapConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Number of keys the value store is pre-sized for
    pub initial_capacity: usize,

    // -------------------------------------------------------------------------
    // Producer Configuration
    // -------------------------------------------------------------------------
    /// Share a single in-flight producer between concurrent `get_else_set`
    /// calls for the same absent key
    pub coalesce_producers: bool,

    /// Where `get_else_set` producers run
    pub producer_strategy: ProducerStrategy,

    /// Name prefix for producer threads
    pub thread_name: String,
}

/// Producer execution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerStrategy {
    /// Spawn a dedicated thread for every producer
    ThreadPerTask,

    /// Run producers on a fixed pool of worker threads
    WorkerPool { workers: usize },
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            coalesce_producers: true,
            producer_strategy: ProducerStrategy::ThreadPerTask,
            thread_name: "futurekv-producer".to_string(),
        }
    }
}

impl MapConfig {
    /// Create a new config builder
    pub fn builder() -> MapConfigBuilder {
        MapConfigBuilder::default()
    }

    /// Check the config for values the map cannot run with
    pub fn validate(&self) -> Result<()> {
        if let ProducerStrategy::WorkerPool { workers: 0 } = self.producer_strategy {
            return Err(FutureKvError::Config(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(FutureKvError::Config(
                "thread name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for MapConfig
#[derive(Default)]
pub struct MapConfigBuilder {
    config: MapConfig,
}

impl MapConfigBuilder {
    /// Set the initial capacity of the value store
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_capacity = capacity;
        self
    }

    /// Enable or disable producer coalescing
    pub fn coalesce_producers(mut self, enabled: bool) -> Self {
        self.config.coalesce_producers = enabled;
        self
    }

    /// Set the producer execution strategy
    pub fn producer_strategy(mut self, strategy: ProducerStrategy) -> Self {
        self.config.producer_strategy = strategy;
        self
    }

    /// Shorthand for a worker pool with `workers` threads
    pub fn worker_pool(self, workers: usize) -> Self {
        self.producer_strategy(ProducerStrategy::WorkerPool { workers })
    }

    /// Set the producer thread name prefix
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    pub fn build(self) -> MapConfig {
        self.config
    }
}
