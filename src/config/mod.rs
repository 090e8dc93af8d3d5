pub mod policy;
pub mod settings;

pub use policy::{CleanupPolicy, DeletionBudget, FilterEntry};
pub use settings::{BudgetStrategy, FilterMode, RawSettings};

use crate::core::Result;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Shared, reloadable view of the current [`CleanupPolicy`].
///
/// Readers take a cheap `Arc` clone of the whole snapshot and keep using it
/// for the rest of their cycle. A reload bakes a fresh snapshot first and
/// then swaps the pointer under one write lock, so a reader never observes
/// a half-updated policy.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<Arc<CleanupPolicy>>>,
}

impl PolicyHandle {
    pub fn new(policy: CleanupPolicy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(policy))),
        }
    }

    pub fn from_settings(raw: &RawSettings) -> Self {
        Self::new(CleanupPolicy::bake(raw))
    }

    pub fn current(&self) -> Arc<CleanupPolicy> {
        // The guarded value is a single pointer, so a poisoned lock still holds a whole snapshot.
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn reload(&self, raw: &RawSettings) -> Result<()> {
        self.replace(CleanupPolicy::bake(raw))
    }

    pub fn replace(&self, policy: CleanupPolicy) -> Result<()> {
        let fresh = Arc::new(policy);
        let mut guard = self.inner.write()?;
        *guard = fresh;
        info!(
            threshold = guard.entity_count_threshold,
            interval_ticks = guard.scan_interval_ticks,
            budget = %guard.budget,
            "cleanup policy reloaded"
        );
        Ok(())
    }
}

impl Default for PolicyHandle {
    fn default() -> Self {
        Self::new(CleanupPolicy::default())
    }
}
