// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::container::{ContainerAdapter, ContainerError};
use crate::store::{SnapshotStore, StoreError};
use async_trait::async_trait;
use kiln_core::Build;
use tracing::Instrument;

/// Wrapper that adds tracing to any SnapshotStore
#[derive(Clone)]
pub struct TracedSnapshotStore<S> {
    inner: S,
}

impl<S> TracedSnapshotStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: SnapshotStore> SnapshotStore for TracedSnapshotStore<S> {
    async fn publish(&self, build: &Build) -> Result<(), StoreError> {
        let span = tracing::debug_span!(
            "store.publish",
            build_id = %build.id,
            status = %build.status,
        );

        async {
            let start = std::time::Instant::now();
            let result = self.inner.publish(build).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(()) => tracing::debug!(
                    phases = build.phases.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "snapshot published"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "publish failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any ContainerAdapter
#[derive(Clone)]
pub struct TracedContainerAdapter<C> {
    inner: C,
}

impl<C> TracedContainerAdapter<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: ContainerAdapter> ContainerAdapter for TracedContainerAdapter<C> {
    async fn kill(&self, ids: &[String]) -> Result<(), ContainerError> {
        let span = tracing::info_span!("container.kill", count = ids.len());

        async {
            tracing::info!(ids = ?ids, "killing containers");
            let start = std::time::Instant::now();
            let result = self.inner.kill(ids).await;

            // Containers may already be gone by the time an abort lands
            match &result {
                Ok(()) => tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "killed"),
                Err(e) => tracing::warn!(error = %e, "kill failed (may be expected)"),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, ids: &[String]) -> Result<(), ContainerError> {
        let span = tracing::info_span!("container.delete", count = ids.len());

        async {
            tracing::info!(ids = ?ids, "deleting containers");
            let start = std::time::Instant::now();
            let result = self.inner.delete(ids).await;

            match &result {
                Ok(()) => tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "deleted"),
                Err(e) => tracing::error!(error = %e, "delete failed"),
            }

            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
