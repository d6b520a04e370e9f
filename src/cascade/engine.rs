//! The cascade reset engine.
//!
//! [`CascadeEngine::reset`] walks every [`Branch`] of the [`CascadeGraph`]
//! depth-first: a collection with children first resolves its id set, purges each
//! child filtered by that set, then deletes exactly that set. Leaves are deleted
//! by their foreign-key filter directly. Once every branch is empty the event's
//! reset fields are written. Calls into the gateway are strictly sequential and
//! the deadline is checked before each one.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::gateway::{Filter, GatewayError, PersistenceGateway, ID_FIELD};
use super::graph::{Branch, CascadeGraph};
use super::types::{EventId, PartialFailure, ResetError, ResetSummary};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
enum StepCause {
    #[error("{0}")]
    Store(GatewayError),
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// The step that stopped a cascade.
#[derive(Debug)]
struct StepFailure {
    collection: String,
    cause: StepCause,
}

impl StepFailure {
    fn store(collection: &str, err: GatewayError) -> Self {
        Self {
            collection: collection.to_string(),
            cause: StepCause::Store(err),
        }
    }
}

fn check_deadline(deadline: Option<Instant>, collection: &str) -> Result<(), StepFailure> {
    match deadline {
        Some(at) if Instant::now() >= at => Err(StepFailure {
            collection: collection.to_string(),
            cause: StepCause::DeadlineExceeded,
        }),
        _ => Ok(()),
    }
}

/// Counts accumulated while a reset runs.
struct Progress {
    deleted: BTreeMap<String, u64>,
    completed_branches: Vec<String>,
}

impl Progress {
    fn new(graph: &CascadeGraph) -> Self {
        Self {
            deleted: graph
                .deletion_order()
                .into_iter()
                .map(|c| (c.to_string(), 0))
                .collect(),
            completed_branches: Vec::new(),
        }
    }

    fn record(&mut self, collection: &str, removed: u64) {
        *self.deleted.entry(collection.to_string()).or_insert(0) += removed;
    }

    fn into_failure(self, event_id: &EventId, branch: &str, failure: StepFailure) -> ResetError {
        let timed_out = matches!(failure.cause, StepCause::DeadlineExceeded);
        let partial = PartialFailure {
            event_id: event_id.to_string(),
            deleted: self.deleted,
            completed_branches: self.completed_branches,
            failed_branch: branch.to_string(),
            failed_collection: failure.collection,
            cause: failure.cause.to_string(),
            timed_out,
        };
        error!(
            event_id = %partial.event_id,
            branch = %partial.failed_branch,
            collection = %partial.failed_collection,
            cause = %partial.cause,
            completed = ?partial.completed_branches,
            "cascade aborted"
        );
        ResetError::PartialFailure(partial)
    }
}

#[derive(Clone)]
pub struct CascadeEngine {
    gateway: Arc<dyn PersistenceGateway>,
    graph: Arc<CascadeGraph>,
}

impl CascadeEngine {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, graph: CascadeGraph) -> Self {
        Self {
            gateway,
            graph: Arc::new(graph),
        }
    }

    pub fn graph(&self) -> &CascadeGraph {
        &self.graph
    }

    /// Delete every dependent of `event_id` and restore the event's reset fields.
    ///
    /// Returns [`ResetError::Validation`] without touching the store for a bad id,
    /// [`ResetError::NotFound`] if the event does not exist, and
    /// [`ResetError::PartialFailure`] if any step fails or `deadline` passes
    /// before the cascade completes.
    #[tracing::instrument(name = "reset", skip_all, fields(event_id = %event_id))]
    pub async fn reset(&self, event_id: &str, deadline: Option<Instant>) -> Result<ResetSummary, ResetError> {
        let event_id = EventId::parse(event_id)?;
        let root = self.graph.root();

        let mut progress = Progress::new(&self.graph);
        if let Err(failure) = check_deadline(deadline, root) {
            return Err(progress.into_failure(&event_id, root, failure));
        }
        self.ensure_event_exists(&event_id).await?;

        for branch in self.graph.branches() {
            let scope = Filter::eq(branch.foreign_key.as_str(), event_id.as_str());
            let outcome = self.purge(branch, scope, &mut progress, deadline).await;
            if let Err(failure) = outcome {
                return Err(progress.into_failure(&event_id, &branch.collection, failure));
            }
            debug!(branch = %branch.collection, "branch purged");
            progress.completed_branches.push(branch.collection.clone());
        }

        if let Err(failure) = check_deadline(deadline, root) {
            return Err(progress.into_failure(&event_id, root, failure));
        }
        let updated = match self
            .gateway
            .update_fields(
                root,
                &Filter::eq(self.graph.root_id_field(), event_id.as_str()),
                self.graph.reset_fields(),
            )
            .await
        {
            Ok(n) => n,
            Err(e) => return Err(progress.into_failure(&event_id, root, StepFailure::store(root, e))),
        };
        if updated == 0 {
            warn!("event row disappeared before its fields could be reset");
        }

        let summary = ResetSummary {
            event_id: event_id.to_string(),
            deleted: progress.deleted,
        };
        info!(total = summary.total(), deleted = ?summary.deleted, "event reset");
        Ok(summary)
    }

    /// Count what [`reset`](Self::reset) would delete, using reads only.
    #[tracing::instrument(name = "preview", skip_all, fields(event_id = %event_id))]
    pub async fn preview(&self, event_id: &str) -> Result<ResetSummary, ResetError> {
        let event_id = EventId::parse(event_id)?;
        self.ensure_event_exists(&event_id).await?;

        let mut progress = Progress::new(&self.graph);
        for branch in self.graph.branches() {
            let scope = Filter::eq(branch.foreign_key.as_str(), event_id.as_str());
            self.count(branch, scope, &mut progress).await?;
        }

        Ok(ResetSummary {
            event_id: event_id.to_string(),
            deleted: progress.deleted,
        })
    }

    async fn ensure_event_exists(&self, event_id: &EventId) -> Result<(), ResetError> {
        let found = self
            .gateway
            .select_ids(
                self.graph.root(),
                &Filter::eq(self.graph.root_id_field(), event_id.as_str()),
            )
            .await?;
        if found.is_empty() {
            return Err(ResetError::NotFound(event_id.to_string()));
        }
        Ok(())
    }

    /// Delete the records of `branch` selected by `scope`, children first.
    fn purge<'a>(
        &'a self,
        branch: &'a Branch,
        scope: Filter,
        progress: &'a mut Progress,
        deadline: Option<Instant>,
    ) -> BoxFuture<'a, Result<(), StepFailure>> {
        Box::pin(async move {
            let collection = branch.collection.as_str();

            if branch.is_leaf() {
                check_deadline(deadline, collection)?;
                let removed = self
                    .gateway
                    .delete_where(collection, &scope)
                    .await
                    .map_err(|e| StepFailure::store(collection, e))?;
                debug!(collection, removed, "deleted");
                progress.record(collection, removed);
                return Ok(());
            }

            check_deadline(deadline, collection)?;
            let ids = self
                .gateway
                .select_ids(collection, &scope)
                .await
                .map_err(|e| StepFailure::store(collection, e))?;
            if ids.is_empty() {
                debug!(collection, "nothing to delete, skipping subtree");
                return Ok(());
            }

            for child in &branch.children {
                let child_scope = Filter::any_of(child.foreign_key.as_str(), ids.clone());
                self.purge(child, child_scope, progress, deadline).await?;
            }

            check_deadline(deadline, collection)?;
            let removed = self
                .gateway
                .delete_where(collection, &Filter::any_of(ID_FIELD, ids))
                .await
                .map_err(|e| StepFailure::store(collection, e))?;
            debug!(collection, removed, "deleted");
            progress.record(collection, removed);
            Ok(())
        })
    }

    fn count<'a>(
        &'a self,
        branch: &'a Branch,
        scope: Filter,
        progress: &'a mut Progress,
    ) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            let ids = self.gateway.select_ids(&branch.collection, &scope).await?;
            progress.record(&branch.collection, ids.len() as u64);
            if ids.is_empty() {
                return Ok(());
            }
            for child in &branch.children {
                let child_scope = Filter::any_of(child.foreign_key.as_str(), ids.clone());
                self.count(child, child_scope, progress).await?;
            }
            Ok(())
        })
    }
}
