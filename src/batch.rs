// src/batch.rs
//! Batch Manager: keyed batch storage plus a `current_batch` pointer.
//!
//! Batches live under `batch:<id>`; `current_batch` only holds the id of the batch the
//! reviewer menu refers to. Callbacks carry their batch id, so a batch that is being
//! worked on is never overwritten by the next cycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Batch, BatchId, BatchStatus, NewsBrief};
use crate::store::{self, batch_key, brief_key, Change, ContentStore, KEY_CURRENT_BATCH};

/// What a cycle does when the reviewer still has a live batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPolicy {
    /// Append new briefs to the live batch (when it is still pending).
    Merge,
    /// Drop the live batch (when still pending) and open a new one.
    Replace,
    /// Skip the cycle entirely; nothing is fetched or generated.
    #[default]
    Suppress,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    Created(Batch),
    Merged { batch: Batch, added: usize },
    Replaced { batch: Batch, previous: BatchId },
    Suppressed(BatchId),
    /// No briefs were supplied; nothing stored.
    Empty,
}

impl OpenOutcome {
    /// Batch the reviewer should now be shown, if any.
    pub fn batch(&self) -> Option<&Batch> {
        match self {
            OpenOutcome::Created(b)
            | OpenOutcome::Merged { batch: b, .. }
            | OpenOutcome::Replaced { batch: b, .. } => Some(b),
            OpenOutcome::Suppressed(_) | OpenOutcome::Empty => None,
        }
    }
}

#[derive(Clone)]
pub struct BatchManager {
    store: Arc<dyn ContentStore>,
    policy: BatchPolicy,
}

impl BatchManager {
    pub fn new(store: Arc<dyn ContentStore>, policy: BatchPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    pub async fn load(&self, id: &BatchId) -> Result<Option<Batch>> {
        store::get_json(self.store.as_ref(), &batch_key(id.as_str()))
            .await
            .with_context(|| format!("loading batch {id}"))
    }

    pub async fn current_id(&self) -> Result<Option<BatchId>> {
        store::get_json(self.store.as_ref(), KEY_CURRENT_BATCH)
            .await
            .context("reading current batch pointer")
    }

    /// Batch the `current_batch` pointer refers to. A dangling pointer reads as `None`.
    pub async fn current(&self) -> Result<Option<Batch>> {
        match self.current_id().await? {
            Some(id) => self.load(&id).await,
            None => Ok(None),
        }
    }

    /// Live batch that blocks a new cycle under `Suppress`.
    pub async fn blocking_batch(&self) -> Result<Option<BatchId>> {
        if self.policy != BatchPolicy::Suppress {
            return Ok(None);
        }
        Ok(self
            .current()
            .await?
            .filter(|b| !b.is_empty() && b.status != BatchStatus::Completed)
            .map(|b| b.batch_id))
    }

    /// Persist a cycle's briefs according to the configured policy.
    pub async fn open(&self, briefs: Vec<NewsBrief>, now: DateTime<Utc>) -> Result<OpenOutcome> {
        if briefs.is_empty() {
            return Ok(OpenOutcome::Empty);
        }
        let live = self
            .current()
            .await?
            .filter(|b| !b.is_empty() && b.status != BatchStatus::Completed);

        let Some(live) = live else {
            return Ok(OpenOutcome::Created(self.create(briefs, now).await?));
        };

        match (self.policy, live.status) {
            (BatchPolicy::Suppress, _) => Ok(OpenOutcome::Suppressed(live.batch_id)),
            (BatchPolicy::Merge, BatchStatus::Pending) => {
                let key = batch_key(live.batch_id.as_str());
                let merged = store::update::<Batch, Option<(Batch, usize)>, _>(
                    self.store.as_ref(),
                    &key,
                    |cur| match cur {
                        Some(mut b) if b.status == BatchStatus::Pending => {
                            let added = b.merge(briefs.clone());
                            (Change::Put(b.clone()), Some((b, added)))
                        }
                        _ => (Change::Unchanged, None),
                    },
                )
                .await
                .context("merging into live batch")?;
                match merged {
                    Some((batch, added)) => Ok(OpenOutcome::Merged { batch, added }),
                    // The live batch moved on while we were merging.
                    None => Ok(OpenOutcome::Created(self.create(briefs, now).await?)),
                }
            }
            (BatchPolicy::Replace, BatchStatus::Pending) => {
                let key = batch_key(live.batch_id.as_str());
                let dropped = store::update::<Batch, Option<Batch>, _>(
                    self.store.as_ref(),
                    &key,
                    |cur| match cur {
                        Some(b) if b.status == BatchStatus::Pending => (Change::Delete, Some(b)),
                        _ => (Change::Unchanged, None),
                    },
                )
                .await
                .context("dropping replaced batch")?;
                // Replaced briefs were already marked processed; leave a rejected record.
                for brief in dropped.iter().flat_map(|b| b.briefs.iter()) {
                    let mut rejected = brief.clone();
                    if rejected.reject().is_ok() {
                        if let Err(e) = self.archive_brief(&rejected).await {
                            tracing::warn!(target: "batch", brief = %brief.id, error = ?e, "replaced brief not archived");
                        }
                    }
                }
                let batch = self.create(briefs, now).await?;
                Ok(OpenOutcome::Replaced {
                    batch,
                    previous: live.batch_id,
                })
            }
            // A batch under approval keeps running under its own id; the new one coexists.
            (BatchPolicy::Merge | BatchPolicy::Replace, _) => {
                Ok(OpenOutcome::Created(self.create(briefs, now).await?))
            }
        }
    }

    async fn create(&self, briefs: Vec<NewsBrief>, now: DateTime<Utc>) -> Result<Batch> {
        let mut id = BatchId::generate(now);
        let mut n = 0u32;
        // Two cycles within the same millisecond would collide on the key.
        while self.load(&id).await?.is_some() {
            n += 1;
            id = BatchId(format!("{}-{}", BatchId::generate(now), n));
        }
        let batch = Batch::new(id.clone(), briefs, now);
        self.store
            .put(
                &batch_key(id.as_str()),
                serde_json::to_value(&batch).context("encoding batch")?,
                store::Expected::Absent,
            )
            .await
            .with_context(|| format!("storing batch {id}"))?;
        store::put_json(self.store.as_ref(), KEY_CURRENT_BATCH, &id)
            .await
            .context("updating current batch pointer")?;
        tracing::info!(target: "batch", batch = %id, briefs = batch.briefs.len(), "batch opened");
        Ok(batch)
    }

    /// Move a batch to `processing`. Returns the updated batch, `None` if it is gone.
    pub async fn mark_processing(&self, id: &BatchId) -> Result<Option<Batch>> {
        store::update::<Batch, Option<Batch>, _>(
            self.store.as_ref(),
            &batch_key(id.as_str()),
            |cur| match cur {
                Some(mut b) => match b.transition(BatchStatus::Processing) {
                    Ok(()) => (Change::Put(b.clone()), Some(b)),
                    Err(_) => (Change::Unchanged, Some(b)),
                },
                None => (Change::Unchanged, None),
            },
        )
        .await
        .with_context(|| format!("marking batch {id} processing"))
    }

    /// Remove a resolved brief from its batch. An emptied batch completes and is deleted.
    /// Returns the brief and the remaining batch (with `Completed` status when emptied).
    pub async fn take_brief(
        &self,
        id: &BatchId,
        brief_id: &str,
    ) -> Result<Option<(NewsBrief, Batch)>> {
        let taken = store::update::<Batch, Option<(NewsBrief, Batch)>, _>(
            self.store.as_ref(),
            &batch_key(id.as_str()),
            |cur| match cur {
                Some(mut b) => match b.take_brief(brief_id) {
                    Some(brief) if b.is_empty() => (Change::Delete, Some((brief, b))),
                    Some(brief) => (Change::Put(b.clone()), Some((brief, b))),
                    None => (Change::Unchanged, None),
                },
                None => (Change::Unchanged, None),
            },
        )
        .await
        .with_context(|| format!("removing brief {brief_id} from batch {id}"))?;

        if let Some((_, b)) = &taken {
            if b.is_empty() {
                self.clear_pointer_if(id).await?;
                tracing::info!(target: "batch", batch = %id, "batch completed");
            }
        }
        Ok(taken)
    }

    /// Drop a batch regardless of remaining briefs. Returns what was stored.
    pub async fn clear(&self, id: &BatchId) -> Result<Option<Batch>> {
        let removed = self.delete_batch(id).await?;
        self.clear_pointer_if(id).await?;
        Ok(removed)
    }

    async fn delete_batch(&self, id: &BatchId) -> Result<Option<Batch>> {
        store::update::<Batch, Option<Batch>, _>(
            self.store.as_ref(),
            &batch_key(id.as_str()),
            |cur| (Change::Delete, cur),
        )
        .await
        .with_context(|| format!("deleting batch {id}"))
    }

    async fn clear_pointer_if(&self, id: &BatchId) -> Result<()> {
        store::update::<BatchId, (), _>(self.store.as_ref(), KEY_CURRENT_BATCH, |cur| {
            match cur {
                Some(cur) if &cur == id => (Change::Delete, ()),
                _ => (Change::Unchanged, ()),
            }
        })
        .await
        .context("clearing current batch pointer")
    }

    /// Keep a resolved brief under `brief:<id>` with its final status.
    pub async fn archive_brief(&self, brief: &NewsBrief) -> Result<()> {
        store::put_json(self.store.as_ref(), &brief_key(&brief.id), brief)
            .await
            .with_context(|| format!("archiving brief {}", brief.id))?;
        Ok(())
    }
}
