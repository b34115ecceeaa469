//! Per-day counters shown to the reviewer.
//!
//! `stats:batch:<date>` counts batches opened and briefs generated,
//! `stats:daily:<date>` counts published articles. Dates are UTC.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::{self, Change, ContentStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub batches: u64,
    pub total_briefs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub published: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaySnapshot {
    pub date: Option<NaiveDate>,
    pub batch: Option<BatchStats>,
    pub daily: Option<DailyStats>,
}

fn batch_stats_key(date: NaiveDate) -> String {
    format!("stats:batch:{}", date.format("%Y-%m-%d"))
}

fn daily_stats_key(date: NaiveDate) -> String {
    format!("stats:daily:{}", date.format("%Y-%m-%d"))
}

#[derive(Clone)]
pub struct Stats {
    store: Arc<dyn ContentStore>,
}

impl Stats {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub async fn record_batch(&self, date: NaiveDate, briefs: usize) -> Result<BatchStats> {
        store::update::<BatchStats, BatchStats, _>(
            self.store.as_ref(),
            &batch_stats_key(date),
            |cur| {
                let mut s = cur.unwrap_or_default();
                s.batches += 1;
                s.total_briefs += briefs as u64;
                (Change::Put(s.clone()), s)
            },
        )
        .await
        .context("updating batch stats")
    }

    pub async fn record_published(&self, date: NaiveDate, count: usize) -> Result<DailyStats> {
        if count == 0 {
            return self.daily(date).await.map(Option::unwrap_or_default);
        }
        store::update::<DailyStats, DailyStats, _>(
            self.store.as_ref(),
            &daily_stats_key(date),
            |cur| {
                let mut s = cur.unwrap_or_default();
                s.published += count as u64;
                (Change::Put(s.clone()), s)
            },
        )
        .await
        .context("updating daily stats")
    }

    async fn daily(&self, date: NaiveDate) -> Result<Option<DailyStats>> {
        store::get_json(self.store.as_ref(), &daily_stats_key(date))
            .await
            .context("reading daily stats")
    }

    pub async fn snapshot(&self, date: NaiveDate) -> Result<DaySnapshot> {
        let batch = store::get_json(self.store.as_ref(), &batch_stats_key(date))
            .await
            .context("reading batch stats")?;
        Ok(DaySnapshot {
            date: Some(date),
            batch,
            daily: self.daily(date).await?,
        })
    }
}
