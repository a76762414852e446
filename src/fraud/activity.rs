//! Recent-activity aggregation
//!
//! Trailing-window features over an account's posted entries. Built once
//! per scoring call from `LedgerStore::list_entries` output; the gate
//! itself never touches storage.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{EntryRange, LedgerEntry};
use crate::ledger::{LedgerError, LedgerStore};

/// Page size for the activity scan.
const SCAN_PAGE: usize = 500;

/// How far back the behavioral baseline looks.
pub const BASELINE_DAYS: i64 = 30;

/// Count and sum of debits inside one trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub count: u32,
    pub total: Decimal,
}

/// Aggregated recent activity for one account.
#[derive(Debug, Clone, Default)]
pub struct AccountActivity {
    /// Debits in the trailing hour.
    pub hour: WindowStats,
    /// Debits in the trailing 24 hours.
    pub day: WindowStats,
    /// Mean debit magnitude over the baseline window.
    pub debit_mean: Option<f64>,
    /// Standard deviation of debit magnitudes over the baseline window.
    pub debit_std: Option<f64>,
    pub debit_samples: u32,
    /// Accounts this one has previously moved money with.
    pub known_counterparties: HashSet<Uuid>,
}

impl AccountActivity {
    /// Build activity features from an entry history.
    ///
    /// Only debits feed the velocity windows and the behavioral baseline:
    /// outflows are what fraud scoring cares about.
    pub fn from_entries<'a, I>(entries: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        let hour_ago = now - Duration::hours(1);
        let day_ago = now - Duration::hours(24);

        let mut activity = AccountActivity::default();
        let mut magnitudes: Vec<f64> = Vec::new();

        for entry in entries {
            if !entry.is_debit() {
                continue;
            }
            let magnitude = entry.amount.abs();

            if entry.created_at >= hour_ago {
                activity.hour.count += 1;
                activity.hour.total += magnitude;
            }
            if entry.created_at >= day_ago {
                activity.day.count += 1;
                activity.day.total += magnitude;
            }
            magnitudes.push(magnitude.to_f64().unwrap_or(0.0));
        }

        activity.debit_samples = magnitudes.len() as u32;
        if !magnitudes.is_empty() {
            let mean = magnitudes.iter().sum::<f64>() / magnitudes.len() as f64;
            activity.debit_mean = Some(mean);
            if magnitudes.len() > 1 {
                let variance = magnitudes
                    .iter()
                    .map(|m| (m - mean).powi(2))
                    .sum::<f64>()
                    / (magnitudes.len() - 1) as f64;
                activity.debit_std = Some(variance.sqrt());
            }
        }

        activity
    }

    pub fn with_counterparties(mut self, counterparties: HashSet<Uuid>) -> Self {
        self.known_counterparties = counterparties;
        self
    }

    /// Scan the baseline window of an account's entries and aggregate them.
    /// Pages through the store cursor until the scan is exhausted.
    pub async fn collect(
        store: &dyn LedgerStore,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let range = EntryRange::since(now - Duration::days(BASELINE_DAYS));
        let mut entries: Vec<LedgerEntry> = Vec::new();
        let mut cursor = None;

        loop {
            let page = store
                .list_entries(account_id, range, cursor, SCAN_PAGE)
                .await?;
            entries.extend(page.entries);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(Self::from_entries(entries.iter(), now))
    }
}
