// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Workout Sync Engine
//!
//! Reads the remote workouts collection page by page and reconciles it with
//! the local cache.
//!
//! The collection is sorted by `starts`, newest first. Reading stops as soon
//! as the requested boundary has been crossed or every record has been seen;
//! the guard is re-evaluated after each page and no page is fetched
//! speculatively. A failed page fetch aborts the read with no partial
//! result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::constants::wahoo_api::{EXPECTED_ORDER, EXPECTED_SORT};
use crate::database::Database;
use crate::models::{WorkoutData, WorkoutPage};
use crate::providers::ProviderError;

/// A paginated, `starts`-ordered workout collection
#[async_trait]
pub trait WorkoutSource: Send + Sync {
    /// Fetch a 1-based page
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<WorkoutPage, ProviderError>;
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("workouts are listed as order={order}, sort={sort}; expected order=descending, sort=starts")]
    ProtocolMismatch { order: String, sort: String },

    #[error("invalid boundary '{value}': {reason}")]
    InvalidBoundary { value: String, reason: &'static str },

    #[error("page size must be at least 1")]
    InvalidPageSize,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Which part of the collection to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Every record
    None,
    /// Records starting at or before the instant
    Before(DateTime<Utc>),
    /// Records starting strictly after the instant
    After(DateTime<Utc>),
}

impl Boundary {
    /// Whether another page may still hold wanted records, given the
    /// `starts` of the last record seen
    fn continues_past(&self, watermark: DateTime<Utc>) -> bool {
        match self {
            Boundary::None => true,
            Boundary::Before(limit) => watermark <= *limit,
            Boundary::After(limit) => watermark >= *limit,
        }
    }

    fn keeps(&self, starts: DateTime<Utc>) -> bool {
        match self {
            Boundary::None => true,
            Boundary::Before(limit) => starts <= *limit,
            Boundary::After(limit) => starts > *limit,
        }
    }
}

/// Parse a boundary timestamp; it must be RFC 3339 and in UTC
///
/// ```rust
/// use wahoo_coach::sync::parse_utc_boundary;
///
/// assert!(parse_utc_boundary("2024-01-15T08:00:00Z").is_ok());
/// assert!(parse_utc_boundary("2024-01-15T08:00:00").is_err());
/// assert!(parse_utc_boundary("2024-01-15T08:00:00+02:00").is_err());
/// ```
pub fn parse_utc_boundary(value: &str) -> Result<DateTime<Utc>, SyncError> {
    let parsed = DateTime::parse_from_rfc3339(value.trim()).map_err(|_| SyncError::InvalidBoundary {
        value: value.to_string(),
        reason: "expected an RFC 3339 timestamp with a UTC offset, e.g. 2024-01-15T08:00:00Z",
    })?;

    if parsed.offset().local_minus_utc() != 0 {
        return Err(SyncError::InvalidBoundary {
            value: value.to_string(),
            reason: "timestamp must be in UTC",
        });
    }
    Ok(parsed.with_timezone(&Utc))
}

/// Fail unless the page reports the ordering the read loop relies on
pub fn ensure_expected_ordering(page: &WorkoutPage) -> Result<(), SyncError> {
    if page.order != EXPECTED_ORDER || page.sort != EXPECTED_SORT {
        return Err(SyncError::ProtocolMismatch {
            order: page.order.clone(),
            sort: page.sort.clone(),
        });
    }
    Ok(())
}

/// Read the records selected by `boundary`, in collection order
pub async fn read_all<S>(source: &S, boundary: Boundary, per_page: u32) -> Result<Vec<WorkoutData>, SyncError>
where
    S: WorkoutSource + ?Sized,
{
    if per_page == 0 {
        return Err(SyncError::InvalidPageSize);
    }

    let mut output: Vec<WorkoutData> = Vec::new();
    let mut page_number = 1;

    loop {
        let page = source.fetch_page(page_number, per_page).await?;
        ensure_expected_ordering(&page)?;

        info!(
            page = page_number,
            records = page.workouts.len(),
            total = page.total,
            "Fetched workouts page"
        );

        // An empty page cannot move the watermark
        let Some(watermark) = page.last_starts() else {
            break;
        };
        let total = page.total;
        output.extend(page.workouts);

        if output.len() as u64 >= total || !boundary.continues_past(watermark) {
            break;
        }
        page_number += 1;
    }

    output.retain(|workout| boundary.keeps(workout.starts));
    Ok(output)
}

/// Outcome of a cache update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records returned by the remote read
    pub fetched: usize,
    pub upserted: usize,
    /// Records whose upsert failed and were skipped
    pub failed: usize,
}

/// Bring the local cache up to date
///
/// An empty cache is filled from the whole collection; otherwise only the
/// records newer than the most recent cached `starts` are read. A record
/// that cannot be stored is logged and skipped.
pub async fn update_workouts_table<S>(db: &Database, source: &S, per_page: u32) -> anyhow::Result<SyncReport>
where
    S: WorkoutSource + ?Sized,
{
    let boundary = match db.latest_workout_start().await? {
        Some(latest) => Boundary::After(latest),
        None => Boundary::None,
    };
    info!(?boundary, "Updating workouts table");

    let workouts = read_all(source, boundary, per_page).await?;
    let mut report = SyncReport {
        fetched: workouts.len(),
        ..SyncReport::default()
    };

    for workout in &workouts {
        match db.upsert_workout(workout).await {
            Ok(()) => report.upserted += 1,
            Err(e) => {
                warn!(workout_id = workout.id, error = %e, "Skipping workout that could not be stored");
                report.failed += 1;
            }
        }
    }

    info!(
        fetched = report.fetched,
        upserted = report.upserted,
        failed = report.failed,
        "Workouts table updated"
    );
    Ok(report)
}
