// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Database Management
//!
//! Local SQLite cache of remote workouts, athlete feedback, generated plans
//! and the OAuth token pair.
//!
//! Timestamps are stored as RFC 3339 text in UTC with nanosecond precision
//! (`2024-01-15T08:00:00.000000000Z`). The fixed width keeps lexical ordering
//! equal to chronological ordering and round-trips every remote value.

use crate::constants::limits::{MAX_RPE, MIN_RPE};
use crate::models::{StoredPlan, StoredTokens, WorkoutData, WorkoutFeedback};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

/// Database manager for the workout cache
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

fn to_db_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn from_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp in database: {value}"))?
        .with_timezone(&Utc))
}

impl Database {
    /// Create a new database connection and run migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = if database_url.contains(":memory:") {
            // Every connection would otherwise see its own empty database
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(database_url)
                .await?
        } else {
            // Ensure SQLite creates the database file if it doesn't exist
            let connection_options = if database_url.starts_with("sqlite:") && !database_url.contains('?') {
                format!("{database_url}?mode=rwc")
            } else {
                database_url.to_string()
            };
            SqlitePool::connect(&connection_options)
                .await
                .with_context(|| format!("Failed to open database {database_url}"))?
        };

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workouts (
                id INTEGER PRIMARY KEY,
                starts TEXT NOT NULL,
                minutes INTEGER NOT NULL,
                name TEXT NOT NULL,
                plan_id INTEGER,
                route_id INTEGER,
                workout_token TEXT NOT NULL,
                workout_type_id INTEGER NOT NULL,
                day_code INTEGER,
                workout_summary TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workouts_starts ON workouts(starts)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                workout_id INTEGER NOT NULL REFERENCES workouts(id),
                rpe INTEGER CHECK (rpe IS NULL OR rpe BETWEEN 1 AND 10),
                feedback TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_workout ON feedback(workout_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL,
                external_id TEXT UNIQUE NOT NULL,
                remote_plan_id INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                access_token TEXT NOT NULL,
                access_token_expires_at TEXT NOT NULL,
                refresh_token TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a workout or replace the cached copy with the same id
    pub async fn upsert_workout(&self, workout: &WorkoutData) -> Result<()> {
        let summary = workout
            .workout_summary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO workouts (id, starts, minutes, name, plan_id, route_id, workout_token,
                                  workout_type_id, day_code, workout_summary, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                starts = excluded.starts,
                minutes = excluded.minutes,
                name = excluded.name,
                plan_id = excluded.plan_id,
                route_id = excluded.route_id,
                workout_token = excluded.workout_token,
                workout_type_id = excluded.workout_type_id,
                day_code = excluded.day_code,
                workout_summary = excluded.workout_summary,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(workout.id)
        .bind(to_db_timestamp(&workout.starts))
        .bind(workout.minutes)
        .bind(&workout.name)
        .bind(workout.plan_id)
        .bind(workout.route_id)
        .bind(&workout.workout_token)
        .bind(workout.workout_type_id)
        .bind(workout.day_code)
        .bind(summary)
        .bind(to_db_timestamp(&workout.created_at))
        .bind(to_db_timestamp(&workout.updated_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert workout {}", workout.id))?;

        Ok(())
    }

    /// Most recent `starts` among cached workouts, `None` when the cache is empty
    pub async fn latest_workout_start(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(starts) AS latest FROM workouts")
            .fetch_one(&self.pool)
            .await?;
        let latest: Option<String> = row.try_get("latest")?;
        latest.as_deref().map(from_db_timestamp).transpose()
    }

    pub async fn count_workouts(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM workouts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    /// Get workout by remote id
    pub async fn get_workout(&self, id: i64) -> Result<Option<WorkoutData>> {
        let row = sqlx::query("SELECT * FROM workouts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_workout(&row)?)),
            None => Ok(None),
        }
    }

    /// Cached workouts, newest first
    ///
    /// `before` is inclusive and `after` exclusive, like the sync boundaries.
    pub async fn get_workouts(
        &self,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<WorkoutData>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM workouts
            WHERE (?1 IS NULL OR starts <= ?1)
              AND (?2 IS NULL OR starts > ?2)
            ORDER BY starts DESC
            LIMIT ?3
            "#,
        )
        .bind(before.as_ref().map(to_db_timestamp))
        .bind(after.as_ref().map(to_db_timestamp))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_workout).collect()
    }

    /// The `limit` most recent workouts
    pub async fn recent_workouts(&self, limit: i64) -> Result<Vec<WorkoutData>> {
        self.get_workouts(None, None, limit).await
    }

    /// Record feedback for a cached workout, returning the feedback row id
    pub async fn add_feedback(&self, workout_id: i64, rpe: Option<u8>, feedback: Option<&str>) -> Result<i64> {
        if let Some(rpe) = rpe {
            if !(MIN_RPE..=MAX_RPE).contains(&rpe) {
                anyhow::bail!("RPE must be between {MIN_RPE} and {MAX_RPE}, got {rpe}");
            }
        }
        if rpe.is_none() && feedback.is_none() {
            anyhow::bail!("Feedback needs an RPE, a note, or both");
        }

        let result = sqlx::query(
            r#"
            INSERT INTO feedback (workout_id, rpe, feedback, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(workout_id)
        .bind(rpe.map(i64::from))
        .bind(feedback)
        .bind(to_db_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store feedback for workout {workout_id}"))?;

        Ok(result.last_insert_rowid())
    }

    /// Latest feedback for each requested workout
    ///
    /// Every requested id is present in the result; workouts without
    /// feedback map to an empty [`WorkoutFeedback`].
    pub async fn get_feedback_for_workouts(&self, workout_ids: &[i64]) -> Result<HashMap<i64, WorkoutFeedback>> {
        let mut feedback = HashMap::with_capacity(workout_ids.len());

        for &workout_id in workout_ids {
            let row = sqlx::query(
                r#"
                SELECT rpe, feedback FROM feedback
                WHERE workout_id = ?1
                ORDER BY id DESC
                LIMIT 1
                "#,
            )
            .bind(workout_id)
            .fetch_optional(&self.pool)
            .await?;

            let entry = match row {
                Some(row) => {
                    let rpe: Option<i64> = row.try_get("rpe")?;
                    WorkoutFeedback {
                        rpe: rpe.map(u8::try_from).transpose()?,
                        feedback: row.try_get("feedback")?,
                    }
                }
                None => WorkoutFeedback::default(),
            };
            feedback.insert(workout_id, entry);
        }

        Ok(feedback)
    }

    /// Store an encoded plan, returning its local id
    pub async fn save_plan(&self, payload: &str, external_id: &str) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO plans (payload, external_id, created_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(payload)
        .bind(external_id)
        .bind(to_db_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn set_remote_plan_id(&self, plan_id: i64, remote_plan_id: Option<i64>) -> Result<()> {
        let result = sqlx::query("UPDATE plans SET remote_plan_id = ?1 WHERE id = ?2")
            .bind(remote_plan_id)
            .bind(plan_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Plan {plan_id} not found");
        }
        Ok(())
    }

    pub async fn get_plan(&self, plan_id: i64) -> Result<Option<StoredPlan>> {
        let row = sqlx::query("SELECT * FROM plans WHERE id = ?1")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_plan(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_plans(&self) -> Result<Vec<StoredPlan>> {
        let rows = sqlx::query("SELECT * FROM plans ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_plan).collect()
    }

    /// Delete a stored plan; returns whether a row was removed
    pub async fn delete_plan(&self, plan_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM plans WHERE id = ?1")
            .bind(plan_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_tokens(&self) -> Result<Option<StoredTokens>> {
        let row = sqlx::query(
            "SELECT access_token, access_token_expires_at, refresh_token FROM tokens WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let expires_at: String = row.try_get("access_token_expires_at")?;
                Ok(Some(StoredTokens {
                    access_token: row.try_get("access_token")?,
                    access_token_expires_at: from_db_timestamp(&expires_at)?,
                    refresh_token: row.try_get("refresh_token")?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Replace the stored token pair
    pub async fn store_tokens(&self, tokens: &StoredTokens) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO tokens (id, access_token, access_token_expires_at, refresh_token)
            VALUES (1, ?1, ?2, ?3)
            "#,
        )
        .bind(&tokens.access_token)
        .bind(to_db_timestamp(&tokens.access_token_expires_at))
        .bind(&tokens.refresh_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert database row to WorkoutData model
    fn row_to_workout(row: &sqlx::sqlite::SqliteRow) -> Result<WorkoutData> {
        let starts: String = row.try_get("starts")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        let summary: Option<String> = row.try_get("workout_summary")?;

        Ok(WorkoutData {
            id: row.try_get("id")?,
            starts: from_db_timestamp(&starts)?,
            minutes: row.try_get("minutes")?,
            name: row.try_get("name")?,
            plan_id: row.try_get("plan_id")?,
            route_id: row.try_get("route_id")?,
            workout_token: row.try_get("workout_token")?,
            workout_type_id: row.try_get("workout_type_id")?,
            day_code: row.try_get("day_code")?,
            workout_summary: summary.as_deref().map(serde_json::from_str).transpose()?,
            created_at: from_db_timestamp(&created_at)?,
            updated_at: from_db_timestamp(&updated_at)?,
        })
    }

    fn row_to_plan(row: &sqlx::sqlite::SqliteRow) -> Result<StoredPlan> {
        let created_at: String = row.try_get("created_at")?;

        Ok(StoredPlan {
            id: row.try_get("id")?,
            payload: row.try_get("payload")?,
            external_id: row.try_get("external_id")?,
            remote_plan_id: row.try_get("remote_plan_id")?,
            created_at: from_db_timestamp(&created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    async fn create_test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn workout(id: i64, starts: DateTime<Utc>) -> WorkoutData {
        WorkoutData {
            id,
            starts,
            minutes: 40,
            name: format!("Run {id}"),
            plan_id: None,
            route_id: None,
            workout_token: format!("token-{id}"),
            workout_type_id: 1,
            day_code: None,
            workout_summary: Some(json!({"distance_accum": "7000.0"})),
            created_at: starts,
            updated_at: starts,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_workout() {
        let db = create_test_db().await;
        let starts = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();

        db.upsert_workout(&workout(1, starts)).await.unwrap();
        let mut renamed = workout(1, starts);
        renamed.name = "Renamed".to_string();
        db.upsert_workout(&renamed).await.unwrap();

        assert_eq!(db.count_workouts().await.unwrap(), 1);
        let stored = db.get_workout(1).await.unwrap().unwrap();
        assert_eq!(stored, renamed);
        assert!(db.get_workout(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_workout_start() {
        let db = create_test_db().await;
        assert_eq!(db.latest_workout_start().await.unwrap(), None);

        let early = Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 2, 1, 7, 0, 0).unwrap();
        db.upsert_workout(&workout(1, late)).await.unwrap();
        db.upsert_workout(&workout(2, early)).await.unwrap();

        assert_eq!(db.latest_workout_start().await.unwrap(), Some(late));
    }

    #[tokio::test]
    async fn test_sub_millisecond_start_round_trips() {
        let db = create_test_db().await;
        let starts = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap() + chrono::Duration::nanoseconds(123_456_789);
        db.upsert_workout(&workout(1, starts)).await.unwrap();

        let latest = db.latest_workout_start().await.unwrap();
        assert_eq!(latest, Some(starts));
        assert_eq!(db.get_workout(1).await.unwrap().unwrap().starts, starts);

        // The watermark itself is not "after" the stored record
        assert!(db.get_workouts(None, Some(starts), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_workouts_boundaries() {
        let db = create_test_db().await;
        let day = |d| Utc.with_ymd_and_hms(2024, 3, d, 7, 0, 0).unwrap();
        for (id, d) in [(1, 1), (2, 2), (3, 3)] {
            db.upsert_workout(&workout(id, day(d))).await.unwrap();
        }

        let all = db.recent_workouts(10).await.unwrap();
        assert_eq!(all.iter().map(|w| w.id).collect::<Vec<_>>(), vec![3, 2, 1]);

        let before = db.get_workouts(Some(day(2)), None, 10).await.unwrap();
        assert_eq!(before.iter().map(|w| w.id).collect::<Vec<_>>(), vec![2, 1]);

        let after = db.get_workouts(None, Some(day(2)), 10).await.unwrap();
        assert_eq!(after.iter().map(|w| w.id).collect::<Vec<_>>(), vec![3]);
    }

    #[tokio::test]
    async fn test_feedback_rpe_range() {
        let db = create_test_db().await;
        db.upsert_workout(&workout(1, Utc::now())).await.unwrap();

        assert!(db.add_feedback(1, Some(0), None).await.is_err());
        assert!(db.add_feedback(1, Some(11), None).await.is_err());
        assert!(db.add_feedback(1, None, None).await.is_err());
        assert!(db.add_feedback(1, Some(10), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_feedback_lookup_includes_every_requested_id() {
        let db = create_test_db().await;
        db.upsert_workout(&workout(1, Utc::now())).await.unwrap();
        db.upsert_workout(&workout(2, Utc::now())).await.unwrap();

        db.add_feedback(1, Some(4), Some("easy")).await.unwrap();
        db.add_feedback(1, Some(7), Some("legs heavy")).await.unwrap();

        let feedback = db.get_feedback_for_workouts(&[1, 2, 3]).await.unwrap();
        assert_eq!(feedback.len(), 3);
        assert_eq!(
            feedback[&1],
            WorkoutFeedback {
                rpe: Some(7),
                feedback: Some("legs heavy".to_string())
            }
        );
        assert_eq!(feedback[&2], WorkoutFeedback::default());
        assert_eq!(feedback[&3], WorkoutFeedback::default());
    }

    #[tokio::test]
    async fn test_plan_storage() {
        let db = create_test_db().await;

        let id = db.save_plan("eyJ9", "ext-1").await.unwrap();
        db.set_remote_plan_id(id, Some(99)).await.unwrap();

        let plan = db.get_plan(id).await.unwrap().unwrap();
        assert_eq!(plan.external_id, "ext-1");
        assert_eq!(plan.remote_plan_id, Some(99));
        assert_eq!(db.list_plans().await.unwrap().len(), 1);

        assert!(db.save_plan("eyJ9", "ext-1").await.is_err());
        assert!(db.set_remote_plan_id(id + 100, None).await.is_err());

        assert!(db.delete_plan(id).await.unwrap());
        assert!(!db.delete_plan(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_token_storage_replaces_single_row() {
        let db = create_test_db().await;
        assert!(db.get_tokens().await.unwrap().is_none());

        let expires = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let first = StoredTokens {
            access_token: "access-1".into(),
            access_token_expires_at: expires,
            refresh_token: "refresh-1".into(),
        };
        db.store_tokens(&first).await.unwrap();

        let second = StoredTokens {
            access_token: "access-2".into(),
            ..first.clone()
        };
        db.store_tokens(&second).await.unwrap();

        assert_eq!(db.get_tokens().await.unwrap(), Some(second));
    }
}
