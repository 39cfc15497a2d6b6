// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Wahoo Coach
//!
//! A running coach that writes today's workout, turns it into a structured
//! Wahoo plan and keeps a local cache of recorded workouts in sync with the
//! Wahoo cloud API.
//!
//! ## Features
//!
//! - **Plan model**: interval trees with time, distance and repeat triggers,
//!   speed targets and intensity labels, encoded as base64 JSON
//! - **Normalization**: free-text workout components ("Time: 10 minutes,
//!   Pace: 6:00 min/km") become validated intervals
//! - **Sync**: boundary-aware pagination over the workouts collection and
//!   incremental updates of a SQLite cache
//! - **Feedback**: RPE and notes per workout, fed back into the coach prompt
//! - **OAuth2**: stored token pair refreshed on demand
//!
//! ## Architecture
//!
//! - **Plan / Units**: plan documents and pace/speed conversions
//! - **Normalize**: component-to-interval conversion
//! - **Providers**: Wahoo API client
//! - **Sync**: pagination engine and cache update
//! - **Database**: SQLite cache of workouts, feedback, plans and tokens
//! - **Context / Generation / LLM**: prompt building and the plan pipeline
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wahoo_coach::config::Config;
//! use wahoo_coach::database::Database;
//! use wahoo_coach::oauth2_client::StaticToken;
//! use wahoo_coach::providers::wahoo::WahooProvider;
//! use wahoo_coach::sync::update_workouts_table;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let db = Database::new(&config.database_url).await?;
//!
//!     let tokens = Arc::new(StaticToken("access-token".to_string()));
//!     let provider = WahooProvider::new(&config.wahoo.api_base, tokens);
//!
//!     let report = update_workouts_table(&db, &provider, config.sync.per_page).await?;
//!     println!("{} new workouts", report.upserted);
//!     Ok(())
//! }
//! ```

/// Configuration management and persistence
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Coach prompt context
pub mod context;

/// SQLite cache
pub mod database;

/// Plan generation pipeline
pub mod generation;

/// Chat-completion client
pub mod llm;

/// Logging configuration
pub mod logging;

/// Workout, feedback and token data models
pub mod models;

/// Workout component normalization
pub mod normalize;

/// OAuth2 token management
pub mod oauth2_client;

/// Structured workout plans
pub mod plan;

/// Remote API clients
pub mod providers;

/// FIT lap parsing
pub mod samples;

/// Workout sync engine
pub mod sync;

/// Pace and speed conversions
pub mod units;
