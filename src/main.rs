// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use wahoo_coach::config::Config;
use wahoo_coach::context::build_user_prompt;
use wahoo_coach::database::Database;
use wahoo_coach::generation::PlanGenerator;
use wahoo_coach::llm::OpenAiClient;
use wahoo_coach::logging;
use wahoo_coach::oauth2_client::{AccessTokenProvider, OAuth2Config, StaticToken, TokenManager};
use wahoo_coach::plan::Plan;
use wahoo_coach::providers::wahoo::WahooProvider;
use wahoo_coach::samples::parse_laps;
use wahoo_coach::sync::{parse_utc_boundary, read_all, update_workouts_table, Boundary};
use wahoo_coach::units::speed_to_pace;

#[derive(Parser)]
#[command(name = "wahoo-coach")]
#[command(author, version, about = "Running coach for Wahoo workouts and plans", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the local workout cache up to date
    Sync,

    /// List workouts, newest first
    Workouts {
        /// Only workouts starting at or before this UTC timestamp
        ///
        /// With --remote, paging stops at the first page whose last workout
        /// starts after this timestamp. The API lists newest first, so a
        /// timestamp older than the first page returns nothing; leave out
        /// --remote to list older workouts from the cache.
        #[arg(long, conflicts_with = "after")]
        before: Option<String>,

        /// Only workouts starting after this UTC timestamp
        #[arg(long)]
        after: Option<String>,

        /// Read from the Wahoo API instead of the cache
        #[arg(long)]
        remote: bool,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Record or show workout feedback
    Feedback {
        #[command(subcommand)]
        command: FeedbackCommands,
    },

    /// Generate and manage workout plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },

    /// Show the laps of a cached workout
    Laps {
        workout_id: i64,
    },

    /// Authorize access to the Wahoo account
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
enum FeedbackCommands {
    Add {
        workout_id: i64,

        /// Rate of perceived exertion, 1-10
        #[arg(long)]
        rpe: Option<u8>,

        #[arg(long)]
        note: Option<String>,
    },
    Show {
        workout_ids: Vec<i64>,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Generate today's plan and store it
    Generate {
        /// Upload the plan after storing it
        #[arg(long)]
        upload: bool,
    },
    /// Upload a stored plan, replacing the remote copy if there is one
    Upload {
        plan_id: i64,
    },
    /// Delete a stored plan locally and remotely
    Delete {
        plan_id: i64,
    },
    List,
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Print the authorization URL
    Url,
    /// Exchange an authorization code for a token pair
    Exchange {
        code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_from_env()?;

    let cli = Cli::parse();
    let config = Config::load(cli.config)?;
    let db = Database::new(&config.database_url).await?;

    match cli.command {
        Commands::Sync => {
            let provider = wahoo_provider(&config, &db)?;
            let report = update_workouts_table(&db, &provider, config.sync.per_page).await?;
            println!(
                "Fetched {} workouts, stored {}, skipped {}",
                report.fetched, report.upserted, report.failed
            );
        }
        Commands::Workouts {
            before,
            after,
            remote,
            limit,
        } => list_workouts(&config, &db, before, after, remote, limit).await?,
        Commands::Feedback { command } => match command {
            FeedbackCommands::Add { workout_id, rpe, note } => {
                db.get_workout(workout_id)
                    .await?
                    .with_context(|| format!("Workout {workout_id} is not in the cache; run sync first"))?;
                let id = db.add_feedback(workout_id, rpe, note.as_deref()).await?;
                println!("Stored feedback {id} for workout {workout_id}");
            }
            FeedbackCommands::Show { workout_ids } => {
                let feedback = db.get_feedback_for_workouts(&workout_ids).await?;
                for id in &workout_ids {
                    if let Some(entry) = feedback.get(id) {
                        println!("{id}: {}", serde_json::to_string(entry)?);
                    }
                }
            }
        },
        Commands::Plan { command } => match command {
            PlanCommands::Generate { upload } => {
                let plan_id = generate_plan(&config, &db).await?;
                if upload {
                    upload_plan(&config, &db, plan_id).await?;
                }
            }
            PlanCommands::Upload { plan_id } => upload_plan(&config, &db, plan_id).await?,
            PlanCommands::Delete { plan_id } => delete_plan(&config, &db, plan_id).await?,
            PlanCommands::List => {
                for stored in db.list_plans().await? {
                    let name = Plan::from_payload(&stored.payload)
                        .map(|plan| plan.header.name)
                        .unwrap_or_else(|_| "<unreadable>".to_string());
                    let remote = stored
                        .remote_plan_id
                        .map_or_else(|| "not uploaded".to_string(), |id| format!("remote {id}"));
                    println!("{}  {}  {name}  ({remote})", stored.id, stored.created_at.format("%Y-%m-%d %H:%M"));
                }
            }
        },
        Commands::Laps { workout_id } => show_laps(&config, &db, workout_id).await?,
        Commands::Auth { command } => {
            let manager = token_manager(&config, &db)?;
            match command {
                AuthCommands::Url => {
                    let state = uuid::Uuid::new_v4().to_string();
                    println!("\nPlease visit this URL to authorize the application:");
                    println!("{}\n", manager.authorization_url(&state)?);
                }
                AuthCommands::Exchange { code } => {
                    let tokens = manager.exchange_code(&code).await?;
                    println!("Authorized; access token valid until {}", tokens.access_token_expires_at);
                }
            }
        }
    }

    Ok(())
}

fn token_manager(config: &Config, db: &Database) -> Result<TokenManager> {
    let wahoo = &config.wahoo;
    let client_id = wahoo.client_id.as_deref().context("wahoo.client_id is not configured")?;
    let client_secret = wahoo
        .client_secret
        .as_deref()
        .context("wahoo.client_secret is not configured")?;

    let mut oauth = OAuth2Config::wahoo(client_id, client_secret, &wahoo.redirect_uri, &wahoo.api_base);
    if let Some(scopes) = &wahoo.scopes {
        oauth.scopes.clone_from(scopes);
    }
    Ok(TokenManager::new(oauth, db.clone()))
}

fn wahoo_provider(config: &Config, db: &Database) -> Result<WahooProvider> {
    let tokens: Arc<dyn AccessTokenProvider> = match &config.wahoo.access_token {
        Some(token) => Arc::new(StaticToken(token.clone())),
        None => Arc::new(token_manager(config, db)?),
    };
    Ok(WahooProvider::new(&config.wahoo.api_base, tokens))
}

async fn list_workouts(
    config: &Config,
    db: &Database,
    before: Option<String>,
    after: Option<String>,
    remote: bool,
    limit: usize,
) -> Result<()> {
    let before = before.as_deref().map(parse_utc_boundary).transpose()?;
    let after = after.as_deref().map(parse_utc_boundary).transpose()?;

    let workouts = if remote {
        let boundary = match (before, after) {
            (Some(t), _) => Boundary::Before(t),
            (None, Some(t)) => Boundary::After(t),
            (None, None) => Boundary::None,
        };
        let provider = wahoo_provider(config, db)?;
        let mut workouts = read_all(&provider, boundary, config.sync.per_page).await?;
        workouts.truncate(limit);
        workouts
    } else {
        let limit = i64::try_from(limit).context("limit is too large")?;
        db.get_workouts(before, after, limit).await?
    };

    for workout in &workouts {
        let distance = workout
            .distance_m()
            .map_or_else(String::new, |d| format!("  {:.2} km", d / 1000.0));
        let pace = workout
            .average_speed()
            .and_then(|speed| speed_to_pace(speed).ok())
            .map_or_else(String::new, |p| format!("  {p}"));
        println!(
            "{}  {}  {} min{distance}{pace}  {}",
            workout.id,
            workout.starts.format("%Y-%m-%d %H:%M"),
            workout.minutes,
            workout.name
        );
    }
    Ok(())
}

async fn generate_plan(config: &Config, db: &Database) -> Result<i64> {
    let training = config.training()?;
    let api_key = config.llm.api_key.as_deref().unwrap_or_default();
    let client =
        OpenAiClient::new(api_key, &config.llm.model, &config.llm.base_url)?.with_temperature(config.llm.temperature);

    let prompt = build_user_prompt(db, training, Utc::now().date_naive()).await?;
    let generated = PlanGenerator::new(client)
        .generate(&prompt, training.threshold_speed)
        .await?;

    let payload = generated.plan.to_payload()?;
    let external_id = uuid::Uuid::new_v4().to_string();
    let plan_id = db.save_plan(&payload, &external_id).await?;
    info!(plan_id, attempts = generated.attempts, "Stored generated plan");

    println!("{}\n", generated.narrative.trim());
    if let Some(description) = &generated.plan.header.description {
        println!("{description}\n");
    }
    println!("Stored plan {plan_id}");
    Ok(plan_id)
}

async fn upload_plan(config: &Config, db: &Database, plan_id: i64) -> Result<()> {
    let stored = db
        .get_plan(plan_id)
        .await?
        .with_context(|| format!("Plan {plan_id} not found"))?;
    let provider = wahoo_provider(config, db)?;

    let remote = match stored.remote_plan_id {
        Some(remote_id) => {
            provider
                .update_plan(remote_id, &stored.payload, &stored.external_id)
                .await?
        }
        None => provider.create_plan(&stored.payload, &stored.external_id).await?,
    };
    db.set_remote_plan_id(plan_id, Some(remote.id)).await?;

    println!("Plan {plan_id} uploaded as remote plan {}", remote.id);
    Ok(())
}

async fn delete_plan(config: &Config, db: &Database, plan_id: i64) -> Result<()> {
    let stored = db
        .get_plan(plan_id)
        .await?
        .with_context(|| format!("Plan {plan_id} not found"))?;

    if let Some(remote_id) = stored.remote_plan_id {
        wahoo_provider(config, db)?.delete_plan(remote_id).await?;
    }
    db.delete_plan(plan_id).await?;
    println!("Deleted plan {plan_id}");
    Ok(())
}

async fn show_laps(config: &Config, db: &Database, workout_id: i64) -> Result<()> {
    let workout = db
        .get_workout(workout_id)
        .await?
        .with_context(|| format!("Workout {workout_id} is not in the cache; run sync first"))?;
    let url = workout
        .samples_file_url()
        .with_context(|| format!("Workout {workout_id} has no detailed-sample file"))?;

    let content = wahoo_provider(config, db)?.download_file(url).await?;
    let laps = parse_laps(&content)?;

    println!("lap  distance  time     pace         ascent  descent  grade");
    for (index, lap) in laps.iter().enumerate() {
        println!(
            "{:>3}  {:>8}  {:>7}  {:>11}  {:>6}  {:>7}  {:>5}",
            index + 1,
            lap.distance.map_or_else(|| "-".to_string(), |d| format!("{d:.0}m")),
            lap.elapsed_time.map_or_else(|| "-".to_string(), |t| format!("{t:.0}s")),
            lap.pace().unwrap_or_else(|| "-".to_string()),
            lap.ascent.map_or_else(|| "-".to_string(), |a| format!("{a:.0}m")),
            lap.descent.map_or_else(|| "-".to_string(), |d| format!("{d:.0}m")),
            lap.grade.map_or_else(|| "-".to_string(), |g| format!("{g:.1}%")),
        );
    }
    Ok(())
}
