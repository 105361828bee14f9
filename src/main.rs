use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod config;
mod db;
mod decision;
mod engine;
mod error;
mod fixed;
mod history;
mod logging;
mod memory;
mod models;
mod report;
mod stats;
mod store;

use config::Config;
use db::PgStore;
use engine::Scheduler;
use memory::MemoryStore;
use models::{Assignment, Party, Roster};
use store::AssignmentStore;

#[derive(Parser)]
#[command(name = "duty-roster")]
#[command(about = "Fair two-party duty rotation with manual overrides", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load historical assignments from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute and store the schedule for a date range
    Generate {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        /// Reference day separating settled days from recomputable ones (default: today)
        #[arg(long)]
        today: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Recompute from today through the end of stored history or the horizon
    Recalc {
        #[arg(long)]
        today: Option<NaiveDate>,
        #[arg(long)]
        horizon_days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Pin an assignment to a party
    Override {
        #[arg(long)]
        id: Uuid,
        /// Party display name, or a / b
        #[arg(long)]
        party: String,
    },
    /// Release a pinned assignment back to automatic decisions
    Unlock {
        #[arg(long)]
        id: Uuid,
    },
    /// Record the external calendar event for an assignment
    Link {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        event_ref: String,
    },
    /// Print stored assignments without recomputing anything
    Show {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        json: bool,
    },
    /// Print the stats a day was decided with
    Explain {
        #[arg(long)]
        date: NaiveDate,
    },
    /// Summarize how far history extends and the current balance
    Status {
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Write a markdown report for a date range
    Report {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value = "roster.md")]
        out: PathBuf,
    },
    /// Preview a schedule in memory without a database
    Simulate {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        today: Option<NaiveDate>,
        /// CSV of prior assignments to seed the preview with
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    logging::init(&config.log_level);

    match cli.command {
        Commands::Simulate {
            start,
            end,
            today,
            history: seed,
            json,
        } => {
            let store = MemoryStore::new();
            if let Some(path) = seed {
                history::import_csv(&store, &config.roster, &path).await?;
            }
            let scheduler = Scheduler::new(store, config.availability.clone());
            let schedule = scheduler
                .generate_schedule(start, end, today.unwrap_or_else(today_utc))
                .await
                .with_context(|| format!("failed to simulate {start} through {end}"))?;
            print_schedule(&config.roster, &schedule, json)
        }
        command => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(config.require_database_url()?)
                .await
                .context("failed to connect to Postgres")?;

            if let Commands::InitDb = command {
                db::init_db(&pool).await?;
                println!("Schema ready.");
                return Ok(());
            }

            let scheduler = Scheduler::new(
                PgStore::new(pool, config.store_timeout),
                config.availability.clone(),
            );
            run(command, &config, &scheduler).await
        }
    }
}

async fn run<S: AssignmentStore>(
    command: Commands,
    config: &Config,
    scheduler: &Scheduler<S>,
) -> anyhow::Result<()> {
    let roster = &config.roster;

    match command {
        Commands::InitDb | Commands::Simulate { .. } => {
            unreachable!("handled before the store is built")
        }
        Commands::Import { csv } => {
            let imported = history::import_csv(scheduler.store(), roster, &csv).await?;
            println!("Imported {imported} assignments from {}.", csv.display());
        }
        Commands::Generate {
            start,
            end,
            today,
            json,
        } => {
            let schedule = scheduler
                .generate_schedule(start, end, today.unwrap_or_else(today_utc))
                .await
                .with_context(|| format!("failed to generate {start} through {end}"))?;
            print_schedule(roster, &schedule, json)?;
        }
        Commands::Recalc {
            today,
            horizon_days,
            json,
        } => {
            let today = today.unwrap_or_else(today_utc);
            let schedule = scheduler
                .recalculate(today, horizon_days.unwrap_or(config.horizon_days))
                .await
                .with_context(|| format!("failed to recalculate from {today}"))?;
            print_schedule(roster, &schedule, json)?;
        }
        Commands::Override { id, party } => {
            let Some(party) = roster.resolve(&party) else {
                bail!(
                    "unknown party '{party}'; expected '{}' or '{}'",
                    roster.name(Party::A),
                    roster.name(Party::B)
                );
            };
            match scheduler.mark_override(id, party).await? {
                Some(assignment) => println!(
                    "Pinned {}. Run `recalc --today {}` to rebalance later days.",
                    report::assignment_line(roster, &assignment),
                    assignment.date
                ),
                None => println!("No assignment with id {id}."),
            }
        }
        Commands::Unlock { id } => match scheduler.unlock(id).await? {
            Some(assignment) => println!(
                "Unlocked {}.",
                report::assignment_line(roster, &assignment)
            ),
            None => println!("No assignment with id {id}."),
        },
        Commands::Link { id, event_ref } => match scheduler.link_external(id, &event_ref).await? {
            Some(assignment) => println!("Linked {}.", report::assignment_line(roster, &assignment)),
            None => println!("No assignment with id {id}."),
        },
        Commands::Show { start, end, json } => {
            let assignments = scheduler.store().assignments_in_range(start, end).await?;
            print_schedule(roster, &assignments, json)?;
        }
        Commands::Explain { date } => {
            let Some(assignment) = scheduler.store().assignment_by_date(date).await? else {
                println!("Nothing scheduled on {date}.");
                return Ok(());
            };
            println!("{}", report::assignment_line(roster, &assignment));
            match scheduler.store().decision_snapshot(assignment.id).await? {
                Some(snapshot) if !assignment.is_override => {
                    for party in Party::ALL {
                        let stats = snapshot.stats.get(party);
                        println!(
                            "  {}: {} total, {} in the 30 days before",
                            roster.name(party),
                            stats.total,
                            stats.last_30_days
                        );
                    }
                }
                _ => println!("  No decision snapshot recorded."),
            }
        }
        Commands::Status { today } => {
            let today = today.unwrap_or_else(today_utc);
            match scheduler.store().last_assignment_date().await? {
                Some(last) => println!("History extends through {last}."),
                None => println!("No assignments recorded yet."),
            }
            let stats = scheduler.store().stats_before(today).await?;
            println!("Balance before {today}:");
            for party in Party::ALL {
                let stats = stats.get(party);
                println!(
                    "- {}: {} total, {} in the last 30 days",
                    roster.name(party),
                    stats.total,
                    stats.last_30_days
                );
            }
        }
        Commands::Report { start, end, out } => {
            let assignments = scheduler.store().assignments_in_range(start, end).await?;
            let markdown = report::build_report(roster, start, end, &assignments);
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

fn print_schedule(roster: &Roster, schedule: &[Assignment], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(schedule)?);
        return Ok(());
    }

    if schedule.is_empty() {
        println!("No assignments in this range.");
        return Ok(());
    }

    for assignment in schedule {
        println!("- {}", report::assignment_line(roster, assignment));
    }
    Ok(())
}
