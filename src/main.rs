use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Local, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

mod db;
mod error;
mod filter;
mod ingest;
mod logging;
mod models;
mod report;
mod stats;
mod window;

use models::{Dashboard, Snapshot};

#[derive(Parser)]
#[command(name = "course-pulse")]
#[command(
    about = "Enrollment, certificate and feedback dashboards for course creators",
    long_about = None
)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t, global = true)]
    log_format: logging::LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo creator with recent activity
    Seed,
    /// Import course activity from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the dashboard metrics
    #[command(group(
        ArgGroup::new("source")
            .args(["creator", "snapshot"])
            .required(true)
            .multiple(false)
    ))]
    Dashboard {
        #[arg(long)]
        creator: Option<String>,
        /// JSON file holding courses and certificates
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Only include these course ids
        #[arg(long = "course")]
        courses: Vec<String>,
        /// Start the month window at UTC midnight instead of local midnight
        #[arg(long)]
        utc: bool,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("source")
            .args(["creator", "snapshot"])
            .required(true)
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        creator: Option<String>,
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[arg(long = "course")]
        courses: Vec<String>,
        #[arg(long)]
        utc: bool,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_source(
    creator: Option<&str>,
    snapshot: Option<&Path>,
) -> anyhow::Result<(String, Snapshot)> {
    match (creator, snapshot) {
        (Some(creator), _) => {
            let pool = connect().await?;
            let snapshot = db::fetch_snapshot(&pool, creator)
                .await
                .with_context(|| format!("failed to load courses for {creator}"))?;
            Ok((creator.to_string(), snapshot))
        }
        (None, Some(path)) => {
            let snapshot = ingest::load_snapshot(path)?;
            Ok((path.display().to_string(), snapshot))
        }
        (None, None) => anyhow::bail!("either --creator or --snapshot is required"),
    }
}

fn narrow(snapshot: Snapshot, course_ids: &[String]) -> Snapshot {
    if course_ids.is_empty() {
        return snapshot;
    }

    let courses = filter::filter_by_ids(&snapshot.courses, course_ids);
    let missing = unmatched_ids(&courses, course_ids);
    if !missing.is_empty() {
        warn!(
            missing = ?missing,
            matched = courses.len(),
            "some course ids did not match this creator"
        );
    }

    Snapshot {
        courses,
        certificates: snapshot.certificates,
    }
}

/// Requested ids with no matching course, deduplicated, in request order.
fn unmatched_ids<'a>(courses: &[models::Course], course_ids: &'a [String]) -> Vec<&'a str> {
    let found: HashSet<&str> = courses.iter().map(|course| course.id.as_str()).collect();
    let mut seen = HashSet::new();

    course_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !found.contains(id) && seen.insert(*id))
        .collect()
}

/// Samples the clock once for the whole dashboard.
fn compute(snapshot: &Snapshot, utc: bool) -> Dashboard {
    if utc {
        stats::build_dashboard(snapshot, &Utc::now())
    } else {
        stats::build_dashboard(snapshot, &Local::now())
    }
}

fn print_dashboard(label: &str, dashboard: &Dashboard) {
    let count_line = |name: &str, metric: &models::CountMetric| {
        println!(
            "{name}: {} total, {} last 7 days, {} last 30 days, {} this month",
            metric.total,
            report::format_growth(metric.progress.last_seven_days),
            report::format_growth(metric.progress.last_thirty_days),
            report::format_growth(metric.progress.this_month),
        );
    };

    println!("Dashboard for {label}:");
    count_line("Students", &dashboard.students);
    count_line("Courses", &dashboard.courses);
    count_line("Certificates", &dashboard.certificates);
    println!(
        "Feedback: {:.1} average, {} last 7 days, {} last 30 days, {} this month",
        dashboard.feedback.total,
        report::format_delta(dashboard.feedback.progress.last_seven_days),
        report::format_delta(dashboard.feedback.progress.last_thirty_days),
        report::format_delta(dashboard.feedback.progress.this_month),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::setup_logging(cli.log_format);

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            let inserted = db::seed(&pool).await?;
            println!(
                "Seed data inserted for {} ({inserted} new events).",
                db::SEED_CREATOR
            );
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} events from {}.", csv.display());
        }
        Commands::Dashboard {
            creator,
            snapshot,
            courses,
            utc,
            json,
        } => {
            let (label, data) = load_source(creator.as_deref(), snapshot.as_deref()).await?;
            let dashboard = compute(&narrow(data, &courses), utc);

            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                print_dashboard(&label, &dashboard);
            }
        }
        Commands::Report {
            creator,
            snapshot,
            courses,
            utc,
            out,
        } => {
            let (label, data) = load_source(creator.as_deref(), snapshot.as_deref()).await?;
            let dashboard = compute(&narrow(data, &courses), utc);
            let report = report::build_report(&label, &dashboard);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(path = %out.display(), "report written");
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::models::{Certificate, Course};

    fn snapshot() -> Snapshot {
        let at = Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap();
        let course = |id: &str| Course {
            id: id.to_string(),
            title: id.to_uppercase(),
            created_at: at,
            enrollments: Vec::new(),
            feedbacks: Vec::new(),
        };
        Snapshot {
            courses: vec![course("a"), course("b"), course("c")],
            certificates: vec![
                Certificate {
                    completion_date: at,
                    course_id: "a".into(),
                },
                Certificate {
                    completion_date: at,
                    course_id: "c".into(),
                },
            ],
        }
    }

    #[test]
    fn narrowing_without_ids_keeps_everything() {
        let narrowed = narrow(snapshot(), &[]);
        assert_eq!(narrowed.courses.len(), 3);
    }

    #[test]
    fn narrowing_drops_other_courses_from_every_widget() {
        let narrowed = narrow(snapshot(), &["c".to_string()]);
        let now = Utc.with_ymd_and_hms(2023, 11, 15, 0, 0, 0).unwrap();
        let dashboard = stats::build_dashboard(&narrowed, &now);
        assert_eq!(dashboard.courses.total, 1);
        assert_eq!(dashboard.certificates.total, 1);
    }

    #[test]
    fn repeated_course_ids_are_not_reported_missing() {
        let narrowed = narrow(snapshot(), &["a".to_string(), "a".to_string()]);
        assert_eq!(narrowed.courses.len(), 1);

        let requested = ["a".to_string(), "a".to_string()];
        assert!(unmatched_ids(&narrowed.courses, &requested).is_empty());

        let requested = ["z".to_string(), "a".to_string(), "z".to_string()];
        assert_eq!(unmatched_ids(&snapshot().courses, &requested), vec!["z"]);
    }

    #[test]
    fn cli_requires_exactly_one_source() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
        assert!(Cli::try_parse_from(["course-pulse", "dashboard"]).is_err());
        assert!(Cli::try_parse_from([
            "course-pulse", "dashboard", "--creator", "ana", "--snapshot", "s.json"
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "course-pulse", "dashboard", "--creator", "ana", "--course", "a", "--course", "b"
        ])
        .is_ok());
    }
}
