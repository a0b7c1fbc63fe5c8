use std::collections::HashMap;
use std::io::Read;

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DataError;
use crate::ingest;
use crate::models::{Certificate, Course, EnrollmentRelation, Feedback, Snapshot};

pub const SEED_CREATOR: &str = "demo-creator";

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    Enrollment { at: DateTime<Utc> },
    Feedback { at: DateTime<Utc>, rating: i32 },
    Certificate { at: DateTime<Utc> },
}

/// One imported row: a course upsert plus one event against it.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub source_key: String,
    pub creator: String,
    pub course_id: String,
    pub course_title: String,
    pub course_created_at: DateTime<Utc>,
    pub event: ActivityEvent,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Keeps the earliest known creation date, so re-seeding never moves a course
/// past events already stored for it.
async fn upsert_course(pool: &PgPool, activity: &Activity) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO course_pulse.courses (id, creator, title, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET creator = EXCLUDED.creator,
            title = EXCLUDED.title,
            created_at = LEAST(course_pulse.courses.created_at, EXCLUDED.created_at)
        "#,
    )
    .bind(&activity.course_id)
    .bind(&activity.creator)
    .bind(&activity.course_title)
    .bind(activity.course_created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns whether a new event row was written.
async fn store_activity(pool: &PgPool, activity: &Activity) -> anyhow::Result<bool> {
    upsert_course(pool, activity).await?;

    let result = match &activity.event {
        ActivityEvent::Enrollment { at } => {
            sqlx::query(
                r#"
                INSERT INTO course_pulse.enrollments (id, course_id, enrollment_date, source_key)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (source_key) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&activity.course_id)
            .bind(at)
            .bind(&activity.source_key)
            .execute(pool)
            .await?
        }
        ActivityEvent::Feedback { at, rating } => {
            sqlx::query(
                r#"
                INSERT INTO course_pulse.feedbacks (id, course_id, rating, created_at, source_key)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (source_key) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&activity.course_id)
            .bind(rating)
            .bind(at)
            .bind(&activity.source_key)
            .execute(pool)
            .await?
        }
        ActivityEvent::Certificate { at } => {
            sqlx::query(
                r#"
                INSERT INTO course_pulse.certificates (id, course_id, completion_date, source_key)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (source_key) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&activity.course_id)
            .bind(at)
            .bind(&activity.source_key)
            .execute(pool)
            .await?
        }
    };

    Ok(result.rows_affected() > 0)
}

struct SeedCourse {
    id: &'static str,
    title: &'static str,
    created_days_ago: i64,
    enrollments: &'static [i64],
    feedbacks: &'static [(i32, i64)],
    certificates: &'static [i64],
}

// Event offsets never exceed the course's own age.
const SEED_COURSES: [SeedCourse; 3] = [
    SeedCourse {
        id: "rust-foundations",
        title: "Rust Foundations",
        created_days_ago: 75,
        enrollments: &[2, 1, 28, 13],
        feedbacks: &[(5, 1), (4, 20)],
        certificates: &[3, 40],
    },
    SeedCourse {
        id: "async-in-practice",
        title: "Async in Practice",
        created_days_ago: 90,
        enrollments: &[73, 73, 28, 13],
        feedbacks: &[(3, 35)],
        certificates: &[10, 25, 5],
    },
    SeedCourse {
        id: "ownership-deep-dive",
        title: "Ownership Deep Dive",
        created_days_ago: 80,
        enrollments: &[73, 73, 28, 13],
        feedbacks: &[(4, 2), (2, 50)],
        certificates: &[0],
    },
];

fn seed_activities(now: DateTime<Utc>) -> Vec<Activity> {
    let days_ago = |days: i64| now - Duration::days(days);

    let mut activities = Vec::new();
    for course in &SEED_COURSES {
        let activity = |kind: &str, index: usize, event: ActivityEvent| Activity {
            source_key: format!("seed-{}-{kind}-{index}", course.id),
            creator: SEED_CREATOR.to_string(),
            course_id: course.id.to_string(),
            course_title: course.title.to_string(),
            course_created_at: days_ago(course.created_days_ago),
            event,
        };

        for (index, days) in course.enrollments.iter().enumerate() {
            let event = ActivityEvent::Enrollment {
                at: days_ago(*days),
            };
            activities.push(activity("enrollment", index, event));
        }
        for (index, (rating, days)) in course.feedbacks.iter().enumerate() {
            let event = ActivityEvent::Feedback {
                at: days_ago(*days),
                rating: *rating,
            };
            activities.push(activity("feedback", index, event));
        }
        for (index, days) in course.certificates.iter().enumerate() {
            let event = ActivityEvent::Certificate {
                at: days_ago(*days),
            };
            activities.push(activity("certificate", index, event));
        }
    }

    activities
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let mut inserted = 0usize;
    for activity in seed_activities(Utc::now()) {
        if store_activity(pool, &activity).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Parses activity rows; every timestamp must be present and valid.
pub fn read_activities<R: Read>(input: R) -> anyhow::Result<Vec<Activity>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        source_key: Option<String>,
        creator: String,
        course_id: String,
        course_title: String,
        course_created_at: Option<String>,
        kind: String,
        occurred_at: Option<String>,
        rating: Option<i32>,
    }

    let mut reader = csv::Reader::from_reader(input);
    let mut activities = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row on line {line}"))?;
        let source_key = row
            .source_key
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let course_created_at = ingest::timestamp_field(
            "course",
            "course_created_at",
            &row.course_id,
            row.course_created_at.as_deref(),
        )
        .with_context(|| format!("line {line}"))?;
        let at = ingest::timestamp_field(
            "activity",
            "occurred_at",
            &source_key,
            row.occurred_at.as_deref(),
        )
        .with_context(|| format!("line {line}"))?;

        let event = match row.kind.trim().to_ascii_lowercase().as_str() {
            "enrollment" => ActivityEvent::Enrollment { at },
            "certificate" => ActivityEvent::Certificate { at },
            "feedback" => {
                let rating = row
                    .rating
                    .with_context(|| format!("line {line}: feedback without rating"))?;
                ActivityEvent::Feedback { at, rating }
            }
            other => bail!("line {line}: unknown activity kind {other:?}"),
        };

        activities.push(Activity {
            source_key,
            creator: row.creator,
            course_id: row.course_id,
            course_title: row.course_title,
            course_created_at,
            event,
        });
    }

    Ok(activities)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let activities = read_activities(file)?;
    debug!(rows = activities.len(), "activity rows parsed");

    let mut inserted = 0usize;
    for activity in &activities {
        if store_activity(pool, activity).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Loads a creator's courses with enrollments and feedbacks, plus their certificates.
pub async fn fetch_snapshot(pool: &PgPool, creator: &str) -> anyhow::Result<Snapshot> {
    let course_rows = sqlx::query(
        "SELECT id, title, created_at FROM course_pulse.courses \
         WHERE creator = $1 ORDER BY created_at NULLS LAST, id",
    )
    .bind(creator)
    .fetch_all(pool)
    .await?;

    let mut courses = Vec::with_capacity(course_rows.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in course_rows {
        let id: String = row.get("id");
        let created_at =
            ingest::require_timestamp("course", "created_at", &id, row.get("created_at"))?;
        positions.insert(id.clone(), courses.len());
        courses.push(Course {
            id,
            title: row.get("title"),
            created_at,
            enrollments: Vec::new(),
            feedbacks: Vec::new(),
        });
    }

    let enrollment_rows = sqlx::query(
        "SELECT e.id, e.course_id, e.enrollment_date FROM course_pulse.enrollments e \
         JOIN course_pulse.courses c ON c.id = e.course_id WHERE c.creator = $1",
    )
    .bind(creator)
    .fetch_all(pool)
    .await?;

    for row in enrollment_rows {
        let id: Uuid = row.get("id");
        let course_id: String = row.get("course_id");
        let enrollment_date = ingest::require_timestamp(
            "enrollment",
            "enrollment_date",
            &id.to_string(),
            row.get("enrollment_date"),
        )?;
        if let Some(&position) = positions.get(&course_id) {
            courses[position]
                .enrollments
                .push(EnrollmentRelation { enrollment_date });
        }
    }

    let feedback_rows = sqlx::query(
        "SELECT f.id, f.course_id, f.rating, f.created_at FROM course_pulse.feedbacks f \
         JOIN course_pulse.courses c ON c.id = f.course_id WHERE c.creator = $1",
    )
    .bind(creator)
    .fetch_all(pool)
    .await?;

    for row in feedback_rows {
        let id: Uuid = row.get("id");
        let course_id: String = row.get("course_id");
        let created_at = ingest::require_timestamp(
            "feedback",
            "created_at",
            &id.to_string(),
            row.get("created_at"),
        )?;
        let rating: Option<i32> = row.get("rating");
        let rating = rating.ok_or_else(|| DataError::MissingRating { id: id.to_string() })?;
        if let Some(&position) = positions.get(&course_id) {
            courses[position].feedbacks.push(Feedback { rating, created_at });
        }
    }

    let certificate_rows = sqlx::query(
        "SELECT ce.id, ce.course_id, ce.completion_date FROM course_pulse.certificates ce \
         JOIN course_pulse.courses c ON c.id = ce.course_id WHERE c.creator = $1",
    )
    .bind(creator)
    .fetch_all(pool)
    .await?;

    let mut certificates = Vec::with_capacity(certificate_rows.len());
    for row in certificate_rows {
        let id: Uuid = row.get("id");
        let completion_date = ingest::require_timestamp(
            "certificate",
            "completion_date",
            &id.to_string(),
            row.get("completion_date"),
        )?;
        certificates.push(Certificate {
            completion_date,
            course_id: row.get("course_id"),
        });
    }

    info!(
        creator,
        courses = courses.len(),
        certificates = certificates.len(),
        "creator data fetched"
    );
    Ok(Snapshot {
        courses,
        certificates,
    })
}
