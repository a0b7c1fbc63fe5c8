use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::DataError;
use crate::models::{Certificate, Course, EnrollmentRelation, Feedback, Snapshot};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnrollment {
    pub id: Option<String>,
    pub enrollment_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFeedback {
    pub id: Option<String>,
    pub rating: Option<i32>,
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCourse {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub created_at: Option<String>,
    #[serde(default)]
    pub enrollments: Vec<RawEnrollment>,
    #[serde(default)]
    pub feedbacks: Vec<RawFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCertificate {
    pub id: Option<String>,
    pub completion_date: Option<String>,
    pub course_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RawSnapshot {
    pub courses: Vec<RawCourse>,
    #[serde(default)]
    pub certificates: Vec<RawCertificate>,
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) and bare `YYYY-MM-DD` (UTC midnight).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

pub fn require_timestamp(
    entity: &'static str,
    field: &'static str,
    id: &str,
    value: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, DataError> {
    value.ok_or_else(|| DataError::MissingTimestamp {
        entity,
        field,
        id: id.to_string(),
    })
}

pub fn timestamp_field(
    entity: &'static str,
    field: &'static str,
    id: &str,
    value: Option<&str>,
) -> Result<DateTime<Utc>, DataError> {
    let Some(text) = value.filter(|text| !text.trim().is_empty()) else {
        return require_timestamp(entity, field, id, None);
    };

    parse_timestamp(text).ok_or_else(|| DataError::InvalidTimestamp {
        entity,
        field,
        id: id.to_string(),
        value: text.to_string(),
    })
}

impl TryFrom<RawCourse> for Course {
    type Error = DataError;

    fn try_from(raw: RawCourse) -> Result<Self, Self::Error> {
        let created_at =
            timestamp_field("course", "createdAt", &raw.id, raw.created_at.as_deref())?;

        let enrollments = raw
            .enrollments
            .iter()
            .enumerate()
            .map(|(index, enrollment)| {
                let id = enrollment
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{}#{index}", raw.id));
                timestamp_field(
                    "enrollment",
                    "enrollmentDate",
                    &id,
                    enrollment.enrollment_date.as_deref(),
                )
                .map(|enrollment_date| EnrollmentRelation { enrollment_date })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let feedbacks = raw
            .feedbacks
            .iter()
            .enumerate()
            .map(|(index, feedback)| -> Result<Feedback, DataError> {
                let id = feedback
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{}#{index}", raw.id));
                let created_at =
                    timestamp_field("feedback", "createdAt", &id, feedback.created_at.as_deref())?;
                let rating = feedback.rating.ok_or(DataError::MissingRating { id })?;
                Ok(Feedback { rating, created_at })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Course {
            id: raw.id,
            title: raw.title,
            created_at,
            enrollments,
            feedbacks,
        })
    }
}

impl TryFrom<RawCertificate> for Certificate {
    type Error = DataError;

    fn try_from(raw: RawCertificate) -> Result<Self, Self::Error> {
        let id = raw.id.as_deref().unwrap_or(&raw.course_id);
        let completion_date =
            timestamp_field("certificate", "completionDate", id, raw.completion_date.as_deref())?;

        Ok(Certificate {
            completion_date,
            course_id: raw.course_id,
        })
    }
}

impl TryFrom<RawSnapshot> for Snapshot {
    type Error = DataError;

    fn try_from(raw: RawSnapshot) -> Result<Self, Self::Error> {
        Ok(Snapshot {
            courses: raw
                .courses
                .into_iter()
                .map(Course::try_from)
                .collect::<Result<_, _>>()?,
            certificates: raw
                .certificates
                .into_iter()
                .map(Certificate::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

pub fn parse_snapshot(json: &str) -> anyhow::Result<Snapshot> {
    let raw: RawSnapshot = serde_json::from_str(json).context("malformed snapshot JSON")?;
    Ok(Snapshot::try_from(raw)?)
}

pub fn load_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot =
        parse_snapshot(&json).with_context(|| format!("invalid snapshot {}", path.display()))?;

    info!(
        path = %path.display(),
        courses = snapshot.courses.len(),
        certificates = snapshot.certificates.len(),
        "snapshot loaded"
    );
    Ok(snapshot)
}
