use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::window::Windows;

pub type CourseId = String;

#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRelation {
    pub enrollment_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub rating: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub enrollments: Vec<EnrollmentRelation>,
    pub feedbacks: Vec<Feedback>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Certificate {
    pub completion_date: DateTime<Utc>,
    pub course_id: CourseId,
}

/// A creator's courses and certificates, already validated.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub courses: Vec<Course>,
    pub certificates: Vec<Certificate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress<T> {
    pub last_seven_days: T,
    pub last_thirty_days: T,
    pub this_month: T,
}

/// Event count with growth percentages per window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountMetric {
    pub total: usize,
    pub progress: Progress<i64>,
}

/// Mean rating with the per-window deviation from that mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageMetric {
    pub total: f64,
    pub progress: Progress<f64>,
    /// Number of ratings behind `total`.
    #[serde(skip)]
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricResult {
    Count(CountMetric),
    Average(AverageMetric),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    pub windows: Windows,
    #[serde(serialize_with = "tagged_count")]
    pub students: CountMetric,
    #[serde(serialize_with = "tagged_count")]
    pub courses: CountMetric,
    #[serde(serialize_with = "tagged_count")]
    pub certificates: CountMetric,
    #[serde(serialize_with = "tagged_average")]
    pub feedback: AverageMetric,
}

fn tagged_count<S: Serializer>(metric: &CountMetric, serializer: S) -> Result<S::Ok, S::Error> {
    MetricResult::Count(metric.clone()).serialize(serializer)
}

fn tagged_average<S: Serializer>(
    metric: &AverageMetric,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    MetricResult::Average(metric.clone()).serialize(serializer)
}

impl Dashboard {
    pub fn widgets(&self) -> [(&'static str, MetricResult); 4] {
        [
            ("Students", MetricResult::Count(self.students.clone())),
            ("Courses", MetricResult::Count(self.courses.clone())),
            ("Certificates", MetricResult::Count(self.certificates.clone())),
            ("Feedback", MetricResult::Average(self.feedback.clone())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::build_dashboard;
    use chrono::TimeZone;

    #[test]
    fn dashboard_json_tags_each_widget() {
        let now = Utc.with_ymd_and_hms(2023, 11, 15, 0, 0, 0).unwrap();
        let json = serde_json::to_value(build_dashboard(&Snapshot::default(), &now)).unwrap();

        for widget in ["students", "courses", "certificates"] {
            assert_eq!(json[widget]["kind"], "count");
            assert_eq!(json[widget]["total"], 0);
        }
        assert_eq!(json["feedback"]["kind"], "average");
        assert_eq!(json["feedback"]["progress"]["lastSevenDays"], 0.0);
        assert!(json["feedback"].get("count").is_none());
        assert!(json["windows"]["monthStartCutoff"].is_string());
    }
}
