use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::filter::filter_by_ids;
use crate::models::{
    AverageMetric, Certificate, CountMetric, Course, Dashboard, Progress, Snapshot,
};
use crate::window::{self, Windows};

/// Number of events strictly newer than `cutoff`.
pub fn count_after(events: &[DateTime<Utc>], cutoff: DateTime<Utc>) -> usize {
    events.iter().filter(|at| **at > cutoff).count()
}

/// The window count as a percentage of the events outside the window.
///
/// Returns 0 when nothing lies outside the window, including the empty case.
pub fn growth_percent(window_count: usize, total_count: usize) -> i64 {
    if window_count >= total_count {
        if window_count > 0 {
            debug!(window_count, total_count, "empty baseline, growth reported as 0");
        }
        return 0;
    }

    let baseline = (total_count - window_count) as f64;
    (window_count as f64 / baseline * 100.0).round() as i64
}

fn count_metric(events: &[DateTime<Utc>], windows: &Windows) -> CountMetric {
    let total = events.len();
    let growth = |cutoff| growth_percent(count_after(events, cutoff), total);

    CountMetric {
        total,
        progress: Progress {
            last_seven_days: growth(windows.seven_day_cutoff),
            last_thirty_days: growth(windows.thirty_day_cutoff),
            this_month: growth(windows.month_start_cutoff),
        },
    }
}

fn enrollment_dates(courses: &[Course]) -> Vec<DateTime<Utc>> {
    courses
        .iter()
        .flat_map(|course| course.enrollments.iter().map(|e| e.enrollment_date))
        .collect()
}

pub fn student_stats<Tz: TimeZone>(courses: &[Course], now: &DateTime<Tz>) -> CountMetric {
    count_metric(&enrollment_dates(courses), &window::windows(now))
}

pub fn course_stats<Tz: TimeZone>(courses: &[Course], now: &DateTime<Tz>) -> CountMetric {
    let created: Vec<DateTime<Utc>> = courses.iter().map(|c| c.created_at).collect();
    count_metric(&created, &window::windows(now))
}

/// Only certificates of `courses` are counted.
pub fn certificate_stats<Tz: TimeZone>(
    certificates: &[Certificate],
    courses: &[Course],
    now: &DateTime<Tz>,
) -> CountMetric {
    let course_ids: Vec<&str> = courses.iter().map(|c| c.id.as_str()).collect();
    let completed: Vec<DateTime<Utc>> = filter_by_ids(certificates, &course_ids)
        .into_iter()
        .map(|cert| cert.completion_date)
        .collect();

    count_metric(&completed, &window::windows(now))
}

/// Rounds to one decimal, never yielding `-0.0`.
fn round_tenth(value: f64) -> f64 {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

fn mean(ratings: impl Iterator<Item = i32>) -> Option<f64> {
    let (sum, count) = ratings.fold((0i64, 0usize), |(sum, count), r| {
        (sum + i64::from(r), count + 1)
    });
    (count > 0).then(|| sum as f64 / count as f64)
}

/// Average rating over every feedback of every course.
///
/// Each progress value is the mean rating of feedback created inside the
/// window minus the overall mean, both unweighted by course. Empty windows
/// report 0.0.
pub fn feedback_stats<Tz: TimeZone>(courses: &[Course], now: &DateTime<Tz>) -> AverageMetric {
    let windows = window::windows(now);
    let feedbacks: Vec<_> = courses.iter().flat_map(|c| c.feedbacks.iter()).collect();

    let Some(overall) = mean(feedbacks.iter().map(|f| f.rating)) else {
        return AverageMetric {
            total: 0.0,
            count: 0,
            progress: Progress {
                last_seven_days: 0.0,
                last_thirty_days: 0.0,
                this_month: 0.0,
            },
        };
    };

    let delta = |cutoff: DateTime<Utc>| {
        mean(
            feedbacks
                .iter()
                .filter(|f| f.created_at > cutoff)
                .map(|f| f.rating),
        )
        .map_or(0.0, |recent| round_tenth(recent - overall))
    };

    AverageMetric {
        total: round_tenth(overall),
        count: feedbacks.len(),
        progress: Progress {
            last_seven_days: delta(windows.seven_day_cutoff),
            last_thirty_days: delta(windows.thirty_day_cutoff),
            this_month: delta(windows.month_start_cutoff),
        },
    }
}

/// Computes every widget against the same `now`.
pub fn build_dashboard<Tz: TimeZone>(snapshot: &Snapshot, now: &DateTime<Tz>) -> Dashboard {
    let dashboard = Dashboard {
        generated_at: now.with_timezone(&Utc),
        windows: window::windows(now),
        students: student_stats(&snapshot.courses, now),
        courses: course_stats(&snapshot.courses, now),
        certificates: certificate_stats(&snapshot.certificates, &snapshot.courses, now),
        feedback: feedback_stats(&snapshot.courses, now),
    };

    debug!(
        courses = snapshot.courses.len(),
        students = dashboard.students.total,
        certificates = dashboard.certificates.total,
        "dashboard computed"
    );
    dashboard
}
