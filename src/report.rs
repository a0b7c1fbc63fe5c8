use std::fmt::Write;

use crate::models::{Dashboard, MetricResult};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

pub fn format_growth(percent: i64) -> String {
    format!("{percent:+}%")
}

pub fn format_delta(delta: f64) -> String {
    format!("{delta:+.1}")
}

pub fn build_report(label: &str, dashboard: &Dashboard) -> String {
    let mut output = String::new();
    let windows = &dashboard.windows;

    let _ = writeln!(output, "# Creator Dashboard");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        label,
        dashboard.generated_at.format(TIMESTAMP_FORMAT)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Windows");
    let _ = writeln!(
        output,
        "- Last 7 days: after {}",
        windows.seven_day_cutoff.format(TIMESTAMP_FORMAT)
    );
    let _ = writeln!(
        output,
        "- Last 30 days: after {}",
        windows.thirty_day_cutoff.format(TIMESTAMP_FORMAT)
    );
    let _ = writeln!(
        output,
        "- This month: after {}",
        windows.month_start_cutoff.format(TIMESTAMP_FORMAT)
    );

    for (title, metric) in dashboard.widgets() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {title}");

        match metric {
            MetricResult::Count(count) => {
                let progress = count.progress;
                let _ = writeln!(output, "- Total: {}", count.total);
                let _ = writeln!(
                    output,
                    "- Last 7 days: {}",
                    format_growth(progress.last_seven_days)
                );
                let _ = writeln!(
                    output,
                    "- Last 30 days: {}",
                    format_growth(progress.last_thirty_days)
                );
                let _ = writeln!(
                    output,
                    "- This month: {}",
                    format_growth(progress.this_month)
                );
            }
            MetricResult::Average(average) => {
                let progress = average.progress;
                if average.count == 0 {
                    let _ = writeln!(output, "No feedback recorded yet.");
                    continue;
                }
                let _ = writeln!(output, "- Average rating: {:.1}", average.total);
                let _ = writeln!(
                    output,
                    "- Last 7 days: {} vs overall",
                    format_delta(progress.last_seven_days)
                );
                let _ = writeln!(
                    output,
                    "- Last 30 days: {} vs overall",
                    format_delta(progress.last_thirty_days)
                );
                let _ = writeln!(
                    output,
                    "- This month: {} vs overall",
                    format_delta(progress.this_month)
                );
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Course, EnrollmentRelation, Feedback, Snapshot};
    use crate::stats::build_dashboard;
    use chrono::{TimeZone, Utc};

    #[test]
    fn signs_are_explicit() {
        assert_eq!(format_growth(20), "+20%");
        assert_eq!(format_growth(0), "+0%");
        assert_eq!(format_delta(-0.5), "-0.5");
        assert_eq!(format_delta(1.0), "+1.0");
    }

    #[test]
    fn report_lists_every_widget() {
        let at = |day| Utc.with_ymd_and_hms(2023, 11, day, 0, 0, 0).unwrap();
        let snapshot = Snapshot {
            courses: vec![Course {
                id: "rust-101".to_string(),
                title: "Rust 101".to_string(),
                created_at: at(1),
                enrollments: vec![
                    EnrollmentRelation {
                        enrollment_date: at(2),
                    },
                    EnrollmentRelation {
                        enrollment_date: at(13),
                    },
                ],
                feedbacks: vec![Feedback {
                    rating: 4,
                    created_at: at(14),
                }],
            }],
            certificates: Vec::new(),
        };
        let dashboard = build_dashboard(&snapshot, &at(15));
        let report = build_report("ana", &dashboard);

        assert!(report.contains("Generated for ana at 2023-11-15 00:00 UTC"));
        assert!(report.contains("- This month: after 2023-11-01 00:00 UTC"));
        assert!(report.contains("## Students\n- Total: 2\n- Last 7 days: +100%"));
        assert!(report.contains("## Certificates\n- Total: 0"));
        assert!(report.contains("- Average rating: 4.0"));
        assert!(report.contains("- Last 7 days: +0.0 vs overall"));
    }

    #[test]
    fn report_without_feedback_says_so() {
        let now = Utc.with_ymd_and_hms(2023, 11, 15, 0, 0, 0).unwrap();
        let dashboard = build_dashboard(&Snapshot::default(), &now);
        assert!(build_report("nobody", &dashboard).contains("No feedback recorded yet."));
    }

    #[test]
    fn zero_ratings_still_count_as_feedback() {
        let at = |day| Utc.with_ymd_and_hms(2023, 11, day, 0, 0, 0).unwrap();
        let snapshot = Snapshot {
            courses: vec![Course {
                id: "rust-101".to_string(),
                title: "Rust 101".to_string(),
                created_at: at(1),
                enrollments: Vec::new(),
                feedbacks: vec![Feedback {
                    rating: 0,
                    created_at: at(14),
                }],
            }],
            certificates: Vec::new(),
        };
        let report = build_report("ana", &build_dashboard(&snapshot, &at(15)));

        assert!(report.contains("- Average rating: 0.0"));
        assert!(!report.contains("No feedback recorded yet."));
    }
}
