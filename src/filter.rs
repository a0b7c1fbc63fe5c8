use std::collections::HashSet;

use crate::models::{Certificate, Course};

/// Anything that belongs to a course.
pub trait CourseRef {
    fn course_id(&self) -> &str;
}

impl CourseRef for Course {
    fn course_id(&self) -> &str {
        &self.id
    }
}

impl CourseRef for Certificate {
    fn course_id(&self) -> &str {
        &self.course_id
    }
}

/// Keeps the items whose course id is in `ids`, in the order of `items`.
pub fn filter_by_ids<T, S>(items: &[T], ids: &[S]) -> Vec<T>
where
    T: CourseRef + Clone,
    S: AsRef<str>,
{
    let wanted: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();

    items
        .iter()
        .filter(|item| wanted.contains(item.course_id()))
        .cloned()
        .collect()
}
