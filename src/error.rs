//! Errors raised while turning raw records into course data.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DataError {
    #[error("{entity} {id} has no {field}")]
    MissingTimestamp {
        entity: &'static str,
        field: &'static str,
        id: String,
    },
    #[error("{entity} {id} has an unparseable {field}: {value:?}")]
    InvalidTimestamp {
        entity: &'static str,
        field: &'static str,
        id: String,
        value: String,
    },
    #[error("feedback {id} has no rating")]
    MissingRating { id: String },
}
