use thiserror::Error;

/// Every failure the pipeline can report.
///
/// `MissingInput`, `Schema`, `EmptyTable` and `Config` abort the run.
/// `EmptyGroup` is absorbed by the chart that hit it. `AmbiguousNodeLabel`
/// is raised by the flow graph builder when the reject policy is active.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file '{path}' not found")]
    MissingInput { path: String },

    #[error("schema error in column '{column}': {detail}")]
    Schema { column: String, detail: String },

    #[error("input table '{path}' contains no bookings")]
    EmptyTable { path: String },

    #[error("no rows for key [{}] in table '{table}'", key.join(", "))]
    EmptyGroup { table: String, key: Vec<String> },

    #[error("node label '{label}' appears in more than one flow level ({})", levels.join(", "))]
    AmbiguousNodeLabel { label: String, levels: Vec<String> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn schema(column: &str, detail: impl Into<String>) -> Self {
        PipelineError::Schema {
            column: column.to_string(),
            detail: detail.into(),
        }
    }

    /// Fatal errors stop the whole run; everything else is handled per chart.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::EmptyGroup { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let e = PipelineError::MissingInput {
            path: "hotel_bookings_clean.csv".into(),
        };
        assert!(e.to_string().contains("hotel_bookings_clean.csv"));

        let e = PipelineError::schema("lead_time", "column missing from header");
        assert!(e.to_string().contains("lead_time"));

        let e = PipelineError::AmbiguousNodeLabel {
            label: "Other".into(),
            levels: vec!["hotel".into(), "deposit_type".into()],
        };
        assert_eq!(
            e.to_string(),
            "node label 'Other' appears in more than one flow level (hotel, deposit_type)"
        );
    }

    #[test]
    fn test_only_empty_group_is_non_fatal() {
        let e = PipelineError::EmptyGroup {
            table: "cancel_rate_hotel_year".into(),
            key: vec!["City Hotel".into(), "2016".into()],
        };
        assert!(!e.is_fatal());
        assert!(PipelineError::Config("bad".into()).is_fatal());
        assert!(PipelineError::EmptyTable { path: "x".into() }.is_fatal());
    }
}
