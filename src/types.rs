use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

/// One CSV row as it comes off disk. Everything is optional text so the
/// loader can name the exact column that is missing or malformed.
#[derive(Debug, Deserialize)]
pub struct RawRow {
    pub hotel: Option<String>,
    pub is_canceled: Option<String>,
    pub lead_time: Option<String>,
    pub arrival_date_year: Option<String>,
    pub arrival_date: Option<String>,
    pub country: Option<String>,
    pub deposit_type: Option<String>,
    pub booking_changes: Option<String>,
    pub adr: Option<String>,
    pub origin_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingRecord {
    pub hotel: String,
    pub country: String,
    /// Origin class label (local vs international).
    pub origin: String,
    pub deposit_type: String,
    pub arrival_year: i32,
    pub lead_time: f64,
    pub booking_changes: u32,
    pub adr: Option<f64>,
    pub is_canceled: bool,
}

/// Categorical columns a table can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Dimension {
    Hotel,
    Country,
    Origin,
    DepositType,
    ArrivalYear,
    Status,
    ChangesBucket,
}

impl Dimension {
    pub fn column_name(self) -> &'static str {
        match self {
            Dimension::Hotel => "hotel",
            Dimension::Country => "country",
            Dimension::Origin => "origin_group",
            Dimension::DepositType => "deposit_type",
            Dimension::ArrivalYear => "arrival_date_year",
            Dimension::Status => "is_canceled",
            Dimension::ChangesBucket => "booking_changes",
        }
    }

    pub fn from_column_name(name: &str) -> Option<Self> {
        [
            Dimension::Hotel,
            Dimension::Country,
            Dimension::Origin,
            Dimension::DepositType,
            Dimension::ArrivalYear,
            Dimension::Status,
            Dimension::ChangesBucket,
        ]
        .into_iter()
        .find(|d| d.column_name() == name)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Numeric columns available for distribution charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    LeadTime,
}

impl Metric {
    pub fn value(self, r: &BookingRecord) -> Option<f64> {
        match self {
            Metric::LeadTime => Some(r.lead_time),
        }
    }
}

/// Labels used when a boolean or numeric column becomes a grouping key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyLabels {
    pub canceled: String,
    pub not_canceled: String,
    pub changes_cap: u32,
}

impl KeyLabels {
    pub fn changes_bucket(&self, changes: u32) -> String {
        if changes >= self.changes_cap {
            format!("{}+", self.changes_cap)
        } else {
            changes.to_string()
        }
    }

    /// Every bucket label in axis order.
    pub fn changes_buckets(&self) -> Vec<String> {
        (0..=self.changes_cap).map(|c| self.changes_bucket(c)).collect()
    }
}

/// The loaded input: immutable records plus the labels that turn them into keys.
#[derive(Debug, Clone)]
pub struct BookingTable {
    pub source: String,
    pub records: Vec<BookingRecord>,
    pub labels: KeyLabels,
}

impl BookingTable {
    pub fn new(source: impl Into<String>, records: Vec<BookingRecord>, labels: KeyLabels) -> Self {
        Self {
            source: source.into(),
            records,
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Key value of `record` along `dim`.
    pub fn key_value(&self, record: &BookingRecord, dim: Dimension) -> String {
        match dim {
            Dimension::Hotel => record.hotel.clone(),
            Dimension::Country => record.country.clone(),
            Dimension::Origin => record.origin.clone(),
            Dimension::DepositType => record.deposit_type.clone(),
            Dimension::ArrivalYear => record.arrival_year.to_string(),
            Dimension::Status => {
                if record.is_canceled {
                    self.labels.canceled.clone()
                } else {
                    self.labels.not_canceled.clone()
                }
            }
            Dimension::ChangesBucket => self.labels.changes_bucket(record.booking_changes),
        }
    }
}

/// Console/CSV rendering of one aggregation row.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct AggregatePreviewRow {
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Bookings")]
    #[tabled(rename = "Bookings")]
    pub n_bookings: String,
    #[serde(rename = "Canceled")]
    #[tabled(rename = "Canceled")]
    pub n_canceled: String,
    #[serde(rename = "CancelRatePct")]
    #[tabled(rename = "CancelRatePct")]
    pub cancel_rate_pct: String,
    #[serde(rename = "AvgLeadTime")]
    #[tabled(rename = "AvgLeadTime")]
    pub avg_lead_time: String,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_changes_buckets() {
        let l = labels();
        assert_eq!(l.changes_bucket(0), "0");
        assert_eq!(l.changes_bucket(4), "4");
        assert_eq!(l.changes_bucket(5), "5+");
        assert_eq!(l.changes_bucket(17), "5+");
        assert_eq!(l.changes_buckets(), vec!["0", "1", "2", "3", "4", "5+"]);
    }

    #[test]
    fn test_key_values() {
        let t = table(vec![booking("City Hotel", "PRT", 2016, true)]);
        let r = &t.records[0];
        assert_eq!(t.key_value(r, Dimension::Status), "Canceled");
        assert_eq!(t.key_value(r, Dimension::ArrivalYear), "2016");
        assert_eq!(t.key_value(r, Dimension::Origin), "Local (PRT)");
    }

    #[test]
    fn test_dimension_column_names_round_trip() {
        for d in [Dimension::Hotel, Dimension::Status, Dimension::ChangesBucket] {
            assert_eq!(Dimension::from_column_name(d.column_name()), Some(d));
        }
        assert_eq!(Dimension::from_column_name("adr"), None);
    }
}
