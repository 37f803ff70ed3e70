use crate::config::StoryConfig;
use crate::error::{PipelineError, Result};
use crate::types::{BookingRecord, BookingTable, RawRow};
use crate::util::{
    parse_count_safe, parse_f64_safe, parse_flag_safe, parse_i32_safe, text_safe, year_of,
};
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;
use tracing::{debug, info};

const REQUIRED_COLUMNS: [&str; 6] = [
    "hotel",
    "is_canceled",
    "lead_time",
    "country",
    "deposit_type",
    "booking_changes",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub local_rows: usize,
    pub international_rows: usize,
    /// Rows whose origin class was derived from the country code.
    pub derived_origin: usize,
    /// Rows whose arrival year came from `arrival_date`.
    pub years_from_dates: usize,
    pub missing_adr: usize,
}

/// Load the cleaned booking table.
///
/// The input is expected to be schema-valid already, so anything off is
/// fatal: a missing file, a missing column, or a value that does not parse.
/// Errors name the file or the column (and row) involved.
pub fn load_table(path: &Path, config: &StoryConfig) -> Result<(BookingTable, LoadReport)> {
    if !path.is_file() {
        return Err(PipelineError::MissingInput {
            path: path.display().to_string(),
        });
    }
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = rdr.headers()?.clone();
    check_header(&headers)?;
    debug!(columns = headers.len(), "header accepted");

    let mut report = LoadReport::default();
    let mut records: Vec<BookingRecord> = Vec::new();

    for (idx, result) in rdr.deserialize::<RawRow>().enumerate() {
        // header is line 1
        let line = idx + 2;
        let row = result?;
        report.total_rows += 1;

        let hotel = required(text_safe(row.hotel.as_deref()), "hotel", line, &row.hotel)?;
        let country = required(text_safe(row.country.as_deref()), "country", line, &row.country)?;
        let deposit_type = required(
            text_safe(row.deposit_type.as_deref()),
            "deposit_type",
            line,
            &row.deposit_type,
        )?;
        let is_canceled = required(
            parse_flag_safe(row.is_canceled.as_deref()),
            "is_canceled",
            line,
            &row.is_canceled,
        )?;
        let lead_time = required(
            parse_f64_safe(row.lead_time.as_deref()).filter(|v| *v >= 0.0),
            "lead_time",
            line,
            &row.lead_time,
        )?;
        let booking_changes = required(
            parse_count_safe(row.booking_changes.as_deref()),
            "booking_changes",
            line,
            &row.booking_changes,
        )?;

        let arrival_year = match parse_i32_safe(row.arrival_date_year.as_deref()) {
            Some(y) => y,
            None => {
                let y = required(
                    year_of(row.arrival_date.as_deref()),
                    "arrival_date",
                    line,
                    &row.arrival_date,
                )?;
                report.years_from_dates += 1;
                y
            }
        };

        let origin = match text_safe(row.origin_group.as_deref()) {
            Some(o) => o,
            None => {
                report.derived_origin += 1;
                config.origin_label(&country).to_string()
            }
        };
        if origin == config.origin.local_label {
            report.local_rows += 1;
        } else {
            report.international_rows += 1;
        }

        let adr = parse_f64_safe(row.adr.as_deref());
        if adr.is_none() {
            report.missing_adr += 1;
        }

        records.push(BookingRecord {
            hotel,
            country,
            origin,
            deposit_type,
            arrival_year,
            lead_time,
            booking_changes,
            adr,
            is_canceled,
        });
    }

    let table = BookingTable::new(path.display().to_string(), records, config.key_labels());
    info!(
        rows = table.len(),
        local = report.local_rows,
        international = report.international_rows,
        "booking table loaded"
    );
    Ok((table, report))
}

fn check_header(headers: &StringRecord) -> Result<()> {
    let has = |name: &str| headers.iter().any(|h| h.trim() == name);
    for col in REQUIRED_COLUMNS {
        if !has(col) {
            return Err(PipelineError::schema(col, "column missing from header"));
        }
    }
    if !has("arrival_date_year") && !has("arrival_date") {
        return Err(PipelineError::schema(
            "arrival_date_year",
            "column missing from header (no arrival_date to derive it from either)",
        ));
    }
    Ok(())
}

fn required<T>(value: Option<T>, column: &str, line: usize, raw: &Option<String>) -> Result<T> {
    value.ok_or_else(|| {
        PipelineError::schema(
            column,
            format!(
                "malformed value '{}' on line {}",
                raw.as_deref().unwrap_or(""),
                line
            ),
        )
    })
}
