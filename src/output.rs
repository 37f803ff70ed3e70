use crate::aggregate::AggregationTable;
use crate::error::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

const METRIC_COLUMNS: [&str; 5] = [
    "n_bookings",
    "n_canceled",
    "cancel_rate_pct",
    "avg_lead_time",
    "avg_adr",
];

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    fs::write(path, s)?;
    Ok(())
}

/// One row per group: key columns named after their dimensions, then the
/// metrics. Rates keep full precision, averages two decimals.
pub fn write_table_csv(path: &Path, table: &AggregationTable) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header: Vec<&str> = table.dims().iter().map(|d| d.column_name()).collect();
    header.extend(METRIC_COLUMNS);
    wtr.write_record(&header)?;
    for row in table.rows() {
        let mut record: Vec<String> = row.key.clone();
        record.push(row.n_bookings.to_string());
        record.push(row.n_canceled.to_string());
        record.push(row.cancel_rate_pct.to_string());
        record.push(format!("{:.2}", row.avg_lead_time()));
        record.push(format!("{:.2}", row.avg_adr()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    debug!(table = table.name(), rows = table.len(), "table exported");
    Ok(())
}

/// Write every table under `dir` as `<name>.csv` and return the paths.
pub fn write_tables<'a>(
    dir: &Path,
    tables: impl IntoIterator<Item = &'a AggregationTable>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for t in tables {
        let path = dir.join(format!("{}.csv", t.name()));
        write_table_csv(&path, t)?;
        written.push(path);
    }
    Ok(written)
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{booking, table};
    use crate::types::Dimension;

    #[test]
    fn test_table_csv_has_key_and_metric_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut rows = vec![
            booking("City Hotel", "PRT", 2016, true),
            booking("City Hotel", "PRT", 2016, false),
            booking("Resort Hotel", "GBR", 2017, false),
        ];
        rows[0].adr = Some(1500.0);
        let agg = AggregationTable::group_by(
            "hotel_year",
            &table(rows),
            &[Dimension::Hotel, Dimension::ArrivalYear],
        );
        let paths = write_tables(&dir.path().join("tables"), [&agg]).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("tables/hotel_year.csv"));

        let text = fs::read_to_string(&paths[0]).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "hotel,arrival_date_year,n_bookings,n_canceled,cancel_rate_pct,avg_lead_time,avg_adr"
        );
        assert_eq!(lines[1], "City Hotel,2016,2,1,50,10.00,1500.00");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_json_is_pretty() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("charts.json");
        write_json(&p, &vec![1, 2]).unwrap();
        assert_eq!(fs::read_to_string(&p).unwrap(), "[\n  1,\n  2\n]");
    }
}
