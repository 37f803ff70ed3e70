//! Grouped counts and cancellation rates over the booking table.
//!
//! Tables are keyed by one value per grouping [`Dimension`] and kept in a
//! `BTreeMap`, so iteration order is the key order and never depends on
//! hashing. A table is built once and only read afterwards.

use crate::error::{PipelineError, Result};
use crate::types::{AggregatePreviewRow, BookingRecord, BookingTable, Dimension, Metric};
use crate::util::{format_int, format_number, ratio};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: Vec<String>,
    pub n_bookings: u64,
    pub n_canceled: u64,
    pub cancel_rate: f64,
    pub cancel_rate_pct: f64,
    pub lead_time_sum: f64,
    pub adr_sum: f64,
    pub adr_count: u64,
}

impl AggregateRow {
    pub fn empty(key: Vec<String>) -> Self {
        Self {
            key,
            n_bookings: 0,
            n_canceled: 0,
            cancel_rate: 0.0,
            cancel_rate_pct: 0.0,
            lead_time_sum: 0.0,
            adr_sum: 0.0,
            adr_count: 0,
        }
    }

    fn add(&mut self, r: &BookingRecord) {
        self.n_bookings += 1;
        if r.is_canceled {
            self.n_canceled += 1;
        }
        self.lead_time_sum += r.lead_time;
        if let Some(adr) = r.adr {
            self.adr_sum += adr;
            self.adr_count += 1;
        }
    }

    fn merge(&mut self, other: &AggregateRow) {
        self.n_bookings += other.n_bookings;
        self.n_canceled += other.n_canceled;
        self.lead_time_sum += other.lead_time_sum;
        self.adr_sum += other.adr_sum;
        self.adr_count += other.adr_count;
    }

    /// Recompute the derived rates from the counts. Zero bookings → rate 0.
    fn finish(&mut self) {
        self.cancel_rate = ratio(self.n_canceled as f64, self.n_bookings as f64);
        self.cancel_rate_pct = self.cancel_rate * 100.0;
    }

    pub fn avg_lead_time(&self) -> f64 {
        ratio(self.lead_time_sum, self.n_bookings as f64)
    }

    pub fn avg_adr(&self) -> f64 {
        ratio(self.adr_sum, self.adr_count as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationTable {
    name: String,
    dims: Vec<Dimension>,
    rows: BTreeMap<Vec<String>, AggregateRow>,
}

impl AggregationTable {
    /// Group the whole booking table by `dims`.
    pub fn group_by(name: &str, table: &BookingTable, dims: &[Dimension]) -> Self {
        Self::from_records(name, table, table.records.iter(), dims)
    }

    fn from_records<'a>(
        name: &str,
        table: &BookingTable,
        records: impl Iterator<Item = &'a BookingRecord>,
        dims: &[Dimension],
    ) -> Self {
        let mut rows: BTreeMap<Vec<String>, AggregateRow> = BTreeMap::new();
        for r in records {
            let key: Vec<String> = dims.iter().map(|d| table.key_value(r, *d)).collect();
            rows.entry(key.clone())
                .or_insert_with(|| AggregateRow::empty(key))
                .add(r);
        }
        for row in rows.values_mut() {
            row.finish();
        }
        debug!(table = name, groups = rows.len(), "aggregation built");
        Self {
            name: name.to_string(),
            dims: dims.to_vec(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = &AggregateRow> {
        self.rows.values()
    }

    pub fn get(&self, key: &[&str]) -> Option<&AggregateRow> {
        let key: Vec<String> = key.iter().map(|k| k.to_string()).collect();
        self.rows.get(&key)
    }

    pub fn require(&self, key: &[&str]) -> Result<&AggregateRow> {
        self.get(key).ok_or_else(|| PipelineError::EmptyGroup {
            table: self.name.clone(),
            key: key.iter().map(|k| k.to_string()).collect(),
        })
    }

    /// Like [`require`](Self::require) but an absent group becomes a zero row.
    pub fn row_or_empty(&self, key: &[&str]) -> AggregateRow {
        match self.require(key) {
            Ok(row) => row.clone(),
            Err(e) => {
                warn!("{}", e);
                AggregateRow::empty(key.iter().map(|k| k.to_string()).collect())
            }
        }
    }

    /// Highest cancellation rate first; equal rates fall back to key order.
    pub fn ranked(&self) -> Vec<&AggregateRow> {
        let mut rows: Vec<&AggregateRow> = self.rows.values().collect();
        rows.sort_by(|a, b| {
            b.cancel_rate
                .partial_cmp(&a.cancel_rate)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        rows
    }

    /// One row summing every group.
    pub fn totals(&self) -> AggregateRow {
        self.sum_where(|_| true)
    }

    /// Sum of every row whose key has `value` at `position`.
    pub fn total_for(&self, position: usize, value: &str) -> AggregateRow {
        let mut row = self.sum_where(|r| r.key.get(position).map(String::as_str) == Some(value));
        row.key = vec![value.to_string()];
        row
    }

    fn sum_where(&self, keep: impl Fn(&AggregateRow) -> bool) -> AggregateRow {
        let mut total = AggregateRow::empty(Vec::new());
        for row in self.rows.values().filter(|r| keep(r)) {
            total.merge(row);
        }
        total.finish();
        total
    }

    /// Distinct values at key `position`, ascending.
    pub fn distinct(&self, position: usize) -> Vec<String> {
        let set: BTreeSet<&String> = self.rows.keys().filter_map(|k| k.get(position)).collect();
        set.into_iter().cloned().collect()
    }

    /// Rows whose key has `value` at `position`, in key order.
    pub fn rows_where(&self, position: usize, value: &str) -> Vec<&AggregateRow> {
        self.rows
            .values()
            .filter(|r| r.key.get(position).map(String::as_str) == Some(value))
            .collect()
    }

    pub fn preview_rows(&self) -> Vec<AggregatePreviewRow> {
        self.rows
            .values()
            .map(|r| AggregatePreviewRow {
                group: r.key.join(" / "),
                n_bookings: format_int(r.n_bookings),
                n_canceled: format_int(r.n_canceled),
                cancel_rate_pct: format_number(r.cancel_rate_pct, 1),
                avg_lead_time: format_number(r.avg_lead_time(), 1),
            })
            .collect()
    }
}

/// The records that survive a minimum-frequency filter on one dimension.
///
/// Built once per dimension; every table grouped through it sees exactly the
/// same retained category set.
#[derive(Debug, Clone)]
pub struct FilteredPopulation<'a> {
    table: &'a BookingTable,
    dim: Dimension,
    retained: BTreeSet<String>,
    dropped: BTreeSet<String>,
}

impl<'a> FilteredPopulation<'a> {
    pub fn new(table: &'a BookingTable, dim: Dimension, min_bookings: u64) -> Self {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for r in &table.records {
            *counts.entry(table.key_value(r, dim)).or_insert(0) += 1;
        }
        let mut retained = BTreeSet::new();
        let mut dropped = BTreeSet::new();
        for (value, n) in counts {
            if n >= min_bookings {
                retained.insert(value);
            } else {
                dropped.insert(value);
            }
        }
        debug!(
            dimension = %dim,
            min_bookings,
            retained = retained.len(),
            dropped = dropped.len(),
            "frequency filter applied"
        );
        Self {
            table,
            dim,
            retained,
            dropped,
        }
    }

    pub fn retained(&self) -> &BTreeSet<String> {
        &self.retained
    }

    pub fn dropped(&self) -> &BTreeSet<String> {
        &self.dropped
    }

    pub fn records(&self) -> impl Iterator<Item = &'a BookingRecord> + '_ {
        let table = self.table;
        table
            .records
            .iter()
            .filter(move |r| self.retained.contains(&table.key_value(r, self.dim)))
    }

    pub fn group_by(&self, name: &str, dims: &[Dimension]) -> AggregationTable {
        AggregationTable::from_records(name, self.table, self.records(), dims)
    }
}

/// Raw values of `metric` per category of `dim`. Records without a value
/// for the metric are skipped.
pub fn values_by(table: &BookingTable, dim: Dimension, metric: Metric) -> BTreeMap<String, Vec<f64>> {
    let mut out: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for r in &table.records {
        if let Some(v) = metric.value(r) {
            out.entry(table.key_value(r, dim)).or_default().push(v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{booking, table};
    use proptest::prelude::*;

    fn sample() -> BookingTable {
        let mut rows = Vec::new();
        for i in 0..10 {
            rows.push(booking("City Hotel", "PRT", 2016, i < 6));
        }
        for i in 0..4 {
            rows.push(booking("Resort Hotel", "PRT", 2016, i < 1));
        }
        for i in 0..5 {
            rows.push(booking("City Hotel", "GBR", 2017, i < 1));
        }
        rows.push(booking("Resort Hotel", "FRA", 2017, true));
        table(rows)
    }

    #[test]
    fn test_group_by_counts_and_rates() {
        let t = sample();
        let agg = AggregationTable::group_by("hotel_year", &t, &[Dimension::Hotel, Dimension::ArrivalYear]);
        assert_eq!(agg.len(), 4);
        let city16 = agg.get(&["City Hotel", "2016"]).unwrap();
        assert_eq!(city16.n_bookings, 10);
        assert_eq!(city16.n_canceled, 6);
        assert!((city16.cancel_rate - 0.6).abs() < 1e-12);
        assert!((city16.cancel_rate_pct - 60.0).abs() < 1e-9);
        assert_eq!(city16.avg_lead_time(), 10.0);
    }

    #[test]
    fn test_missing_group_is_empty_group_error() {
        let t = sample();
        let agg = AggregationTable::group_by("hotel_year", &t, &[Dimension::Hotel, Dimension::ArrivalYear]);
        let err = agg.require(&["Resort Hotel", "2015"]).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyGroup { .. }));
        let row = agg.row_or_empty(&["Resort Hotel", "2015"]);
        assert_eq!(row.n_bookings, 0);
        assert_eq!(row.cancel_rate, 0.0);
        assert!(!row.cancel_rate_pct.is_nan());
    }

    #[test]
    fn test_zero_bookings_rate_is_zero() {
        let mut row = AggregateRow::empty(vec!["X".into()]);
        row.finish();
        assert_eq!(row.cancel_rate, 0.0);
        assert_eq!(row.avg_lead_time(), 0.0);
        assert_eq!(row.avg_adr(), 0.0);
    }

    #[test]
    fn test_ranked_breaks_ties_by_key() {
        let t = table(vec![
            booking("City Hotel", "GBR", 2016, true),
            booking("City Hotel", "GBR", 2016, false),
            booking("City Hotel", "DEU", 2016, true),
            booking("City Hotel", "DEU", 2016, false),
            booking("City Hotel", "PRT", 2016, true),
            booking("City Hotel", "ESP", 2016, false),
        ]);
        let agg = AggregationTable::group_by("country", &t, &[Dimension::Country]);
        let order: Vec<&str> = agg.ranked().iter().map(|r| r.key[0].as_str()).collect();
        assert_eq!(order, vec!["PRT", "DEU", "GBR", "ESP"]);
    }

    #[test]
    fn test_totals_and_distinct() {
        let t = sample();
        let agg = AggregationTable::group_by("hotel_year", &t, &[Dimension::Hotel, Dimension::ArrivalYear]);
        let total = agg.totals();
        assert_eq!(total.n_bookings, 20);
        assert_eq!(total.n_canceled, 9);
        assert_eq!(agg.distinct(0), vec!["City Hotel", "Resort Hotel"]);
        assert_eq!(agg.distinct(1), vec!["2016", "2017"]);
        let city = agg.total_for(0, "City Hotel");
        assert_eq!(city.n_bookings, 15);
        assert_eq!(agg.rows_where(1, "2017").len(), 2);
    }

    #[test]
    fn test_filtered_population_drops_small_groups() {
        let t = sample();
        let pop = FilteredPopulation::new(&t, Dimension::Country, 5);
        assert_eq!(
            pop.retained().iter().cloned().collect::<Vec<_>>(),
            vec!["GBR".to_string(), "PRT".to_string()]
        );
        assert!(pop.dropped().contains("FRA"));
        let by_country = pop.group_by("country", &[Dimension::Country]);
        assert!(by_country.get(&["FRA"]).is_none());
        assert_eq!(by_country.totals().n_bookings, 19);
    }

    #[test]
    fn test_values_by_metric() {
        let mut rows = vec![booking("City Hotel", "PRT", 2016, false)];
        rows[0].lead_time = 3.0;
        rows.push(booking("City Hotel", "GBR", 2016, false));
        let t = table(rows);
        let v = values_by(&t, Dimension::Origin, Metric::LeadTime);
        assert_eq!(v["Local (PRT)"], vec![3.0]);
        assert_eq!(v["International"], vec![10.0]);
    }

    fn arb_records() -> impl Strategy<Value = Vec<BookingRecord>> {
        let hotels = ["City Hotel", "Resort Hotel"];
        let countries = ["PRT", "GBR", "FRA", "ESP", "DEU", "IRL"];
        prop::collection::vec((0usize..2, 0usize..6, 2015i32..2018, any::<bool>()), 0..200).prop_map(
            move |v| {
                v.into_iter()
                    .map(|(h, c, y, x)| booking(hotels[h], countries[c], y, x))
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_canceled_never_exceeds_bookings(records in arb_records()) {
            let t = table(records);
            let agg = AggregationTable::group_by("country_hotel", &t, &[Dimension::Country, Dimension::Hotel]);
            let total = agg.totals();
            prop_assert!(total.n_canceled <= total.n_bookings);
            for row in agg.rows() {
                prop_assert!(row.n_canceled <= row.n_bookings);
                prop_assert!(row.cancel_rate_pct >= 0.0 && row.cancel_rate_pct <= 100.0);
            }
        }

        #[test]
        fn prop_filtered_population_shared_across_tables(records in arb_records(), min in 0u64..40) {
            let t = table(records);
            let pop = FilteredPopulation::new(&t, Dimension::Country, min);
            let by_country = pop.group_by("country", &[Dimension::Country]);
            let by_country_hotel = pop.group_by("country_hotel", &[Dimension::Country, Dimension::Hotel]);
            let a: BTreeSet<String> = by_country.distinct(0).into_iter().collect();
            let b: BTreeSet<String> = by_country_hotel.distinct(0).into_iter().collect();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(&a, pop.retained());
            prop_assert_eq!(by_country.totals().n_bookings, by_country_hotel.totals().n_bookings);
        }
    }
}
