// Act 5: how local and international guests book (lead time, changes, deposits).
use super::composer::{ChartComposer, BOOKING_CHANGES, DEPOSIT_MIX, LEAD_TIME_DISTRIBUTION};
use super::encoding::{stacking_order, summarize, Trim};
use super::spec::{days, hover_lines, Annotation, Axis, ChartKind, ChartSpec, Datum, Series};
use crate::aggregate::AggregationTable;
use crate::util::{format_int, format_number, format_pct, format_pp, pct};
use std::collections::BTreeMap;
use tracing::{debug, warn};

impl ChartComposer<'_> {
    /// Violin per origin, trimmed for display at a shared percentile.
    ///
    /// `values` maps each origin label to its raw lead times. The reported
    /// statistics always describe the untrimmed values.
    pub fn lead_time_distribution(&self, values: &BTreeMap<String, Vec<f64>>) -> ChartSpec {
        let d = &self.config.distribution;
        let trim = Trim::over(values.values().map(Vec::as_slice), d.trim_percentile, d.axis_headroom);
        let [local, intl] = self.config.origin_order();
        let percentile = format_number(d.trim_percentile * 100.0, 0);

        let mut spec = ChartSpec::new(
            LEAD_TIME_DISTRIBUTION,
            5,
            ChartKind::Violin,
            "Lead time: how far ahead guests book".to_string(),
            &format!(
                "Showing values up to the {}th percentile; statistics include every booking",
                percentile
            ),
        );
        spec.x_axis = Axis::titled("Origin");
        spec.y_axis = Axis {
            title: "Days".to_string(),
            range: Some([0.0, trim.axis_max]),
            categories: Vec::new(),
        };

        let mut medians: BTreeMap<&str, f64> = BTreeMap::new();
        for origin in self.origin_sequence(values.keys()) {
            let raw: &[f64] = values.get(&origin).map(Vec::as_slice).unwrap_or(&[]);
            let mut s = Series::named(&origin);
            s.highlighted = origin == local;
            if raw.is_empty() {
                warn!(chart = LEAD_TIME_DISTRIBUTION, origin = %origin, "no lead times for origin");
                spec.series.push(s);
                continue;
            }
            let kept = trim.apply(raw);
            s.x = vec![Datum::from(origin.as_str()); kept.len()];
            s.y = kept.into_iter().map(Datum::Num).collect();
            s.marker.push(&self.enc.emphasis(&origin, false, false), None);
            let stats = summarize(raw);
            s.hover.push(hover_lines(
                &origin,
                &[
                    ("Mean", days(stats.mean)),
                    ("Median", days(stats.median)),
                    ("Q1", days(stats.q1)),
                    ("Q3", days(stats.q3)),
                    ("Max", format!("{} days", format_number(stats.max, 0))),
                    ("N", format_int(stats.n as u64)),
                ],
            ));
            if let Some(key) = [local, intl].into_iter().find(|k| *k == origin) {
                medians.insert(key, stats.median);
            }
            s.stats = Some(stats);
            spec.series.push(s);
        }

        if let (Some(l), Some(i)) = (medians.get(local), medians.get(intl)) {
            let text = if l < i {
                format!(
                    "Local guests book earlier than international guests: median {} vs {}",
                    days(*l),
                    days(*i)
                )
            } else if l > i {
                format!(
                    "Local guests book later than international guests: median {} vs {}",
                    days(*l),
                    days(*i)
                )
            } else {
                format!("Local and international guests share a median lead time of {}", days(*l))
            };
            spec.annotations.push(Annotation::takeaway(
                text,
                0.98,
                0.98,
                Some(self.enc.color_of(local)),
            ));
        }
        spec.annotations.push(Annotation::takeaway(
            format!(
                "Axis cut at {} (p{}); longer lead times exist",
                days(trim.threshold),
                percentile
            ),
            0.02,
            0.98,
            None,
        ));
        debug!(
            chart = LEAD_TIME_DISTRIBUTION,
            threshold = trim.threshold,
            "chart composed"
        );
        spec
    }

    /// Share of bookings per change bucket, one bar group per bucket.
    ///
    /// `table` is grouped by `[origin, changes bucket]`.
    pub fn booking_changes(&self, table: &AggregationTable) -> ChartSpec {
        let buckets = self.config.key_labels().changes_buckets();
        let zero = buckets.first().cloned().unwrap_or_else(|| "0".to_string());
        let [local, intl] = self.config.origin_order();

        let mut spec = ChartSpec::new(
            BOOKING_CHANGES,
            5,
            ChartKind::GroupedBar,
            "Booking changes by origin".to_string(),
            "Share of each origin's bookings by number of changes",
        );
        spec.x_axis = Axis {
            title: "Number of changes".to_string(),
            range: None,
            categories: buckets.clone(),
        };
        spec.y_axis = Axis::titled("Share of bookings (%)");

        // origin → (share with 1+ changes, share with none)
        let mut shares: BTreeMap<String, (f64, f64)> = BTreeMap::new();
        let distinct = table.distinct(0);
        for origin in self.origin_sequence(distinct.iter()) {
            let total = self.origin_total(table, &origin, BOOKING_CHANGES);
            let mut s = Series::named(&origin);
            s.highlighted = origin == local;
            s.marker.push(&self.enc.emphasis(&origin, false, false), None);
            for bucket in &buckets {
                let n = table
                    .get(&[origin.as_str(), bucket.as_str()])
                    .map_or(0, |r| r.n_bookings);
                let share = pct(n, total);
                s.x.push(Datum::from(bucket.as_str()));
                s.y.push(Datum::Num(share));
                s.text.push(format_pct(share));
                s.hover.push(hover_lines(
                    &origin,
                    &[
                        ("Changes", bucket.clone()),
                        ("Share", format_pct(share)),
                        ("Bookings", format_int(n)),
                    ],
                ));
            }
            if total > 0 {
                let none = table.get(&[origin.as_str(), zero.as_str()]).map_or(0, |r| r.n_bookings);
                shares.insert(origin.clone(), (pct(total - none, total), pct(none, total)));
            }
            spec.series.push(s);
        }

        if let (Some(l), Some(i)) = (shares.get(local), shares.get(intl)) {
            spec.annotations.push(Annotation::takeaway(
                format!(
                    "Bookings with 1+ changes: {} local vs {} international",
                    format_pct(l.0),
                    format_pct(i.0)
                ),
                0.5,
                0.98,
                None,
            ));
            let more_changes = l.0 - i.0;
            if more_changes > 0.0 {
                spec.annotations.push(Annotation::takeaway(
                    format!(
                        "Local bookings are changed more often: {} with 1+ changes",
                        format_pp(more_changes)
                    ),
                    0.98,
                    0.9,
                    Some(self.enc.color_of(local)),
                ));
            }
            let fewer_unchanged = i.1 - l.1;
            if fewer_unchanged > 0.0 {
                spec.annotations.push(Annotation::takeaway(
                    format!(
                        "Unchanged bookings are less common among local guests: {} vs international",
                        format_pp(-fewer_unchanged)
                    ),
                    0.02,
                    0.9,
                    Some(self.enc.color_of(intl)),
                ));
            }
        }
        debug!(chart = BOOKING_CHANGES, buckets = buckets.len(), "chart composed");
        spec
    }

    /// Deposit types as a 100% stack per origin, most committed type at the
    /// bottom.
    ///
    /// `table` is grouped by `[origin, deposit type]`.
    pub fn deposit_mix(&self, table: &AggregationTable) -> ChartSpec {
        let priority = &self.config.deposit_priority;
        let distinct_types = table.distinct(1);
        let types = stacking_order(distinct_types.iter().map(String::as_str), priority);
        let distinct_origins = table.distinct(0);
        let origins = self.origin_sequence(distinct_origins.iter());
        let [local, intl] = self.config.origin_order();

        let mut spec = ChartSpec::new(
            DEPOSIT_MIX,
            5,
            ChartKind::StackedBar,
            "Deposit type by origin".to_string(),
            "Non-refundable deposits mean a firmer commitment to the stay",
        );
        spec.x_axis = Axis {
            title: "Origin".to_string(),
            range: None,
            categories: origins.clone(),
        };
        spec.y_axis = Axis {
            title: "Share (%)".to_string(),
            range: Some([0.0, 100.0]),
            categories: Vec::new(),
        };

        let totals: Vec<u64> = origins
            .iter()
            .map(|o| self.origin_total(table, o, DEPOSIT_MIX))
            .collect();
        // shares[type][origin] feeds both the bars and the takeaway
        let shares: Vec<Vec<f64>> = types
            .iter()
            .map(|t| {
                origins
                    .iter()
                    .zip(totals.iter())
                    .map(|(o, total)| {
                        let n = table.get(&[o.as_str(), t.as_str()]).map_or(0, |r| r.n_bookings);
                        pct(n, *total)
                    })
                    .collect()
            })
            .collect();

        for (ti, t) in types.iter().enumerate() {
            let mut s = Series::named(t);
            for (oi, origin) in origins.iter().enumerate() {
                let share = shares[ti][oi];
                s.x.push(Datum::from(origin.as_str()));
                s.y.push(Datum::Num(share));
                s.marker.push(&self.enc.emphasis(t, origin == local, false), None);
                s.text.push(format_pct(share));
                s.hover.push(hover_lines(
                    origin,
                    &[("Deposit", t.clone()), ("Share", format_pct(share))],
                ));
            }
            spec.series.push(s);
        }

        // most committed type present in the data
        let committed = priority.iter().find(|p| types.contains(*p));
        let li = origins.iter().position(|o| o == local);
        let ii = origins.iter().position(|o| o == intl);
        if let (Some(c), Some(li), Some(ii)) = (committed, li, ii) {
            let ti = types.iter().position(|t| t == c).unwrap_or(0);
            if totals[li] > 0 && totals[ii] > 0 {
                let (l, i) = (shares[ti][li], shares[ti][ii]);
                let text = if i > l {
                    format!(
                        "International bookings carry {} more {} deposits ({} vs {})",
                        format_pp(i - l),
                        c,
                        format_pct(i),
                        format_pct(l)
                    )
                } else if l > i {
                    format!(
                        "Local bookings carry {} more {} deposits ({} vs {})",
                        format_pp(l - i),
                        c,
                        format_pct(l),
                        format_pct(i)
                    )
                } else {
                    format!("{} deposits: {} for both origins", c, format_pct(l))
                };
                spec.annotations.push(Annotation::takeaway(
                    text,
                    0.02,
                    0.98,
                    Some(self.enc.color_of(c)),
                ));
            }
        }
        debug!(chart = DEPOSIT_MIX, types = types.len(), "chart composed");
        spec
    }

    /// Local and international labels first (always present, possibly as
    /// empty series), then any other origin label found in the data.
    fn origin_sequence<'a>(&self, present: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        let priority: Vec<String> = self
            .config
            .origin_order()
            .iter()
            .map(|o| o.to_string())
            .collect();
        let mut seen: Vec<&str> = priority.iter().map(String::as_str).collect();
        let present: Vec<&str> = present.into_iter().map(String::as_str).collect();
        seen.extend(present);
        stacking_order(seen, &priority)
    }

    fn origin_total(&self, table: &AggregationTable, origin: &str, chart: &str) -> u64 {
        let total = table.total_for(0, origin).n_bookings;
        if total == 0 {
            warn!(chart, origin, "no bookings for origin, emitting an empty series");
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::values_by;
    use crate::config::StoryConfig;
    use crate::types::fixtures::{booking, table};
    use crate::types::{BookingRecord, BookingTable, Dimension, Metric};

    fn with(mut r: BookingRecord, f: impl FnOnce(&mut BookingRecord)) -> BookingRecord {
        f(&mut r);
        r
    }

    fn behaviour() -> BookingTable {
        let mut rows = Vec::new();
        // local: lead times 1..=20, changes: 10 none, 10 with 1..=10 changes
        for i in 0..20u32 {
            rows.push(with(booking("City Hotel", "PRT", 2016, false), |r| {
                r.lead_time = f64::from(i + 1);
                r.booking_changes = if i < 10 { 0 } else { i - 9 };
                r.deposit_type = if i < 2 { "Non Refund".into() } else { "No Deposit".into() };
            }));
        }
        // international: lead times 101..=120, 15 none, 5 with one change
        for i in 0..20u32 {
            rows.push(with(booking("Resort Hotel", "GBR", 2016, false), |r| {
                r.lead_time = f64::from(i + 101);
                r.booking_changes = u32::from(i >= 15);
                r.deposit_type = match i {
                    0..=5 => "Non Refund".into(),
                    6 => "Refundable".into(),
                    7 => "Corporate Hold".into(),
                    _ => "No Deposit".into(),
                };
            }));
        }
        table(rows)
    }

    #[test]
    fn test_lead_time_trim_and_untrimmed_stats() {
        let cfg = StoryConfig::default();
        let t = behaviour();
        let values = values_by(&t, Dimension::Origin, Metric::LeadTime);
        let spec = ChartComposer::new(&cfg).lead_time_distribution(&values);

        // 40 values, nearest-rank p95 is the 38th smallest: 118
        let range = spec.y_axis.range.unwrap();
        assert_eq!(range[0], 0.0);
        assert!((range[1] - 118.0 * 1.1).abs() < 1e-9);

        assert_eq!(spec.series[0].name, "Local (PRT)");
        assert!(spec.series[0].highlighted);
        let intl = spec.series_named("International").unwrap();
        assert_eq!(intl.y.len(), 18);
        let stats = intl.stats.as_ref().unwrap();
        assert_eq!(stats.n, 20);
        assert_eq!(stats.max, 120.0);
        assert!(intl.hover[0].contains("Max: 120 days"));
        assert_eq!(
            spec.takeaways()[0],
            "Local guests book earlier than international guests: median 10.5 days vs 110.5 days"
        );
    }

    #[test]
    fn test_lead_time_missing_origin_is_empty_series() {
        let cfg = StoryConfig::default();
        let t = table(vec![booking("City Hotel", "GBR", 2016, false)]);
        let values = values_by(&t, Dimension::Origin, Metric::LeadTime);
        let spec = ChartComposer::new(&cfg).lead_time_distribution(&values);
        assert_eq!(spec.series.len(), 2);
        assert!(spec.series_named("Local (PRT)").unwrap().is_empty());
        assert_eq!(spec.takeaways().len(), 1);
    }

    #[test]
    fn test_booking_changes_shares_and_takeaways() {
        let cfg = StoryConfig::default();
        let t = behaviour();
        let agg = AggregationTable::group_by(
            "origin_changes",
            &t,
            &[Dimension::Origin, Dimension::ChangesBucket],
        );
        let spec = ChartComposer::new(&cfg).booking_changes(&agg);
        assert_eq!(spec.x_axis.categories, vec!["0", "1", "2", "3", "4", "5+"]);
        let local = spec.series_named("Local (PRT)").unwrap();
        // changes 5..=10 fall in the capped bucket
        assert_eq!(local.text, vec!["50.0%", "5.0%", "5.0%", "5.0%", "5.0%", "30.0%"]);
        let intl = spec.series_named("International").unwrap();
        assert_eq!(intl.text[0], "75.0%");
        assert_eq!(intl.text[1], "25.0%");
        assert_eq!(
            spec.takeaways(),
            vec![
                "Bookings with 1+ changes: 50.0% local vs 25.0% international",
                "Local bookings are changed more often: +25.0 pp with 1+ changes",
                "Unchanged bookings are less common among local guests: -25.0 pp vs international",
            ]
        );
    }

    #[test]
    fn test_deposit_mix_order_and_gap() {
        let cfg = StoryConfig::default();
        let t = behaviour();
        let agg = AggregationTable::group_by(
            "origin_deposit",
            &t,
            &[Dimension::Origin, Dimension::DepositType],
        );
        let spec = ChartComposer::new(&cfg).deposit_mix(&agg);
        let names: Vec<&str> = spec.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Non Refund", "Refundable", "No Deposit", "Corporate Hold"]);
        assert_eq!(spec.x_axis.categories, vec!["Local (PRT)", "International"]);

        // every origin stacks to 100%
        for oi in 0..2 {
            let sum: f64 = spec.series.iter().filter_map(|s| s.y[oi].as_num()).sum();
            assert!((sum - 100.0).abs() < 1e-9);
        }
        let other = spec.series_named("Corporate Hold").unwrap();
        assert_eq!(other.marker.colors[0], cfg.palette.default_color);
        assert_eq!(
            spec.takeaways(),
            vec!["International bookings carry +20.0 pp more Non Refund deposits (30.0% vs 10.0%)"]
        );
    }
}
