// Chart composition, acts 1 and 2 (volume and the hotel cancellation gap).
//
// Every chart follows the same shape: build one intermediate aggregate from
// its input table, then derive both the series and the annotation text from
// that intermediate. No chart goes back to the booking table.
use super::encoding::Encodings;
use super::spec::{
    hover_lines, padded_pct_range, Annotation, Axis, ChartKind, ChartSpec, Datum, Series,
};
use crate::aggregate::AggregationTable;
use crate::config::StoryConfig;
use crate::util::{average, format_int, format_pct, format_pp, pct};
use std::cmp::Ordering;
use tracing::debug;

pub const VOLUME_HOTEL_YEAR: &str = "volume_hotel_year";
pub const CANCEL_GAP_HOTEL_YEAR: &str = "cancel_gap_hotel_year";
pub const COUNTRY_BUBBLES: &str = "country_bubbles";
pub const COUNTRY_TREEMAP: &str = "country_treemap";
pub const BOOKING_FLOW: &str = "booking_flow";
pub const LEAD_TIME_DISTRIBUTION: &str = "lead_time_distribution";
pub const BOOKING_CHANGES: &str = "booking_changes";
pub const DEPOSIT_MIX: &str = "deposit_mix";

const FOCAL_MARKER_SIZE: f64 = 15.0;
const PEER_MARKER_SIZE: f64 = 12.0;

pub struct ChartComposer<'c> {
    pub(super) config: &'c StoryConfig,
    pub(super) enc: Encodings,
}

impl<'c> ChartComposer<'c> {
    pub fn new(config: &'c StoryConfig) -> Self {
        Self {
            config,
            enc: Encodings::new(config),
        }
    }

    /// Act 1: stacked booking volume per hotel and year.
    ///
    /// `table` is grouped by `[hotel, arrival year]`.
    pub fn volume_by_hotel_year(&self, table: &AggregationTable) -> ChartSpec {
        let hotels = table.distinct(0);
        let years = table.distinct(1);

        // counts[h][y] is the single source for the areas, the share labels
        // and the takeaway
        let counts: Vec<Vec<u64>> = hotels
            .iter()
            .map(|h| {
                years
                    .iter()
                    .map(|y| table.row_or_empty(&[h.as_str(), y.as_str()]).n_bookings)
                    .collect()
            })
            .collect();
        let year_totals: Vec<u64> = (0..years.len())
            .map(|yi| counts.iter().map(|c| c[yi]).sum())
            .collect();
        let hotel_totals: Vec<u64> = counts.iter().map(|c| c.iter().sum()).collect();
        let grand_total: u64 = hotel_totals.iter().sum();

        let largest = argmax(&hotel_totals).map(|i| hotels[i].clone());
        let focal = self.enc.focal(&hotels, largest);

        let title = match &focal {
            Some(f) => format!("{} carries most of the booking volume every year", f),
            None => "Booking volume per hotel and year".to_string(),
        };
        let mut spec = ChartSpec::new(
            VOLUME_HOTEL_YEAR,
            1,
            ChartKind::StackedArea,
            title,
            "Stacked bookings per hotel type; labels give each hotel's share of the year",
        );
        spec.x_axis = Axis {
            title: "Year".to_string(),
            range: None,
            categories: years.clone(),
        };
        spec.y_axis = Axis::titled("Bookings");

        for (hi, hotel) in hotels.iter().enumerate() {
            let is_focal = focal.as_deref() == Some(hotel.as_str());
            let mut s = Series::named(hotel);
            s.highlighted = is_focal;
            s.marker.push(&self.enc.emphasis(hotel, is_focal, false), None);
            for (yi, year) in years.iter().enumerate() {
                let n = counts[hi][yi];
                let share = pct(n, year_totals[yi]);
                s.x.push(Datum::from(year.as_str()));
                s.y.push(Datum::Num(n as f64));
                if n == 0 {
                    s.text.push(String::new());
                    s.hover.push(String::new());
                    continue;
                }
                let share_key = format!("Share of {}", year);
                let total_key = format!("Total {}", year);
                s.text.push(format_pct(share));
                s.hover.push(hover_lines(
                    &format!("{} - {}", hotel, year),
                    &[
                        ("Bookings", format_int(n)),
                        (share_key.as_str(), format_pct(share)),
                        (total_key.as_str(), format_int(year_totals[yi])),
                    ],
                ));
                // label sits in the middle of the hotel's band
                let base: u64 = counts[..hi].iter().map(|c| c[yi]).sum();
                spec.annotations.push(Annotation::label(
                    format_pct(share),
                    Datum::from(year.as_str()),
                    Datum::Num(base as f64 + n as f64 * 0.5),
                ));
            }
            spec.series.push(s);
        }

        if let Some(f) = &focal {
            let fi = hotels.iter().position(|h| h == f).unwrap_or(0);
            let n = hotel_totals.get(fi).copied().unwrap_or(0);
            spec.annotations.push(Annotation::takeaway(
                format!(
                    "{} concentrates {} of all bookings ({} of {})",
                    f,
                    format_pct(pct(n, grand_total)),
                    format_int(n),
                    format_int(grand_total)
                ),
                0.5,
                0.95,
                Some(self.enc.color_of(f)),
            ));
        }
        debug!(chart = VOLUME_HOTEL_YEAR, series = spec.series.len(), "chart composed");
        spec
    }

    /// Act 2: dumbbell of cancellation rate per year, focal hotel against
    /// the lowest-rate peer.
    ///
    /// `table` is grouped by `[hotel, arrival year]`.
    pub fn cancel_gap_by_hotel_year(&self, table: &AggregationTable) -> ChartSpec {
        let hotels = table.distinct(0);
        let years = table.distinct(1);
        let overall: Vec<f64> = hotels
            .iter()
            .map(|h| table.total_for(0, h).cancel_rate_pct)
            .collect();

        let highest = argmax(&overall).map(|i| hotels[i].clone());
        let focal = self.enc.focal(&hotels, highest);
        let baseline: Option<String> = hotels
            .iter()
            .zip(overall.iter())
            .filter(|(h, _)| Some(h.as_str()) != focal.as_deref())
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
            .map(|(h, _)| h.clone());

        let title = match &focal {
            Some(f) => format!("Cancellation rate is consistently higher at {}", f),
            None => "Cancellation rate per hotel and year".to_string(),
        };
        let mut spec = ChartSpec::new(
            CANCEL_GAP_HOTEL_YEAR,
            2,
            ChartKind::Dumbbell,
            title,
            "Direct comparison per year; the connector length is the gap in percentage points",
        );
        spec.y_axis = Axis {
            title: "Year".to_string(),
            range: None,
            categories: years.clone(),
        };

        let rates_for = |hotel: &Option<String>| -> Vec<(f64, u64, u64)> {
            years
                .iter()
                .map(|y| match hotel {
                    Some(h) => {
                        let r = table.row_or_empty(&[h.as_str(), y.as_str()]);
                        (r.cancel_rate_pct, r.n_bookings, r.n_canceled)
                    }
                    None => (0.0, 0, 0),
                })
                .collect()
        };
        let focal_rates = rates_for(&focal);
        let base_rates = rates_for(&baseline);

        let mut diffs: Vec<f64> = Vec::new();
        if baseline.is_some() {
            for (yi, year) in years.iter().enumerate() {
                let (b, f) = (base_rates[yi].0, focal_rates[yi].0);
                diffs.push(f - b);
                let mut c = Series::named(&format!("gap {}", year));
                c.x = vec![Datum::Num(b), Datum::Num(f)];
                c.y = vec![Datum::from(year.as_str()); 2];
                c.marker.colors.push(self.enc.palette().connector.clone());
                c.marker.outline_widths.push(3.0);
                spec.series.push(c);
            }
        }

        for (hotel, rates, is_focal) in [
            (&baseline, &base_rates, false),
            (&focal, &focal_rates, true),
        ] {
            let Some(hotel) = hotel else { continue };
            let mut s = Series::named(hotel);
            s.highlighted = is_focal;
            let size = if is_focal { FOCAL_MARKER_SIZE } else { PEER_MARKER_SIZE };
            let e = self.enc.emphasis(hotel, is_focal, false);
            for (yi, year) in years.iter().enumerate() {
                let (rate, n, canceled) = rates[yi];
                s.x.push(Datum::Num(rate));
                s.y.push(Datum::from(year.as_str()));
                s.marker.push(&e, Some(size));
                s.text.push(format_pct(rate));
                s.hover.push(hover_lines(
                    &format!("{} - {}", hotel, year),
                    &[
                        ("Rate", format_pct(rate)),
                        ("Bookings", format_int(n)),
                        ("Canceled", format_int(canceled)),
                    ],
                ));
            }
            spec.series.push(s);
        }

        let mut all_rates: Vec<f64> = focal_rates.iter().map(|r| r.0).collect();
        if baseline.is_some() {
            all_rates.extend(base_rates.iter().map(|r| r.0));
        }
        spec.x_axis = Axis {
            title: "Cancellation rate (%)".to_string(),
            range: Some(padded_pct_range(&all_rates, 5.0)),
            categories: Vec::new(),
        };

        for (yi, year) in years.iter().enumerate() {
            let Some(d) = diffs.get(yi) else { break };
            if d.abs() > self.config.gap.label_min_pp {
                let mid = (base_rates[yi].0 + focal_rates[yi].0) / 2.0;
                spec.annotations.push(Annotation::label(
                    format_pp(*d),
                    Datum::Num(mid),
                    Datum::from(year.as_str()),
                ));
            }
        }
        if let (Some(f), Some(b)) = (&focal, &baseline) {
            let avg = average(&diffs);
            spec.annotations.push(Annotation::takeaway(
                format!("Average gap {} vs {}: {} across all years", f, b, format_pp(avg)),
                0.98,
                0.98,
                Some(self.enc.color_of(f)),
            ));
        } else if let Some(f) = &focal {
            let overall_rate = table.total_for(0, f).cancel_rate_pct;
            spec.annotations.push(Annotation::takeaway(
                format!("{} cancellation rate: {}", f, format_pct(overall_rate)),
                0.98,
                0.98,
                Some(self.enc.color_of(f)),
            ));
        }
        debug!(chart = CANCEL_GAP_HOTEL_YEAR, years = years.len(), "chart composed");
        spec
    }
}

/// Index of the largest value; ties go to the first.
fn argmax<T: PartialOrd>(values: &[T]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        if best.map_or(true, |b| *v > values[b]) {
            best = Some(i);
        }
    }
    best
}
