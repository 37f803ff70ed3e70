// Act 3: markets. Both charts read the frequency-filtered country tables.
use super::composer::{ChartComposer, COUNTRY_BUBBLES, COUNTRY_TREEMAP};
use super::encoding::{diameter, shows_inline_label, FOCAL_OUTLINE};
use super::spec::{
    hover_lines, padded_pct_range, Annotation, Axis, ChartKind, ChartSpec, Datum, Placement,
    Series,
};
use crate::aggregate::{AggregateRow, AggregationTable};
use crate::util::{format_int, format_pct, pct};
use tracing::debug;

const TILE_OUTLINE: f64 = 2.0;

impl ChartComposer<'_> {
    /// Countries ranked by cancellation rate, bubble diameter by volume.
    ///
    /// `country` is grouped by `[country]` and `country_hotel` by
    /// `[country, hotel]`; both must come from the same filtered population.
    pub fn country_bubbles(
        &self,
        country: &AggregationTable,
        country_hotel: &AggregationTable,
    ) -> ChartSpec {
        let ranked = country.ranked();
        let focal = self.market_focal(country);
        let totals = country.totals();
        let global_avg = totals.cancel_rate_pct;
        let max_bookings = ranked.iter().map(|r| r.n_bookings).max().unwrap_or(0);
        let b = &self.config.bubbles;

        let title = match focal.as_ref().and_then(|f| country.get(&[f.as_str()])) {
            Some(row) if row.cancel_rate_pct > global_avg => format!(
                "{} sits above the market average cancellation rate",
                row.key[0]
            ),
            _ => "Cancellation rate per market".to_string(),
        };
        let mut spec = ChartSpec::new(
            COUNTRY_BUBBLES,
            3,
            ChartKind::Bubble,
            title,
            "Markets ranked by cancellation rate; bubble size is booking volume",
        );

        let mut s = Series::named("countries");
        for row in &ranked {
            let code = row.key[0].as_str();
            let is_focal = focal.as_deref() == Some(code);
            s.highlighted |= is_focal;
            let e = self.enc.emphasis(self.config.origin_label(code), is_focal, true);
            let d = diameter(
                row.n_bookings as f64,
                max_bookings as f64,
                b.min_diameter,
                b.max_diameter,
            );
            s.x.push(Datum::Num(row.cancel_rate_pct));
            s.y.push(Datum::from(code));
            s.marker.push(&e, Some(d));
            let labelled =
                shows_inline_label(row.n_bookings as f64, b.label_min_bookings as f64, is_focal);
            s.text.push(if labelled {
                format_int(row.n_bookings)
            } else {
                String::new()
            });
            let dominant = dominant_hotel(country_hotel, code).unwrap_or_else(|| "-".to_string());
            s.hover.push(hover_lines(
                code,
                &[
                    ("Cancellation rate", format_pct(row.cancel_rate_pct)),
                    ("Bookings", format_int(row.n_bookings)),
                    ("Canceled", format_int(row.n_canceled)),
                    ("Main hotel", dominant),
                ],
            ));
        }
        let rates: Vec<f64> = ranked.iter().map(|r| r.cancel_rate_pct).collect();
        spec.x_axis = Axis {
            title: "Cancellation rate (%)".to_string(),
            range: Some(padded_pct_range(&rates, 5.0)),
            categories: Vec::new(),
        };
        spec.y_axis = Axis {
            title: "Country".to_string(),
            range: None,
            categories: ranked.iter().map(|r| r.key[0].clone()).collect(),
        };
        spec.series.push(s);

        if !ranked.is_empty() {
            spec.annotations.push(Annotation {
                text: format!("Global average: {}", format_pct(global_avg)),
                placement: Placement::VerticalLine { x: global_avg },
                color: Some(self.enc.palette().reference_line.clone()),
                takeaway: false,
            });
        }
        if let Some(row) = focal.as_ref().and_then(|f| country.get(&[f.as_str()])) {
            let position = ranked.iter().position(|r| r.key == row.key).unwrap_or(0) + 1;
            spec.annotations.push(Annotation::takeaway(
                format!(
                    "{}: {} canceled ({} of {}), rank {} of {} markets",
                    row.key[0],
                    format_pct(row.cancel_rate_pct),
                    format_int(row.n_canceled),
                    format_int(row.n_bookings),
                    position,
                    ranked.len()
                ),
                0.98,
                0.02,
                Some(self.focal_country_color(&row.key[0])),
            ));
        }
        debug!(chart = COUNTRY_BUBBLES, markets = ranked.len(), "chart composed");
        spec
    }

    /// Area is booking volume, color is cancellation rate.
    pub fn country_treemap(&self, country: &AggregationTable) -> ChartSpec {
        let focal = self.market_focal(country);
        let totals = country.totals();
        let total = totals.n_bookings;
        let cfg = &self.config.treemap;

        let mut spec = ChartSpec::new(
            COUNTRY_TREEMAP,
            3,
            ChartKind::Treemap,
            "Cancellation risk weighted by market size".to_string(),
            "Area is booking volume; color is cancellation rate",
        );
        spec.color_scale = cfg.color_scale.clone();

        // largest tiles first
        let mut rows: Vec<&AggregateRow> = country.rows().collect();
        rows.sort_by(|a, b| b.n_bookings.cmp(&a.n_bookings).then_with(|| a.key.cmp(&b.key)));

        let mut s = Series::named("countries");
        for row in rows {
            let code = row.key[0].as_str();
            let is_focal = focal.as_deref() == Some(code);
            s.highlighted |= is_focal;
            let share = pct(row.n_bookings, total);
            s.x.push(Datum::from(code));
            s.y.push(Datum::Num(row.n_bookings as f64));
            s.marker.color_values.push(row.cancel_rate_pct);
            if is_focal {
                s.marker.outline_widths.push(FOCAL_OUTLINE);
                s.marker
                    .outline_colors
                    .push(self.focal_country_color(code).to_string());
            } else {
                s.marker.outline_widths.push(TILE_OUTLINE);
                s.marker
                    .outline_colors
                    .push(self.enc.palette().highlight_outline.clone());
            }
            s.text.push(if share > cfg.label_min_share_pct {
                format!(
                    "{}\n{}\nRate: {}",
                    code,
                    format_int(row.n_bookings),
                    format_pct(row.cancel_rate_pct)
                )
            } else {
                code.to_string()
            });
            s.hover.push(hover_lines(
                code,
                &[
                    ("Bookings", format_int(row.n_bookings)),
                    ("Share", format_pct(share)),
                    ("Cancellation rate", format_pct(row.cancel_rate_pct)),
                ],
            ));
        }
        spec.series.push(s);

        if let Some(row) = focal.as_ref().and_then(|f| country.get(&[f.as_str()])) {
            let avg = totals.cancel_rate_pct;
            let relation = if row.cancel_rate_pct > avg {
                "above"
            } else if row.cancel_rate_pct < avg {
                "below"
            } else {
                "at"
            };
            spec.annotations.push(Annotation::takeaway(
                format!(
                    "{}: {} bookings ({} of volume), rate {} {} the {} average",
                    row.key[0],
                    format_int(row.n_bookings),
                    format_pct(pct(row.n_bookings, total)),
                    format_pct(row.cancel_rate_pct),
                    relation,
                    format_pct(avg)
                ),
                0.02,
                0.98,
                Some(self.focal_country_color(&row.key[0])),
            ));
        }
        debug!(chart = COUNTRY_TREEMAP, tiles = country.len(), "chart composed");
        spec
    }

    /// Pinned country if any, otherwise the local market when it survived
    /// the frequency filter.
    fn market_focal(&self, country: &AggregationTable) -> Option<String> {
        let candidates = country.distinct(0);
        let local = &self.config.origin.local_country;
        let data_driven = candidates.iter().find(|c| *c == local).cloned();
        self.enc.focal(&candidates, data_driven)
    }

    fn focal_country_color(&self, code: &str) -> &str {
        self.enc.color_of(self.config.origin_label(code))
    }
}

/// Hotel with the most bookings from `code`; ties go to the first hotel in
/// key order.
fn dominant_hotel(country_hotel: &AggregationTable, code: &str) -> Option<String> {
    let mut best: Option<&AggregateRow> = None;
    for row in country_hotel.rows_where(0, code) {
        if best.map_or(true, |b| row.n_bookings > b.n_bookings) {
            best = Some(row);
        }
    }
    best.and_then(|r| r.key.get(1).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::FilteredPopulation;
    use crate::config::StoryConfig;
    use crate::types::fixtures::{booking, table};
    use crate::types::{BookingTable, Dimension};

    fn markets() -> BookingTable {
        let mut rows = Vec::new();
        // PRT: 12 bookings, 6 canceled, mostly City
        for i in 0..12 {
            let hotel = if i < 8 { "City Hotel" } else { "Resort Hotel" };
            rows.push(booking(hotel, "PRT", 2016, i % 2 == 0));
        }
        // GBR: 10 bookings, 2 canceled, mostly Resort
        for i in 0..10 {
            let hotel = if i < 3 { "City Hotel" } else { "Resort Hotel" };
            rows.push(booking(hotel, "GBR", 2016, i < 2));
        }
        // ESP: 5 bookings, 4 canceled
        for i in 0..5 {
            rows.push(booking("City Hotel", "ESP", 2016, i < 4));
        }
        // FRA: below the filter
        rows.push(booking("City Hotel", "FRA", 2016, true));
        table(rows)
    }

    fn tables(t: &BookingTable, min: u64) -> (AggregationTable, AggregationTable) {
        let pop = FilteredPopulation::new(t, Dimension::Country, min);
        (
            pop.group_by("country", &[Dimension::Country]),
            pop.group_by("country_hotel", &[Dimension::Country, Dimension::Hotel]),
        )
    }

    #[test]
    fn test_bubbles_rank_and_highlight_local_market() {
        let mut cfg = StoryConfig::default();
        cfg.bubbles.label_min_bookings = 8;
        let t = markets();
        let (country, country_hotel) = tables(&t, 5);
        let spec = ChartComposer::new(&cfg).country_bubbles(&country, &country_hotel);

        assert_eq!(spec.y_axis.categories, vec!["ESP", "PRT", "GBR"]);
        let s = &spec.series[0];
        assert!(s.highlighted);
        // PRT is second in rank order
        assert_eq!(s.marker.colors[1], "#C0392B");
        assert_eq!(s.marker.opacities[1], 0.9);
        assert_eq!(s.marker.outline_widths[1], 3.0);
        assert_eq!(s.marker.colors[0], cfg.palette.muted_color);
        assert_eq!(s.marker.opacities[0], 0.4);
        // largest market gets the max diameter
        assert_eq!(s.marker.sizes[1], 50.0);
        // labels: PRT (focal), GBR (10 > 8), not ESP
        assert_eq!(s.text, vec!["", "12", "10"]);
        assert!(s.hover[2].contains("Main hotel: Resort Hotel"));
        assert!(s.hover[1].contains("Main hotel: City Hotel"));
    }

    #[test]
    fn test_bubbles_global_average_excludes_filtered_markets() {
        let cfg = StoryConfig::default();
        let t = markets();
        let (country, country_hotel) = tables(&t, 5);
        let spec = ChartComposer::new(&cfg).country_bubbles(&country, &country_hotel);
        // 12 canceled of 27 retained bookings; FRA is out
        let line = spec
            .annotations
            .iter()
            .find(|a| matches!(a.placement, Placement::VerticalLine { .. }))
            .unwrap();
        assert_eq!(line.text, "Global average: 44.4%");
        assert_eq!(
            spec.takeaways(),
            vec!["PRT: 50.0% canceled (6 of 12), rank 2 of 3 markets"]
        );
        assert!(!spec.y_axis.categories.contains(&"FRA".to_string()));
    }

    #[test]
    fn test_bubbles_without_local_market() {
        let cfg = StoryConfig::default();
        let t = table(vec![
            booking("City Hotel", "GBR", 2016, true),
            booking("City Hotel", "GBR", 2016, false),
        ]);
        let (country, country_hotel) = tables(&t, 1);
        let spec = ChartComposer::new(&cfg).country_bubbles(&country, &country_hotel);
        assert!(!spec.series[0].highlighted);
        assert!(spec.takeaways().is_empty());
        assert_eq!(spec.title, "Cancellation rate per market");
    }

    #[test]
    fn test_treemap_labels_by_share() {
        let mut cfg = StoryConfig::default();
        cfg.treemap.label_min_share_pct = 25.0;
        let t = markets();
        let (country, _) = tables(&t, 5);
        let spec = ChartComposer::new(&cfg).country_treemap(&country);
        let s = &spec.series[0];
        assert_eq!(s.x[0], Datum::from("PRT"));
        assert_eq!(s.text[0], "PRT\n12\nRate: 50.0%");
        // ESP is 5 of 27 = 18.5%
        assert_eq!(s.text[2], "ESP");
        assert_eq!(s.marker.color_values, vec![50.0, 20.0, 80.0]);
        assert_eq!(spec.color_scale.len(), 6);
        assert_eq!(
            spec.takeaways(),
            vec!["PRT: 12 bookings (44.4% of volume), rate 50.0% above the 44.4% average"]
        );
        // focal tile outlined in its own color, peers in the tile separator color
        assert_eq!(s.marker.outline_widths, vec![3.0, 2.0, 2.0]);
        assert_eq!(s.marker.outline_colors[0], "#C0392B");
        assert_eq!(s.marker.outline_colors[1], cfg.palette.highlight_outline);
    }

    #[test]
    fn test_treemap_focal_below_average() {
        let cfg = StoryConfig::default();
        let mut rows = Vec::new();
        for i in 0..10 {
            rows.push(booking("City Hotel", "PRT", 2016, i < 1));
            rows.push(booking("City Hotel", "GBR", 2016, i < 9));
        }
        let t = table(rows);
        let (country, _) = tables(&t, 1);
        let spec = ChartComposer::new(&cfg).country_treemap(&country);
        assert_eq!(
            spec.takeaways(),
            vec!["PRT: 10 bookings (50.0% of volume), rate 10.0% below the 50.0% average"]
        );
    }
}
