// Batch pipeline: load → aggregate → flow graph → chart specs.
//
// Single pass, no shared mutable state. Every table is built once and handed
// to the charts by reference, so two runs over the same input produce the
// same specs in the same order.
use crate::aggregate::{values_by, AggregationTable, FilteredPopulation};
use crate::charts::{ChartComposer, ChartSpec};
use crate::config::StoryConfig;
use crate::error::{PipelineError, Result};
use crate::flow::{FlowGraph, FlowGraphBuilder};
use crate::loader::{load_table, LoadReport};
use crate::types::{BookingTable, Dimension, Metric};
use std::path::Path;
use tracing::{debug, info, warn};

/// Every intermediate aggregation, in export order.
#[derive(Debug, Clone)]
pub struct StoryTables {
    pub hotel_year: AggregationTable,
    pub country: AggregationTable,
    pub country_hotel: AggregationTable,
    pub origin_hotel: AggregationTable,
    pub origin_changes: AggregationTable,
    pub origin_deposit: AggregationTable,
    /// Countries below the booking threshold, left out of both country tables.
    pub dropped_countries: Vec<String>,
}

impl StoryTables {
    pub fn build(table: &BookingTable, config: &StoryConfig) -> Self {
        let markets = FilteredPopulation::new(
            table,
            Dimension::Country,
            config.filters.min_country_bookings,
        );
        debug!(retained = ?markets.retained(), "markets kept for country charts");
        let country = markets.group_by("country", &[Dimension::Country]);
        if country.is_empty() {
            warn!(
                min_bookings = config.filters.min_country_bookings,
                "no market reaches the booking threshold"
            );
        }
        Self {
            hotel_year: AggregationTable::group_by(
                "hotel_year",
                table,
                &[Dimension::Hotel, Dimension::ArrivalYear],
            ),
            country,
            country_hotel: markets.group_by("country_hotel", &[Dimension::Country, Dimension::Hotel]),
            origin_hotel: AggregationTable::group_by(
                "origin_hotel",
                table,
                &[Dimension::Origin, Dimension::Hotel],
            ),
            origin_changes: AggregationTable::group_by(
                "origin_changes",
                table,
                &[Dimension::Origin, Dimension::ChangesBucket],
            ),
            origin_deposit: AggregationTable::group_by(
                "origin_deposit",
                table,
                &[Dimension::Origin, Dimension::DepositType],
            ),
            dropped_countries: markets.dropped().iter().cloned().collect(),
        }
    }

    pub fn all(&self) -> [&AggregationTable; 6] {
        [
            &self.hotel_year,
            &self.country,
            &self.country_hotel,
            &self.origin_hotel,
            &self.origin_changes,
            &self.origin_deposit,
        ]
    }
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct Story {
    pub load: LoadReport,
    pub tables: StoryTables,
    pub flow: FlowGraph,
    pub charts: Vec<ChartSpec>,
}

/// Load `input` and compose every chart.
pub fn run(input: &Path, config: &StoryConfig) -> Result<Story> {
    let (table, load) = load_table(input, config)?;
    let (tables, flow, charts) = compose(&table, config)?;
    Ok(Story {
        load,
        tables,
        flow,
        charts,
    })
}

/// Build the tables, the flow graph and the chart specs for an already
/// loaded booking table. An empty table is rejected up front.
pub fn compose(
    table: &BookingTable,
    config: &StoryConfig,
) -> Result<(StoryTables, FlowGraph, Vec<ChartSpec>)> {
    if table.is_empty() {
        return Err(PipelineError::EmptyTable {
            path: table.source.clone(),
        });
    }

    let tables = StoryTables::build(table, config);
    info!(
        tables = tables.all().len(),
        markets = tables.country.len(),
        dropped_markets = tables.dropped_countries.len(),
        "aggregation tables built"
    );

    let flow = FlowGraphBuilder::new(&config.flow_levels()?)
        .label_policy(config.flow_label_policy())
        .build(table)?;
    info!(
        nodes = flow.nodes().len(),
        edges = flow.edges().len(),
        "flow graph built"
    );

    let lead_times = values_by(table, Dimension::Origin, Metric::LeadTime);
    let composer = ChartComposer::new(config);
    let charts = vec![
        composer.volume_by_hotel_year(&tables.hotel_year),
        composer.cancel_gap_by_hotel_year(&tables.hotel_year),
        composer.country_bubbles(&tables.country, &tables.country_hotel),
        composer.country_treemap(&tables.country),
        composer.booking_flow(&flow),
        composer.lead_time_distribution(&lead_times),
        composer.booking_changes(&tables.origin_changes),
        composer.deposit_mix(&tables.origin_deposit),
    ];
    info!(charts = charts.len(), "chart specs composed");
    Ok((tables, flow, charts))
}
