// Entry point and high-level CLI flow.
//
// One batch run:
// - loads the cleaned booking CSV and prints a short load summary,
// - builds the aggregation tables, the flow graph and the chart specs,
// - writes `charts.json` plus one CSV per table and previews each table.
mod aggregate;
mod charts;
mod config;
mod error;
mod flow;
mod loader;
mod output;
mod pipeline;
mod types;
mod util;

use clap::Parser;
use config::StoryConfig;
use error::Result;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hotel_story")]
#[command(version = "0.1.0")]
#[command(about = "Turn a cleaned hotel booking table into narrative chart specifications")]
struct Cli {
    /// Cleaned booking table (CSV with header)
    #[arg(long, default_value = "hotel_bookings_clean.csv")]
    input: PathBuf,

    /// Directory receiving charts.json and tables/
    #[arg(long, default_value = "story_output")]
    out_dir: PathBuf,

    /// Optional TOML file overriding thresholds, labels and colors
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rows shown in each console table preview
    #[arg(long, default_value_t = 3)]
    preview_rows: usize,
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => StoryConfig::from_path(path)?,
        None => StoryConfig::default(),
    };
    info!(input = %cli.input.display(), "starting run");

    let story = pipeline::run(&cli.input, &config)?;
    let load = &story.load;
    println!(
        "Processing dataset... ({} rows loaded, {} local, {} international)",
        util::format_int(load.total_rows as u64),
        util::format_int(load.local_rows as u64),
        util::format_int(load.international_rows as u64)
    );
    if load.derived_origin > 0 {
        println!(
            "Info: Derived origin class for {} rows.",
            util::format_int(load.derived_origin as u64)
        );
    }
    if !story.tables.dropped_countries.is_empty() {
        println!(
            "Note: {} countries below {} bookings left out of the market charts.",
            util::format_int(story.tables.dropped_countries.len() as u64),
            util::format_int(config.filters.min_country_bookings)
        );
    }
    println!();

    let tables_dir = cli.out_dir.join("tables");
    let written = output::write_tables(&tables_dir, story.tables.all())?;
    for (table, path) in story.tables.all().into_iter().zip(written.iter()) {
        println!("Table: {} ({} groups)\n", table.name(), util::format_int(table.len() as u64));
        output::preview_table_rows(&table.preview_rows(), cli.preview_rows);
        println!("(Full table exported to {})\n", path.display());
    }

    let charts_path = cli.out_dir.join("charts.json");
    output::write_json(&charts_path, &story.charts)?;
    println!(
        "Flow graph: {} nodes, {} links",
        util::format_int(story.flow.nodes().len() as u64),
        util::format_int(story.flow.edges().len() as u64)
    );
    println!("Chart specs ({}):", charts_path.display());
    for chart in &story.charts {
        let drawn = chart.series.iter().filter(|s| !s.is_empty()).count();
        println!(
            "  [act {}] {} - {} ({} series)",
            chart.act, chart.id, chart.title, drawn
        );
        for t in chart.takeaways() {
            println!("      {}", t);
        }
    }
    println!();
    info!(charts = story.charts.len(), out_dir = %cli.out_dir.display(), "run complete");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        error!(fatal = e.is_fatal(), "{}", e);
        eprintln!("Run failed: {}", e);
        std::process::exit(1);
    }
}
