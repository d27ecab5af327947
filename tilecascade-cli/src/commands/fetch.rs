//! Fetch command - resolve one tile and save it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use clap::Args;
use tokio::sync::mpsc;
use tracing::info;

use tilecascade::coord::to_tile_index;
use tilecascade::pipeline::{PipelineBuilder, TileDelivery, TileResult};
use tilecascade::TileIndex;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the fetch command.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Zoom level
    #[arg(long)]
    pub zoom: u8,

    /// Tile column
    #[arg(long, requires = "y", conflicts_with_all = ["lat", "lon"])]
    pub x: Option<u32>,

    /// Tile row
    #[arg(long, requires = "x")]
    pub y: Option<u32>,

    /// Latitude in decimal degrees (alternative to --x/--y)
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude in decimal degrees
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Output file (default: {z}_{x}_{y} plus the source extension)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Never use the network
    #[arg(long)]
    pub offline: bool,

    /// Delay before each download in milliseconds (overrides the config)
    #[arg(long)]
    pub lag_ms: Option<u64>,
}

/// Run the fetch command.
pub fn run(
    args: FetchArgs,
    config_path: Option<&std::path::Path>,
    verbose: bool,
) -> Result<(), CliError> {
    let runner = CliRunner::new(config_path, verbose)?;
    runner.log_startup("fetch");

    let mut config = runner.config().to_pipeline_config()?;
    if let Some(lag_ms) = args.lag_ms {
        config.lag = Duration::from_millis(lag_ms);
    }
    if args.offline {
        config.use_data_connection = false;
    }

    let source = config.source.clone();
    let index = match (args.x, args.y, args.lat, args.lon) {
        (Some(x), Some(y), _, _) => TileIndex::checked(source.name(), args.zoom, x, y)?,
        (_, _, Some(lat), Some(lon)) => to_tile_index(source.name(), lat, lon, args.zoom)?,
        _ => {
            return Err(CliError::Config(
                "specify either --x and --y, or --lat and --lon".to_string(),
            ))
        }
    };

    let output = args.output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "{}_{}_{}{}",
            index.zoom(),
            index.x(),
            index.y(),
            source.extension()
        ))
    });

    println!("Fetching tile {}", index);
    println!("  Source: {}", source.name());
    if config.use_data_connection && !source.is_offline() {
        println!("  Network lag: {}ms", config.lag.as_millis());
    } else {
        println!("  Network: disabled");
    }
    println!();

    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    let resolved = runtime.block_on(async {
        let pipeline = PipelineBuilder::new(config).build().await?;
        println!("Providers: {}", pipeline.module_names().join(" → "));

        let (tx, rx) = mpsc::unbounded_channel();
        let callback = Arc::new(move |delivery: TileDelivery| {
            let _ = tx.send(delivery);
        });
        pipeline.request_tile(index.clone(), callback)?;

        let resolved = collect_deliveries(rx).await;
        pipeline.log_stats();
        pipeline.detach().await;
        Ok::<_, CliError>(resolved)
    })?;

    let (data, exact) = resolved.ok_or_else(|| CliError::TileUnavailable(index.to_string()))?;
    std::fs::write(&output, &data).map_err(|error| CliError::FileWrite {
        path: output.display().to_string(),
        error,
    })?;

    let kind = if exact { "exact" } else { "approximate" };
    println!();
    println!(
        "Saved {} tile ({} bytes) to {}",
        kind,
        data.len(),
        output.display()
    );
    info!(tile = %index, exact, bytes = data.len(), "Tile saved");
    Ok(())
}

/// Prints deliveries as they arrive and returns the best result.
///
/// The channel closes once the pipeline has finished with the request.
async fn collect_deliveries(
    mut rx: mpsc::UnboundedReceiver<TileDelivery>,
) -> Option<(Bytes, bool)> {
    let start = Instant::now();
    let mut best = None;

    while let Some(delivery) = rx.recv().await {
        let elapsed = start.elapsed().as_secs_f64();
        match delivery.result {
            TileResult::Approximate(data) => {
                println!(
                    "Approximation after {:.2}s ({} bytes)",
                    elapsed,
                    data.len()
                );
                best = Some((data, false));
            }
            TileResult::Exact(data) => {
                println!("Tile after {:.2}s ({} bytes)", elapsed, data.len());
                best = Some((data, true));
            }
            TileResult::Miss => {
                println!("No provider had the tile ({:.2}s)", elapsed);
            }
        }
    }

    best
}
