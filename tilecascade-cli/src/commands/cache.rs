//! Cache management CLI commands.

use std::path::Path;
use std::time::Duration;

use clap::Subcommand;

use tilecascade::cache::{clear_directory, disk_stats, DiskStoreConfig, DiskTileStore, TileStore};
use tilecascade::config::{format_size, format_size_human, ConfigFile};

use crate::error::CliError;
use crate::runner::resolve_config_path;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show disk cache statistics
    Stats,

    /// Remove expired tiles
    Purge {
        /// Also remove expired tiles still inside the stale retention window
        #[arg(long)]
        all_expired: bool,
    },

    /// Clear the disk cache, removing all cached tiles
    Clear,
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = ConfigFile::load_from(&resolve_config_path(config_path))?;
    let cache_dir = &config.cache.directory;

    match action {
        CacheAction::Stats => {
            let stats = disk_stats(cache_dir);
            println!("Disk cache: {}", cache_dir.display());
            println!("  Tiles: {}", stats.entries);
            println!("  Size:  {}", format_size_human(stats.bytes));
            println!("  Limit: {}", format_size(config.cache.max_size));
            Ok(())
        }
        CacheAction::Purge { all_expired } => {
            let retention = if all_expired {
                Duration::ZERO
            } else {
                config.cache.stale_retention
            };
            println!("Purging expired tiles in: {}", cache_dir.display());

            let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
            let result = runtime
                .block_on(async {
                    let store = DiskTileStore::start(
                        DiskStoreConfig::new(cache_dir)
                            .with_max_size(config.cache.max_size)
                            .with_maintenance_interval(Duration::ZERO)
                            .with_stale_retention(retention),
                    )
                    .await?;
                    let result = store.purge_expired().await;
                    store.close().await?;
                    result
                })
                .map_err(|e| CliError::Config(format!("cache purge failed: {}", e)))?;

            println!(
                "Removed {} tiles, freed {} in {}ms",
                result.entries_removed,
                format_size_human(result.bytes_freed),
                result.duration_ms
            );
            Ok(())
        }
        CacheAction::Clear => {
            println!("Clearing disk cache at: {}", cache_dir.display());
            let result = clear_directory(cache_dir);
            println!(
                "Deleted {} tiles, freed {}",
                result.entries_removed,
                format_size_human(result.bytes_freed)
            );
            Ok(())
        }
    }
}
