//! Assembles the standard provider chain from a [`PipelineConfig`].

use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::info;

use super::array::ProviderArray;
use super::config::{PipelineConfig, DEFAULT_MEMORY_CACHE_SIZE};
use crate::cache::{DiskStoreConfig, DiskTileStore, MemoryTileStore, StoreError, TileStore};
use crate::network::{NetworkAvailability, NetworkMonitor};
use crate::provider::{
    discover_archives, ApproximationProvider, ArchiveError, ArchiveProvider, AssetsProvider,
    AsyncHttpClient, AsyncReqwestClient, CacheModule, DirectoryArchive, NetworkDownloader,
    ProviderError, TileArchive, TileModule,
};

/// Errors while assembling a pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No tokio runtime available; call from within a runtime or set one explicitly")]
    NoRuntime,

    #[error("Failed to open tile store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to open archives: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] ProviderError),
}

/// Builds a [`ProviderArray`] with the chain
/// assets → cache → archive → approximation → network.
///
/// Modules whose backing resource is not configured are left out.
pub struct PipelineBuilder {
    config: PipelineConfig,
    network: Option<Arc<dyn NetworkAvailability>>,
    store: Option<Arc<dyn TileStore>>,
    archives: Vec<Box<dyn TileArchive>>,
    runtime: Option<Handle>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            network: None,
            store: None,
            archives: Vec::new(),
            runtime: None,
        }
    }

    /// Connectivity signal. Defaults to an always-online [`NetworkMonitor`].
    pub fn network(mut self, network: Arc<dyn NetworkAvailability>) -> Self {
        self.network = Some(network);
        self
    }

    /// Uses `store` instead of opening one from the configuration.
    pub fn store(mut self, store: Arc<dyn TileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Registers an archive ahead of the configured tile trees and any
    /// archive discovered in the archive directory.
    pub fn archive(mut self, archive: Box<dyn TileArchive>) -> Self {
        self.archives.push(archive);
        self
    }

    /// Runtime for worker tasks. Defaults to the current runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Builds the pipeline with a reqwest client.
    pub async fn build(self) -> Result<ProviderArray, BuildError> {
        let client =
            AsyncReqwestClient::with_settings(self.config.network_timeout, &self.config.user_agent)?;
        self.build_with_client(client).await
    }

    /// Builds the pipeline with a custom HTTP client.
    pub async fn build_with_client<C>(self, client: C) -> Result<ProviderArray, BuildError>
    where
        C: AsyncHttpClient + 'static,
    {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };
        let config = self.config;
        let source = Arc::new(config.source.clone());

        let store: Arc<dyn TileStore> = match (self.store, &config.cache_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => {
                let disk = DiskStoreConfig::new(dir)
                    .with_max_size(config.cache_max_size)
                    .with_maintenance_interval(config.purge_interval)
                    .with_stale_retention(config.stale_retention);
                DiskTileStore::start(disk).await?
            }
            (None, None) => Arc::new(MemoryTileStore::new(DEFAULT_MEMORY_CACHE_SIZE)),
        };

        let mut chain: Vec<Arc<dyn TileModule>> = Vec::new();

        let assets: Option<Arc<dyn TileModule>> = config
            .assets_dir
            .as_ref()
            .map(|dir| Arc::new(AssetsProvider::new(Arc::clone(&source), dir)) as _);
        if let Some(assets) = &assets {
            chain.push(Arc::clone(assets));
        }

        let cache: Arc<dyn TileModule> = Arc::new(CacheModule::new(Arc::clone(&store)));
        chain.push(Arc::clone(&cache));

        let mut archives = self.archives;
        for dir in &config.archive_tile_dirs {
            archives.push(Box::new(DirectoryArchive::new(dir, Arc::clone(&source))));
        }
        if let Some(dir) = &config.archive_dir {
            archives.extend(discover_archives(dir)?);
        }
        let archive: Option<Arc<dyn TileModule>> = if archives.is_empty() {
            None
        } else {
            Some(Arc::new(ArchiveProvider::new(archives)))
        };
        if let Some(archive) = &archive {
            chain.push(Arc::clone(archive));
        }

        if config.approximation_enabled && config.max_approximation_depth > 0 {
            let mut sources: Vec<Arc<dyn TileModule>> = assets.into_iter().collect();
            sources.push(cache);
            sources.extend(archive);
            chain.push(Arc::new(ApproximationProvider::new(
                Arc::clone(&source),
                sources,
                config.max_approximation_depth,
            )));
        }

        if !source.is_offline() {
            chain.push(Arc::new(NetworkDownloader::new(
                Arc::clone(&source),
                client,
                Some(store),
                config.downloader_config(),
            )));
        }

        let network = self
            .network
            .unwrap_or_else(|| Arc::new(NetworkMonitor::default()));

        info!(
            source = source.name(),
            cache_dir = ?config.cache_dir,
            lag_ms = config.lag.as_millis() as u64,
            "Tile pipeline assembled"
        );

        Ok(ProviderArray::new(
            chain,
            network,
            config.use_data_connection,
            runtime,
        ))
    }
}
