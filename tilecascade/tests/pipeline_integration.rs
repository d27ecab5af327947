//! End-to-end tests for the assembled tile pipeline.
//!
//! These drive a real disk cache and the full provider chain
//! (assets → cache → archive → approximation → network) with a mock HTTP
//! client:
//! - one download per tile under concurrent demand
//! - cached tiles served without the network
//! - degraded mode when connectivity drops
//! - approximations delivered ahead of slow downloads
//! - downloads that outlive their subscribers or the pipeline
//!
//! Run with: `cargo test --test pipeline_integration`

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use tilecascade::cache::{disk_stats, CacheEntry, DiskStoreConfig, DiskTileStore, TileStore};
use tilecascade::network::{NetworkAvailability, NetworkMonitor, StaticAvailability};
use tilecascade::pipeline::{
    PipelineBuilder, PipelineConfig, ProviderArray, TileCallback, TileDelivery, TileResult,
};
use tilecascade::provider::testing::{quadrant_png, solid_png, MockHttpClient};
use tilecascade::provider::DirectoryArchive;
use tilecascade::source::TileSource;
use tilecascade::TileIndex;

// ============================================================================
// Helper Functions
// ============================================================================

const BLUE: [u8; 4] = [0, 0, 255, 255];
const RED: [u8; 4] = [255, 0, 0, 255];

fn test_source() -> TileSource {
    TileSource::builder("Test")
        .zoom_range(0, 18)
        .url_template("https://tiles.test/{z}/{x}/{y}.png")
        .build()
        .unwrap()
}

fn config(cache_dir: &TempDir) -> PipelineConfig {
    PipelineConfig::new(test_source()).with_cache_dir(cache_dir.path())
}

fn channel() -> (Arc<dyn TileCallback>, mpsc::UnboundedReceiver<TileDelivery>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = Arc::new(move |delivery: TileDelivery| {
        let _ = tx.send(delivery);
    });
    (callback, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<TileDelivery>) -> TileResult {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("delivery timed out")
        .expect("channel closed")
        .result
}

async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<TileDelivery>) {
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(!matches!(extra, Ok(Some(_))), "unexpected delivery");
}

async fn build(
    config: PipelineConfig,
    client: &Arc<MockHttpClient>,
    online: bool,
) -> ProviderArray {
    PipelineBuilder::new(config)
        .network(Arc::new(StaticAvailability(online)))
        .build_with_client(Arc::clone(client))
        .await
        .unwrap()
}

/// Opens the disk store and writes one tile into it.
async fn seed(dir: &TempDir, index: TileIndex, data: Bytes, fresh: bool) {
    let store = DiskTileStore::start(
        DiskStoreConfig::new(dir.path()).with_maintenance_interval(Duration::ZERO),
    )
    .await
    .unwrap();
    let expires_at = if fresh {
        Utc::now() + chrono::Duration::days(1)
    } else {
        Utc::now() - chrono::Duration::days(1)
    };
    store
        .put(CacheEntry::new(index, data, expires_at))
        .await
        .unwrap();
    store.close().await.unwrap();
}

/// Writes a tile file under `root` in the `{name}/{z}/{x}/{y}.png` layout.
fn write_tile_file(root: &Path, index: &TileIndex, data: &[u8]) {
    let path = root.join(test_source().relative_path(index));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
}

/// Waits until `condition` holds, failing after five seconds.
async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", what));
}

fn temp_files(dir: &Path) -> Vec<std::path::PathBuf> {
    glob::glob(&format!("{}/**/*.tmp", dir.display()))
        .unwrap()
        .flatten()
        .collect()
}

fn pixel(data: &Bytes, x: u32, y: u32) -> [u8; 4] {
    let image = image::load_from_memory(data).unwrap().to_rgba8();
    image.get_pixel(x, y).0
}

// ============================================================================
// Integration Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_demand_downloads_once() {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(
        MockHttpClient::with_body(solid_png(256, BLUE)).with_delay(Duration::from_millis(200)),
    );
    let pipeline = build(config(&dir), &client, true).await;
    let index = test_source().index(12, 100, 200);

    let mut receivers = Vec::new();
    for _ in 0..20 {
        let (callback, rx) = channel();
        pipeline.request_tile(index.clone(), callback).unwrap();
        receivers.push(rx);
    }

    for rx in &mut receivers {
        assert!(next(rx).await.is_exact());
    }
    assert_eq!(client.call_count(), 1);
    assert_eq!(
        client.requested_urls(),
        vec!["https://tiles.test/12/100/200.png".to_string()]
    );

    let stats = pipeline.stats();
    assert_eq!(stats.requests, 20);
    assert_eq!(stats.coalesced, 19);
    assert_eq!(stats.network_fetches, 1);

    pipeline.detach().await;
}

#[tokio::test]
async fn test_downloaded_tile_survives_restart_offline() {
    let dir = TempDir::new().unwrap();
    let index = test_source().index(8, 10, 20);

    let client = Arc::new(MockHttpClient::with_body(solid_png(256, BLUE)));
    let pipeline = build(config(&dir), &client, true).await;
    let (callback, mut rx) = channel();
    pipeline.request_tile(index.clone(), callback).unwrap();
    let downloaded = next(&mut rx).await;
    assert!(downloaded.is_exact());
    pipeline.detach().await;

    // Second run without connectivity must come from disk.
    let offline_client = Arc::new(MockHttpClient::with_body(solid_png(256, RED)));
    let pipeline = build(config(&dir), &offline_client, false).await;
    let (callback, mut rx) = channel();
    pipeline.request_tile(index, callback).unwrap();

    match next(&mut rx).await {
        TileResult::Exact(data) => assert_eq!(Some(&data), downloaded.bytes()),
        other => panic!("expected cached tile, got {:?}", other),
    }
    assert_eq!(offline_client.call_count(), 0);
    pipeline.detach().await;
}

#[tokio::test]
async fn test_fresh_cache_entry_wins_over_network() {
    let dir = TempDir::new().unwrap();
    let index = test_source().index(5, 3, 4);
    let cached = solid_png(256, RED);
    seed(&dir, index.clone(), cached.clone(), true).await;

    let client = Arc::new(MockHttpClient::with_body(solid_png(256, BLUE)));
    let pipeline = build(config(&dir), &client, true).await;
    let (callback, mut rx) = channel();
    pipeline.request_tile(index, callback).unwrap();

    assert_eq!(next(&mut rx).await, TileResult::Exact(cached));
    assert_silent(&mut rx).await;
    assert_eq!(client.call_count(), 0);
    pipeline.detach().await;
}

#[tokio::test]
async fn test_offline_without_cache_delivers_miss() {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(MockHttpClient::with_body(solid_png(256, BLUE)));
    let pipeline = build(config(&dir), &client, false).await;
    assert!(pipeline.is_degraded());

    let (callback, mut rx) = channel();
    pipeline
        .request_tile(test_source().index(6, 1, 1), callback)
        .unwrap();

    assert_eq!(next(&mut rx).await, TileResult::Miss);
    assert_eq!(client.call_count(), 0);
    pipeline.detach().await;
}

#[tokio::test]
async fn test_stale_entry_served_offline_as_approximation() {
    let dir = TempDir::new().unwrap();
    let index = test_source().index(7, 9, 9);
    let stale = solid_png(256, RED);
    seed(&dir, index.clone(), stale.clone(), false).await;

    let client = Arc::new(MockHttpClient::with_body(solid_png(256, BLUE)));
    let pipeline = build(config(&dir), &client, false).await;
    let (callback, mut rx) = channel();
    pipeline.request_tile(index, callback).unwrap();

    assert_eq!(next(&mut rx).await, TileResult::Approximate(stale));
    assert_silent(&mut rx).await;
    assert_eq!(client.call_count(), 0);
    pipeline.detach().await;
}

#[tokio::test]
async fn test_reconnect_resumes_downloads() {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(MockHttpClient::with_body(solid_png(256, BLUE)));
    let monitor = Arc::new(NetworkMonitor::new(false));
    let pipeline = PipelineBuilder::new(config(&dir))
        .network(Arc::clone(&monitor) as Arc<dyn NetworkAvailability>)
        .build_with_client(Arc::clone(&client))
        .await
        .unwrap();

    let (callback, mut rx) = channel();
    pipeline
        .request_tile(test_source().index(4, 2, 2), callback)
        .unwrap();
    assert_eq!(next(&mut rx).await, TileResult::Miss);

    monitor.set_available(true);
    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.is_degraded() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pipeline stayed degraded");

    let (callback, mut rx) = channel();
    pipeline
        .request_tile(test_source().index(4, 2, 2), callback)
        .unwrap();
    assert!(next(&mut rx).await.is_exact());
    assert_eq!(client.call_count(), 1);
    pipeline.detach().await;
}

/// A slow link: the parent tile is cached, the child is not. The caller
/// sees a scaled-up quadrant of the parent first, then the real tile.
#[tokio::test]
async fn test_lagging_network_gets_approximation_first() {
    let dir = TempDir::new().unwrap();
    let source = test_source();
    seed(&dir, source.index(9, 1, 1), quadrant_png(256), true).await;

    let lag = Duration::from_millis(500);
    let client = Arc::new(MockHttpClient::with_body(solid_png(256, BLUE)));
    let pipeline = build(config(&dir).with_lag(lag), &client, true).await;

    let started = Instant::now();
    let (callback, mut rx) = channel();
    // (2, 2) at zoom 10 is the top-left quadrant of (1, 1) at zoom 9.
    pipeline
        .request_tile(source.index(10, 2, 2), callback)
        .unwrap();

    match next(&mut rx).await {
        TileResult::Approximate(data) => {
            assert!(started.elapsed() < lag);
            assert_eq!(pixel(&data, 0, 0), RED);
            assert_eq!(pixel(&data, 255, 255), RED);
        }
        other => panic!("expected approximation, got {:?}", other),
    }

    match next(&mut rx).await {
        TileResult::Exact(data) => {
            assert!(started.elapsed() >= lag);
            assert_eq!(pixel(&data, 128, 128), BLUE);
        }
        other => panic!("expected exact tile, got {:?}", other),
    }
    assert_silent(&mut rx).await;

    let stats = pipeline.stats();
    assert_eq!(stats.approximate_deliveries, 1);
    assert_eq!(stats.exact_deliveries, 1);
    pipeline.detach().await;
}

#[tokio::test]
async fn test_cancelled_request_still_populates_cache() {
    let dir = TempDir::new().unwrap();
    let index = test_source().index(11, 7, 7);
    let client = Arc::new(
        MockHttpClient::with_body(solid_png(256, BLUE)).with_delay(Duration::from_millis(100)),
    );
    let pipeline = build(config(&dir), &client, true).await;

    let (callback, mut rx) = channel();
    let handle = pipeline.request_tile(index.clone(), callback).unwrap();
    assert!(pipeline.cancel(&handle));

    wait_for("the download to be cached", || {
        disk_stats(dir.path()).entries == 1
    })
    .await;
    assert!(rx.try_recv().is_err());
    assert_eq!(client.call_count(), 1);
    pipeline.detach().await;

    let store = DiskTileStore::start(DiskStoreConfig::new(dir.path()))
        .await
        .unwrap();
    let entry = store.get(&index).await.unwrap();
    assert!(entry.is_some(), "download should have been written through");
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_detach_waits_for_started_download() {
    let dir = TempDir::new().unwrap();
    let index = test_source().index(11, 8, 8);
    let client = Arc::new(
        MockHttpClient::with_body(solid_png(256, BLUE)).with_delay(Duration::from_millis(300)),
    );
    let pipeline = build(config(&dir), &client, true).await;

    let (callback, mut rx) = channel();
    pipeline.request_tile(index.clone(), callback).unwrap();
    wait_for("the download to start", || client.call_count() == 1).await;

    pipeline.detach().await;

    // No delivery after detach, but the tile reached the disk intact
    assert!(rx.try_recv().is_err());
    assert_eq!(pipeline.stats().exact_deliveries, 0);
    assert!(temp_files(dir.path()).is_empty());

    let store = DiskTileStore::start(DiskStoreConfig::new(dir.path()))
        .await
        .unwrap();
    assert!(store.get(&index).await.unwrap().is_some());
    store.close().await.unwrap();
}

/// Offline with only the parent tile cached: the child is served as a
/// scaled-up quadrant and the network is never touched.
#[tokio::test]
async fn test_offline_approximation_from_cached_ancestor() {
    let dir = TempDir::new().unwrap();
    let source = test_source();
    seed(&dir, source.index(9, 1, 1), quadrant_png(256), true).await;

    let client = Arc::new(MockHttpClient::with_body(solid_png(256, BLUE)));
    let pipeline = build(config(&dir), &client, false).await;

    let (callback, mut rx) = channel();
    pipeline
        .request_tile(source.index(10, 2, 2), callback)
        .unwrap();

    match next(&mut rx).await {
        TileResult::Approximate(data) => {
            assert_eq!(pixel(&data, 0, 0), RED);
            assert_eq!(pixel(&data, 255, 255), RED);
        }
        other => panic!("expected approximation, got {:?}", other),
    }
    assert_silent(&mut rx).await;
    assert_eq!(client.call_count(), 0);

    let stats = pipeline.stats();
    assert_eq!(stats.approximate_deliveries, 1);
    assert_eq!(stats.misses, 0);
    pipeline.detach().await;
}

#[tokio::test]
async fn test_bundled_asset_ancestor_feeds_approximation() {
    let dir = TempDir::new().unwrap();
    let assets = TempDir::new().unwrap();
    let source = test_source();
    write_tile_file(assets.path(), &source.index(9, 1, 1), &quadrant_png(256));

    let client = Arc::new(MockHttpClient::with_body(solid_png(256, BLUE)));
    let pipeline = build(
        config(&dir).with_assets_dir(assets.path()),
        &client,
        false,
    )
    .await;

    let (callback, mut rx) = channel();
    pipeline
        .request_tile(source.index(10, 2, 2), callback)
        .unwrap();

    match next(&mut rx).await {
        TileResult::Approximate(data) => assert_eq!(pixel(&data, 128, 128), RED),
        other => panic!("expected approximation, got {:?}", other),
    }
    assert_silent(&mut rx).await;
    assert_eq!(client.call_count(), 0);
    pipeline.detach().await;
}

#[tokio::test]
async fn test_archives_serve_tiles_offline() {
    let dir = TempDir::new().unwrap();
    let registered = TempDir::new().unwrap();
    let configured = TempDir::new().unwrap();
    let source = test_source();
    let shared = source.index(6, 3, 3);
    let only_configured = source.index(6, 4, 4);

    let red = solid_png(256, RED);
    let blue = solid_png(256, BLUE);
    write_tile_file(registered.path(), &shared, &red);
    write_tile_file(configured.path(), &shared, &blue);
    write_tile_file(configured.path(), &only_configured, &blue);

    let client = Arc::new(MockHttpClient::with_body(solid_png(256, BLUE)));
    let pipeline = PipelineBuilder::new(config(&dir).with_archive_tile_dir(configured.path()))
        .network(Arc::new(StaticAvailability(false)))
        .archive(Box::new(DirectoryArchive::new(
            registered.path(),
            Arc::new(source.clone()),
        )))
        .build_with_client(Arc::clone(&client))
        .await
        .unwrap();

    // Archives registered on the builder come before configured trees
    let (callback, mut rx) = channel();
    pipeline.request_tile(shared, callback).unwrap();
    assert_eq!(next(&mut rx).await, TileResult::Exact(red));

    let (callback, mut rx) = channel();
    pipeline.request_tile(only_configured, callback).unwrap();
    assert_eq!(next(&mut rx).await, TileResult::Exact(blue));

    assert_eq!(client.call_count(), 0);
    pipeline.detach().await;
}

#[tokio::test]
async fn test_detached_pipeline_rejects_requests() {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(MockHttpClient::with_body(solid_png(256, BLUE)));
    let pipeline = build(config(&dir), &client, true).await;

    pipeline.detach().await;
    pipeline.detach().await;

    let (callback, _rx) = channel();
    assert!(pipeline
        .request_tile(test_source().index(1, 0, 0), callback)
        .is_err());
}
