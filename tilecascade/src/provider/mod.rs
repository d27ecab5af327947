//! Tile provider modules.
//!
//! Each stage of the provider chain implements [`TileModule`]:
//!
//! | Module | Kind | Writes | Network |
//! |---|---|---|---|
//! | [`AssetsProvider`] | Assets | no | no |
//! | [`CacheModule`] | Cache | no | no |
//! | [`ArchiveProvider`] | Archive | no | no |
//! | [`ApproximationProvider`] | Approximation | no | no |
//! | [`NetworkDownloader`] | Network | tile store | yes |
//!
//! The orchestrator in [`crate::pipeline`] walks them in that order.

mod approximation;
mod archive;
mod assets;
mod downloader;
mod http;
mod store;
pub mod testing;
mod types;

pub use approximation::{crop_and_scale, ApproximationProvider, DEFAULT_MAX_DEPTH};
pub use archive::{
    discover_archives, ArchiveError, ArchiveProvider, DirectoryArchive, MbTilesArchive,
    TileArchive,
};
pub use assets::AssetsProvider;
pub use downloader::{
    DownloaderConfig, NetworkDownloader, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_CONCURRENT_DOWNLOADS,
};
pub use http::{AsyncHttpClient, AsyncReqwestClient, HttpResponse, DEFAULT_USER_AGENT};
pub use store::CacheModule;
pub use types::{Lookup, ModuleKind, ProviderError, TileModule};
