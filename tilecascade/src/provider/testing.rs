//! Test doubles for the provider chain.
//!
//! Public so integration tests can drive a full pipeline without a
//! network.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;

use super::http::{AsyncHttpClient, HttpResponse};
use super::types::ProviderError;

/// Mock HTTP client with call counting, latency and per-URL responses.
pub struct MockHttpClient {
    default_response: Result<HttpResponse, ProviderError>,
    responses: Mutex<HashMap<String, Result<HttpResponse, ProviderError>>>,
    delay: Duration,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl MockHttpClient {
    /// Answers every request with `body`.
    pub fn with_body(body: impl Into<Bytes>) -> Self {
        Self::new(Ok(HttpResponse::from_body(body)))
    }

    /// Fails every request with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::new(Err(error))
    }

    fn new(default_response: Result<HttpResponse, ProviderError>) -> Self {
        Self {
            default_response,
            responses: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Delays every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Overrides the response for one URL.
    pub fn respond(&self, url: impl Into<String>, response: Result<HttpResponse, ProviderError>) {
        self.responses.lock().insert(url.into(), response);
    }

    /// Number of GETs issued so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs requested so far, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

impl AsyncHttpClient for MockHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self.responses.lock().get(url).cloned();
        response.unwrap_or_else(|| self.default_response.clone())
    }
}

/// Encodes a solid-colour square PNG.
pub fn solid_png(size: u32, color: [u8; 4]) -> Bytes {
    let image = RgbaImage::from_pixel(size, size, Rgba(color));
    encode_png(image)
}

/// Encodes a PNG whose four quadrants have distinct colours:
/// top-left red, top-right green, bottom-left blue, bottom-right white.
pub fn quadrant_png(size: u32) -> Bytes {
    let half = size / 2;
    let image = RgbaImage::from_fn(size, size, |x, y| match (x < half, y < half) {
        (true, true) => Rgba([255, 0, 0, 255]),
        (false, true) => Rgba([0, 255, 0, 255]),
        (true, false) => Rgba([0, 0, 255, 255]),
        (false, false) => Rgba([255, 255, 255, 255]),
    });
    encode_png(image)
}

fn encode_png(image: RgbaImage) -> Bytes {
    let mut out = Cursor::new(Vec::new());
    // Encoding an in-memory RGBA buffer cannot fail
    let _ = image.write_to(&mut out, ImageFormat::Png);
    Bytes::from(out.into_inner())
}
