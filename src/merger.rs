use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use base64::Engine as _;
use image::RgbaImage;
use serde::Serialize;

use crate::{
    composite::composite,
    config::MergeConfig,
    error::{DomainError, DomainResult, ErrorKind, FetchError},
    fetch::{Fetcher, HttpTransport, Transport},
    image_ref::ImageRef,
    persist::Persister,
    validate::{dimensions_equal, is_supported_format, is_valid_url},
};

/// Route under which persisted outputs are served, relative to a public base URL.
pub const IMAGE_ROUTE: &str = "image";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeRequest {
    foreground_url: String,
    background_url: String,
}

impl MergeRequest {
    pub fn new(foreground_url: impl Into<String>, background_url: impl Into<String>) -> Self {
        Self {
            foreground_url: foreground_url.into(),
            background_url: background_url.into(),
        }
    }

    pub fn foreground_url(&self) -> &str {
        &self.foreground_url
    }

    pub fn background_url(&self) -> &str {
        &self.background_url
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeState {
    Idle,
    Validating,
    Fetching,
    Compositing,
    Persisting,
    Done,
    Failed(ErrorKind),
}

impl MergeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

#[derive(Clone, Debug)]
pub struct MergeResult {
    name: String,
    path: PathBuf,
    image: RgbaImage,
    bytes: Vec<u8>,
}

impl MergeResult {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Serialized output in its persisted format.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{IMAGE_ROUTE}/{}",
            base_url.trim_end_matches('/'),
            self.name
        )
    }

    pub fn response(&self, base_url: Option<&str>) -> MergeResponse {
        MergeResponse {
            name: self.name.clone(),
            url: base_url.map(|b| self.url(b)),
            base64: self.base64(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergeResponse {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub base64: String,
}

/// Runs one foreground-over-background merge and holds its outcome.
pub struct Merger {
    foreground_url: Option<String>,
    background_url: Option<String>,
    fetcher: Fetcher,
    persister: Persister,
    allowed_formats: Vec<String>,
    concurrent_fetch: bool,
    state: MergeState,
    result: Option<MergeResult>,
}

impl std::fmt::Debug for Merger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merger")
            .field("foreground_url", &self.foreground_url)
            .field("background_url", &self.background_url)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Merger {
    pub fn new(config: &MergeConfig) -> DomainResult<Self> {
        let transport = HttpTransport::new(&config.fetch).map_err(|e| {
            tracing::warn!(error = %e, "build http client");
            DomainError::internal()
        })?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &MergeConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            foreground_url: None,
            background_url: None,
            fetcher: Fetcher::with_transport(transport, config.fetch.clone()),
            persister: Persister::new(&config.storage_dir, config.output_format),
            allowed_formats: config.allowed_formats.clone(),
            concurrent_fetch: config.concurrent_fetch,
            state: MergeState::Idle,
            result: None,
        }
    }

    pub fn with_request(mut self, request: &MergeRequest) -> Self {
        self.set_foreground(request.foreground_url());
        self.set_background(request.background_url());
        self
    }

    pub fn set_foreground(&mut self, url: impl Into<String>) {
        self.foreground_url = Some(url.into());
        self.reset();
    }

    pub fn set_background(&mut self, url: impl Into<String>) {
        self.background_url = Some(url.into());
        self.reset();
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    pub fn result(&self) -> Option<&MergeResult> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Option<MergeResult> {
        self.result
    }

    #[tracing::instrument(
        skip(self),
        fields(fg = self.foreground_url.as_deref(), bg = self.background_url.as_deref())
    )]
    pub fn merge(&mut self) -> DomainResult<&MergeResult> {
        self.reset();
        match self.run() {
            Ok(result) => {
                self.state = MergeState::Done;
                let result: &MergeResult = self.result.insert(result);
                Ok(result)
            }
            Err(err) => {
                tracing::debug!(kind = %err.kind(), state = ?self.state, "merge failed");
                self.state = MergeState::Failed(err.kind());
                Err(err)
            }
        }
    }

    fn reset(&mut self) {
        self.state = MergeState::Idle;
        self.result = None;
    }

    fn run(&mut self) -> DomainResult<MergeResult> {
        let (Some(fg_url), Some(bg_url)) =
            (self.foreground_url.clone(), self.background_url.clone())
        else {
            return Err(DomainError::invalid_url());
        };

        self.state = MergeState::Validating;
        for url in [&fg_url, &bg_url] {
            if !is_valid_url(url) {
                return Err(DomainError::invalid_url());
            }
        }

        self.state = MergeState::Fetching;
        let (foreground, background) = self.fetch_pair(&fg_url, &bg_url)?;

        for (side, img) in [("foreground", &foreground), ("background", &background)] {
            if !is_supported_format(img, &self.allowed_formats) {
                tracing::warn!(side, format = ?img.format(), "format not allowed");
                return Err(DomainError::unsupported_format());
            }
        }
        if !dimensions_equal(&foreground, &background) {
            tracing::warn!(
                fg = ?foreground.dimensions(),
                bg = ?background.dimensions(),
                "image sizes differ"
            );
            return Err(DomainError::size_mismatch());
        }

        self.state = MergeState::Compositing;
        let image = composite(&foreground, &background)?;
        drop((foreground, background));

        self.state = MergeState::Persisting;
        let saved = self.persister.persist(&image)?;

        Ok(MergeResult {
            name: saved.name,
            path: saved.path,
            image,
            bytes: saved.bytes,
        })
    }

    fn fetch_pair(&self, fg_url: &str, bg_url: &str) -> Result<(ImageRef, ImageRef), FetchError> {
        if self.concurrent_fetch {
            let (fg, bg) = rayon::join(
                || self.fetcher.fetch(fg_url),
                || self.fetcher.fetch(bg_url),
            );
            return Ok((fg?, bg?));
        }
        let fg = self.fetcher.fetch(fg_url)?;
        let bg = self.fetcher.fetch(bg_url)?;
        Ok((fg, bg))
    }
}

/// One-shot merge over HTTP using `config`.
pub fn merge(
    foreground_url: &str,
    background_url: &str,
    config: &MergeConfig,
) -> DomainResult<MergeResult> {
    let merger = Merger::new(config)?;
    run_once(merger, foreground_url, background_url)
}

pub fn merge_with_transport(
    foreground_url: &str,
    background_url: &str,
    config: &MergeConfig,
    transport: Arc<dyn Transport>,
) -> DomainResult<MergeResult> {
    run_once(
        Merger::with_transport(config, transport),
        foreground_url,
        background_url,
    )
}

fn run_once(mut merger: Merger, fg: &str, bg: &str) -> DomainResult<MergeResult> {
    merger.set_foreground(fg);
    merger.set_background(bg);
    merger.merge()?;
    merger.into_result().ok_or_else(DomainError::internal)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        io::Cursor,
        sync::atomic::{AtomicU32, Ordering},
    };

    use image::{DynamicImage, ImageFormat, Rgba};

    use super::*;
    use crate::fetch::TransportError;

    #[derive(Default)]
    struct MapTransport {
        bodies: HashMap<String, Vec<u8>>,
        calls: AtomicU32,
    }

    impl Transport for MapTransport {
        fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies
                .get(url)
                .cloned()
                .ok_or(TransportError::Status(404))
        }
    }

    fn png(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(px)))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn config(name: &str) -> MergeConfig {
        MergeConfig {
            storage_dir: std::env::temp_dir().join(format!(
                "imgmerge_merger_{name}_{}_{}",
                std::process::id(),
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap()
                    .as_nanos()
            )),
            ..MergeConfig::default()
        }
    }

    #[test]
    fn starts_idle_and_requires_both_urls() {
        let cfg = config("requires_both");
        let mut m = Merger::with_transport(&cfg, Arc::new(MapTransport::default()));
        assert_eq!(m.state(), MergeState::Idle);

        m.set_foreground("http://a/fg.png");
        let err = m.merge().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidUrl);
        assert_eq!(m.state(), MergeState::Failed(ErrorKind::InvalidUrl));
    }

    #[test]
    fn done_state_holds_result_and_setters_reset() {
        let cfg = config("done_state");
        let mut t = MapTransport::default();
        t.bodies.insert("http://a/fg.png".into(), png(2, 2, [255, 0, 0, 255]));
        t.bodies.insert("http://a/bg.png".into(), png(2, 2, [0, 0, 255, 255]));

        let mut m = Merger::with_transport(&cfg, Arc::new(t))
            .with_request(&MergeRequest::new("http://a/fg.png", "http://a/bg.png"));
        let name = m.merge().unwrap().name().to_owned();
        assert_eq!(m.state(), MergeState::Done);
        assert!(m.state().is_terminal());
        assert_eq!(m.result().unwrap().name(), name);
        assert!(m.result().unwrap().path().is_file());

        m.set_background("ftp://nope");
        assert_eq!(m.state(), MergeState::Idle);
        assert!(m.result().is_none());

        std::fs::remove_dir_all(&cfg.storage_dir).ok();
    }

    #[test]
    fn invalid_background_url_is_rejected_before_any_fetch() {
        let cfg = config("invalid_bg");
        let t = Arc::new(MapTransport::default());
        let err =
            merge_with_transport("http://a/fg.png", "a/bg.png", &cfg, t.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidUrl);
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_image_maps_to_fetch_failed() {
        let cfg = config("missing");
        let err = merge_with_transport(
            "http://a/fg.png",
            "http://a/bg.png",
            &cfg,
            Arc::new(MapTransport::default()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FetchFailed);
        assert_eq!(err.message(), "Images not found. Please check image urls");
    }

    #[test]
    fn concurrent_fetch_produces_same_pixels() {
        let mut cfg = config("concurrent");
        cfg.concurrent_fetch = true;
        let mut t = MapTransport::default();
        t.bodies.insert("http://a/fg.png".into(), png(3, 3, [10, 20, 30, 255]));
        t.bodies.insert("http://a/bg.png".into(), png(3, 3, [0, 0, 0, 255]));

        let out = merge_with_transport("http://a/fg.png", "http://a/bg.png", &cfg, Arc::new(t))
            .unwrap();
        assert!(out.image().pixels().all(|p| p.0 == [10, 20, 30, 255]));
        std::fs::remove_dir_all(&cfg.storage_dir).ok();
    }

    #[test]
    fn url_and_response_shape() {
        let cfg = config("response");
        let mut t = MapTransport::default();
        t.bodies.insert("http://a/fg.png".into(), png(1, 1, [0, 0, 0, 0]));
        t.bodies.insert("http://a/bg.png".into(), png(1, 1, [1, 1, 1, 255]));
        let out = merge_with_transport("http://a/fg.png", "http://a/bg.png", &cfg, Arc::new(t))
            .unwrap();

        assert_eq!(
            out.url("http://localhost:5000/"),
            format!("http://localhost:5000/image/{}", out.name())
        );
        let resp = out.response(Some("http://localhost:5000"));
        assert_eq!(resp.name, out.name());
        assert_eq!(resp.base64, out.base64());
        let json = serde_json::to_value(out.response(None)).unwrap();
        assert!(json.get("url").is_none());

        std::fs::remove_dir_all(&cfg.storage_dir).ok();
    }
}
