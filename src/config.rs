use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/75.0.3770.100 Safari/537.36";
pub const DEFAULT_STORAGE_DIR: &str = "images";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    pub user_agent: String,
    /// Extra attempts after the first one, only for timeouts.
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl FetchConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Upper bound on wall time spent fetching one image.
    pub fn worst_case_wait(&self) -> Duration {
        self.timeout.saturating_mul(self.max_attempts())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Bmp => "bmp",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Bmp => image::ImageFormat::Bmp,
        }
    }

    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub fetch: FetchConfig,
    /// Case-sensitive format labels accepted on input, e.g. `"PNG"`.
    pub allowed_formats: Vec<String>,
    pub storage_dir: PathBuf,
    pub output_format: OutputFormat,
    pub concurrent_fetch: bool,
    pub public_base_url: Option<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            allowed_formats: vec!["PNG".to_owned()],
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            output_format: OutputFormat::Png,
            concurrent_fetch: false,
            public_base_url: None,
        }
    }
}

impl MergeConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parse config '{}'", path.display()))
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overrides fields from `IMGMERGE_*` environment variables.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(dir) = get("IMGMERGE_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(url) = get("IMGMERGE_BASE_URL") {
            self.public_base_url = Some(url);
        }
        if let Some(secs) = get("IMGMERGE_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("IMGMERGE_TIMEOUT_SECS='{secs}' is not an integer"))?;
            self.fetch.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = get("IMGMERGE_MAX_RETRIES") {
            self.fetch.max_retries = n
                .trim()
                .parse()
                .with_context(|| format!("IMGMERGE_MAX_RETRIES='{n}' is not an integer"))?;
        }
        self.validate()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.allowed_formats.is_empty() {
            anyhow::bail!("allowed_formats must name at least one format");
        }
        if self.fetch.timeout.is_zero() {
            anyhow::bail!("fetch timeout must be > 0");
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
