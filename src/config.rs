use crate::filter::FilterConfig;
use crate::gateway::{Exchange, GatewayOptions};
use crate::model::Timeframe;
use crate::scanner::ScanSettings;
use anyhow::Context;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

// CONFIGURATION STRUCTS

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KlineConfig {
    pub interval: Timeframe, // e.g. "1d"
    pub lookback_days: u32,  // e.g. 90
}

impl Default for KlineConfig {
    fn default() -> Self {
        Self {
            interval: Timeframe::OneDay,
            lookback_days: 90,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
    /// Overrides the exchange's published request budget.
    pub requests_per_minute: Option<u32>,
    pub base_url: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            request_timeout_secs: 10,
            requests_per_minute: None,
            base_url: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub exchange: Exchange,
    pub quote_asset: String, // e.g. "USDT"
    pub klines: KlineConfig,
    pub filters: FilterConfig,
    pub network: NetworkConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: Exchange::Binance,
            quote_asset: "USDT".to_string(),
            klines: KlineConfig::default(),
            filters: FilterConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            base_url: self.network.base_url.clone(),
            quote_asset: self.quote_asset.clone(),
            request_timeout: Duration::from_secs(self.network.request_timeout_secs.max(1)),
            requests_per_minute: self.network.requests_per_minute,
        }
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            timeframe: self.klines.interval,
            lookback_days: self.klines.lookback_days,
            max_concurrency: self.network.max_concurrency.max(1),
        }
    }
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Absolute path to the storage directory (e.g. ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Creates a manager rooted at `relative_path` next to the running executable.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        // 1. Locate the running executable
        let exe_path = std::env::current_exe()?;
        // 2. Resolve the storage directory beside it
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::new(base_dir).await
    }

    pub async fn new(base_dir: PathBuf) -> anyhow::Result<Self> {
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir)
                .await
                .with_context(|| format!("creating {}", base_dir.display()))?;
        }
        Ok(Self { base_dir })
    }

    /// Serializes `data` to `<filename>.json`.
    /// Writes to a `.tmp` file first, then renames, so a crash never leaves a half-written file.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let file_name = format!("{}.json", filename);
        let final_path = self.base_dir.join(&file_name);
        let tmp_path = self.base_dir.join(format!("{}.tmp", file_name));

        // 1. Write the full payload to the temp file
        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        // 2. Atomically swap it into place
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));
        // serde_json validates UTF-8 itself, so read raw bytes
        let content = fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let data = serde_json::from_slice(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(data)
    }

    /// Loads `<filename>.json`, writing `T::default()` there first if it does not exist.
    pub async fn load_or_init<T>(&self, filename: &str) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let path = self.base_dir.join(format!("{}.json", filename));
        if !fs::try_exists(&path).await? {
            info!(path = %path.display(), "writing default configuration");
            self.save(filename, &T::default()).await?;
        }
        self.load(filename).await
    }
}
