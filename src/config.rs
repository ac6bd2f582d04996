use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::bail;
use serde::Deserialize;

/// Widest look-back the vulnerability query accepts in one request.
pub const MAX_WINDOW_DAYS: u32 = 120;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Look-back windows in days, tried in order until one yields results
    #[serde(default = "default_window_ladder")]
    pub window_ladder: Vec<u32>,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub vulnerabilities: VulnerabilityConfig,
    #[serde(default)]
    pub news: Vec<FeedSource>,
    #[serde(default)]
    pub breach: Vec<FeedSource>,
}

fn default_refresh_interval() -> u64 {
    10
}

fn default_window_ladder() -> Vec<u32> {
    vec![1, 3, 7]
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

/// Feed-to-JSON conversion service settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ConversionConfig {
    #[serde(default = "default_conversion_endpoint")]
    pub endpoint: String,
    /// Name of the query parameter carrying the feed URL
    #[serde(default = "default_query_param")]
    pub query_param: String,
    #[serde(default = "default_feed_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_conversion_endpoint() -> String {
    "https://api.rss2json.com/v1/api.json".to_string()
}

fn default_query_param() -> String {
    "source".to_string()
}

fn default_feed_timeout_ms() -> u64 {
    5000
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_conversion_endpoint(),
            query_param: default_query_param(),
            timeout_ms: default_feed_timeout_ms(),
        }
    }
}

impl ConversionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VulnerabilityConfig {
    #[serde(default = "default_vulnerability_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_vulnerability_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_vulnerability_endpoint() -> String {
    "https://services.nvd.nist.gov/rest/json/cves/2.0".to_string()
}

// NVD is slow
fn default_vulnerability_timeout_ms() -> u64 {
    15000
}

impl Default for VulnerabilityConfig {
    fn default() -> Self {
        Self {
            endpoint: default_vulnerability_endpoint(),
            timeout_ms: default_vulnerability_timeout_ms(),
        }
    }
}

impl VulnerabilityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refresh_interval == 0 {
            bail!("refresh_interval must be at least one minute");
        }
        if self.window_ladder.is_empty() {
            bail!("window_ladder must contain at least one window");
        }
        if self.window_ladder[0] == 0 {
            bail!("window_ladder entries must be positive");
        }
        if let Some(&widest) = self.window_ladder.last() {
            if widest > MAX_WINDOW_DAYS {
                bail!(
                    "window_ladder entries must not exceed {} days, got {}",
                    MAX_WINDOW_DAYS,
                    widest
                );
            }
        }
        if self.window_ladder.windows(2).any(|pair| pair[0] >= pair[1]) {
            bail!(
                "window_ladder must be strictly increasing, got {:?}",
                self.window_ladder
            );
        }
        if self.conversion.timeout_ms == 0 || self.vulnerabilities.timeout_ms == 0 {
            bail!("timeouts must be positive");
        }
        check_unique_names("news", &self.news)?;
        check_unique_names("breach", &self.breach)?;
        Ok(())
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.saturating_mul(60))
    }
}

fn check_unique_names(list: &str, sources: &[FeedSource]) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for source in sources {
        if !seen.insert(source.name.as_str()) {
            bail!("duplicate {} source name '{}'", list, source.name);
        }
    }
    Ok(())
}
