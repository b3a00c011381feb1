// src/config/mod.rs
//! Runtime configuration: `config/monitor.toml` plus env overrides.
//!
//! Everything the pipeline needs is carried in one [`MonitorConfig`] value that
//! is handed to [`crate::pipeline::Monitor::from_config`]. A missing config file
//! is not an error; the built-in defaults watch the three SEC sources.

pub mod ai;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::Source;
use ai::ClassifierConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";
pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const ENV_USER_AGENT: &str = "MONITOR_USER_AGENT";
pub const ENV_DATA_PATH: &str = "MONITOR_DATA_PATH";
pub const ENV_INTERVAL_HOURS: &str = "PIPELINE_INTERVAL_HOURS";
pub const ENV_CLASSIFY_MODE: &str = "MONITOR_CLASSIFY_MODE";

// sec.gov rejects automated requests that do not identify themselves.
const DEFAULT_USER_AGENT: &str = "sec-monitor/1.0 contact@example.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            accept_language: "en-US,en;q=0.5".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    pub source: Source,
}

fn default_page_source() -> Source {
    Source::OpenMeeting
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    pub url: String,
    #[serde(default = "default_page_source")]
    pub source: Source,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("items.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_hours: u64,
    /// Run once at startup, but only while the store is still empty.
    pub run_on_startup_if_empty: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: 4,
            run_on_startup_if_empty: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub http: HttpConfig,
    pub feeds: Vec<FeedConfig>,
    pub page: Option<PageConfig>,
    pub store: StoreConfig,
    pub classifier: ClassifierConfig,
    pub schedule: ScheduleConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            feeds: vec![
                FeedConfig {
                    url: "https://www.sec.gov/news/pressreleases.rss".to_string(),
                    source: Source::PressRelease,
                },
                FeedConfig {
                    url: "https://www.sec.gov/enforcement-litigation/litigation-releases/rss"
                        .to_string(),
                    source: Source::LitigationRelease,
                },
            ],
            page: Some(PageConfig {
                url: "https://www.sec.gov/news/upcoming-events".to_string(),
                source: Source::OpenMeeting,
                enabled: true,
            }),
            store: StoreConfig::default(),
            classifier: ClassifierConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Parse a TOML file, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading monitor config from {}", path.display()))?;
        let cfg: MonitorConfig = toml::from_str(&content)
            .with_context(|| format!("parsing monitor config {}", path.display()))?;
        cfg.with_env_overrides()
    }

    /// Resolve the config using env var + fallbacks:
    /// 1) $MONITOR_CONFIG_PATH (must exist)
    /// 2) config/monitor.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        MonitorConfig::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(ua) = non_empty_env(ENV_USER_AGENT) {
            self.http.user_agent = ua;
        }
        if let Some(p) = non_empty_env(ENV_DATA_PATH) {
            self.store.path = PathBuf::from(p);
        }
        if let Some(h) = non_empty_env(ENV_INTERVAL_HOURS) {
            self.schedule.interval_hours = h
                .parse()
                .with_context(|| format!("{ENV_INTERVAL_HOURS} must be a whole number of hours"))?;
        }
        if let Some(m) = non_empty_env(ENV_CLASSIFY_MODE) {
            self.classifier.mode = m.parse()?;
        }

        self.schedule.interval_hours = self.schedule.interval_hours.max(1);
        self.http.timeout_secs = self.http.timeout_secs.max(1);
        self.classifier.max_concurrency = self.classifier.max_concurrency.max(1);
        if self.http.user_agent.trim().is_empty() {
            return Err(anyhow!("http.user_agent must not be empty"));
        }
        Ok(self)
    }

    /// The page source, if one is configured and enabled.
    pub fn active_page(&self) -> Option<&PageConfig> {
        self.page.as_ref().filter(|p| p.enabled)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ClassifyMode;
    use std::env;

    fn clear_env() {
        for k in [
            ENV_CONFIG_PATH,
            ENV_USER_AGENT,
            ENV_DATA_PATH,
            ENV_INTERVAL_HOURS,
            ENV_CLASSIFY_MODE,
        ] {
            env::remove_var(k);
        }
    }

    #[test]
    fn defaults_watch_the_three_sec_sources() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.feeds.len(), 2);
        assert_eq!(cfg.feeds[0].source, Source::PressRelease);
        assert_eq!(cfg.active_page().unwrap().source, Source::OpenMeeting);
        assert_eq!(cfg.schedule.interval_hours, 4);
    }

    #[serial_test::serial]
    #[test]
    fn toml_file_is_parsed_and_env_overrides_apply() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("monitor.toml");
        fs::write(
            &p,
            r#"
[http]
user_agent = "acme-monitor/2.0 ops@acme.test"

[[feeds]]
url = "https://feeds.test/speeches.rss"
source = "speech"

[page]
url = "https://pages.test/events"
enabled = false

[store]
path = "data/items.json"
"#,
        )
        .unwrap();

        let cfg = MonitorConfig::load_from(&p).unwrap();
        assert_eq!(cfg.http.user_agent, "acme-monitor/2.0 ops@acme.test");
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.feeds[0].source, Source::Other("speech".into()));
        assert!(cfg.active_page().is_none());
        assert_eq!(cfg.store.path, PathBuf::from("data/items.json"));
        assert_eq!(cfg.http.timeout_secs, 15);

        env::set_var(ENV_DATA_PATH, "/tmp/other.json");
        env::set_var(ENV_INTERVAL_HOURS, "12");
        env::set_var(ENV_CLASSIFY_MODE, "relevance");
        let cfg = MonitorConfig::load_from(&p).unwrap();
        assert_eq!(cfg.store.path, PathBuf::from("/tmp/other.json"));
        assert_eq!(cfg.schedule.interval_hours, 12);
        assert_eq!(cfg.classifier.mode, ClassifyMode::Relevance);

        env::set_var(ENV_INTERVAL_HOURS, "often");
        assert!(MonitorConfig::load_from(&p).is_err());
        clear_env();
    }

    #[serial_test::serial]
    #[test]
    fn missing_env_path_is_an_error() {
        clear_env();
        env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
        assert!(MonitorConfig::load_default().is_err());
        clear_env();
    }
}
