use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::health::HealthCheckConfig;

pub const DATA_DIR: &str = ".cognimark";
pub const SETTINGS_FILE: &str = "settings.json";
pub const STORAGE_FILE: &str = "storage.json";

/// 运行参数，文件中缺失的字段取默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// 监听书签文件变化
    pub auto_sync: bool,
    pub sync_on_startup: bool,
    pub debounce_ms: u64,
    pub sync_interval_minutes: u64,
    pub health_check_interval_minutes: u64,
    /// 守护进程启动后首次健康检查的延迟
    pub health_check_delay_minutes: u64,
    pub health_check_timeout_secs: u64,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub storage_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_on_startup: true,
            debounce_ms: 1000,
            sync_interval_minutes: 120,
            health_check_interval_minutes: 1440,
            health_check_delay_minutes: 5,
            health_check_timeout_secs: 10,
            batch_size: 5,
            batch_delay_ms: 2000,
            storage_path: None,
        }
    }
}

impl Settings {
    /// 读取配置文件；文件不存在时使用默认值
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings {:?}", path))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("invalid settings file {:?}", path))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batchSize must be at least 1");
        }
        if self.health_check_timeout_secs == 0 {
            bail!("healthCheckTimeoutSecs must be greater than 0");
        }
        if self.sync_interval_minutes == 0 || self.health_check_interval_minutes == 0 {
            bail!("alarm intervals must be greater than 0");
        }
        if self.debounce_ms == 0 {
            bail!("debounceMs must be greater than 0");
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    pub fn health_check_config(&self) -> HealthCheckConfig {
        HealthCheckConfig {
            batch_size: self.batch_size,
            probe_timeout: self.probe_timeout(),
            batch_delay: Duration::from_millis(self.batch_delay_ms),
        }
    }

    /// 配置中的存储路径，否则 `~/.cognimark/storage.json`
    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join(STORAGE_FILE)),
        }
    }
}

pub fn data_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(DATA_DIR))
}

pub fn default_settings_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(SETTINGS_FILE))
}
