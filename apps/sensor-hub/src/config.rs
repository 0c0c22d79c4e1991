use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::device_class::DeviceClasses;
use crate::history::DEFAULT_TABLE_ROWS;
use crate::live::DEFAULT_SESSION_QUEUE;
use crate::store::{QueryLimits, StoreOptions, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};

const DEFAULT_DATABASE_PATH: &str = "sensor_data.db";

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub database_path: PathBuf,
    pub static_root: Option<PathBuf>,
    pub query_limits: QueryLimits,
    pub table_rows: u32,
    pub session_queue_capacity: usize,
    pub device_classes: Arc<DeviceClasses>,
    /// POST requests per second per client; `0` disables rate limiting.
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
    pub cors_allow_any: bool,
}

impl HubConfig {
    pub fn from_env(
        cli_database_path: Option<PathBuf>,
        cli_static_root: Option<PathBuf>,
    ) -> Result<Self> {
        Self::from_source(
            &|key: &str| std::env::var(key).ok(),
            cli_database_path,
            cli_static_root,
        )
    }

    pub(crate) fn from_source(
        source: &dyn Fn(&str) -> Option<String>,
        cli_database_path: Option<PathBuf>,
        cli_static_root: Option<PathBuf>,
    ) -> Result<Self> {
        let env = EnvSource(source);

        let database_path = cli_database_path.unwrap_or_else(|| {
            PathBuf::from(env.string("SENSOR_HUB_DATABASE_PATH", DEFAULT_DATABASE_PATH))
        });
        let static_root = cli_static_root.or_else(|| {
            env.optional_string("SENSOR_HUB_STATIC_ROOT")
                .map(PathBuf::from)
        });

        let query_limits = QueryLimits {
            default_limit: env.u32("SENSOR_HUB_DEFAULT_QUERY_LIMIT", DEFAULT_QUERY_LIMIT),
            max_limit: env.u32("SENSOR_HUB_MAX_QUERY_LIMIT", MAX_QUERY_LIMIT),
        };

        let default_class = env.string(
            "SENSOR_HUB_DEFAULT_DEVICE_CLASS",
            DeviceClasses::builtin().default_class().name.as_str(),
        );
        let device_classes = match env.optional_string("SENSOR_HUB_DEVICE_CLASSES") {
            Some(raw) => {
                let classes = DeviceClasses::parse_definitions(&raw)
                    .context("invalid SENSOR_HUB_DEVICE_CLASSES")?;
                DeviceClasses::new(classes, &default_class)
                    .context("invalid SENSOR_HUB_DEVICE_CLASSES")?
            }
            None => DeviceClasses::new(DeviceClasses::builtin().into_classes(), &default_class)
                .context("invalid SENSOR_HUB_DEFAULT_DEVICE_CLASS")?,
        };

        let config = Self {
            database_path,
            static_root,
            query_limits,
            table_rows: env.u32("SENSOR_HUB_TABLE_ROWS", DEFAULT_TABLE_ROWS),
            session_queue_capacity: env.u64(
                "SENSOR_HUB_SESSION_QUEUE",
                DEFAULT_SESSION_QUEUE as u64,
            ) as usize,
            device_classes: Arc::new(device_classes),
            rate_limit_per_second: env.u64("SENSOR_HUB_RATE_LIMIT_PER_SECOND", 20),
            rate_limit_burst: env.u32("SENSOR_HUB_RATE_LIMIT_BURST", 60),
            cors_allow_any: env.bool("SENSOR_HUB_CORS_ALLOW_ANY", true),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.query_limits.default_limit == 0 {
            anyhow::bail!("SENSOR_HUB_DEFAULT_QUERY_LIMIT must be at least 1");
        }
        if self.query_limits.max_limit < self.query_limits.default_limit {
            anyhow::bail!(
                "SENSOR_HUB_MAX_QUERY_LIMIT ({}) must not be below SENSOR_HUB_DEFAULT_QUERY_LIMIT ({})",
                self.query_limits.max_limit,
                self.query_limits.default_limit
            );
        }
        if self.table_rows == 0 {
            anyhow::bail!("SENSOR_HUB_TABLE_ROWS must be at least 1");
        }
        if self.session_queue_capacity == 0 {
            anyhow::bail!("SENSOR_HUB_SESSION_QUEUE must be at least 1");
        }
        if self.rate_limit_per_second > 0 && self.rate_limit_burst == 0 {
            anyhow::bail!("SENSOR_HUB_RATE_LIMIT_BURST must be at least 1 when rate limiting is on");
        }
        if let Some(root) = &self.static_root {
            if !root.exists() {
                anyhow::bail!("static root not found at {}", root.display());
            }
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            path: self.database_path.clone(),
            limits: self.query_limits,
        }
    }
}

struct EnvSource<'a>(&'a dyn Fn(&str) -> Option<String>);

impl EnvSource<'_> {
    fn optional_string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional_string(key)
            .unwrap_or_else(|| default.to_string())
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.optional_string(key).map(|value| value.to_lowercase()) {
            Some(value) if value == "1" || value == "true" || value == "yes" => true,
            Some(value) if value == "0" || value == "false" || value == "no" => false,
            _ => default,
        }
    }

    fn u32(&self, key: &str, default: u32) -> u32 {
        self.optional_string(key)
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(default)
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.optional_string(key)
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(default)
    }
}
