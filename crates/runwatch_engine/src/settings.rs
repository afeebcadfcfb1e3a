use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::ChannelError;

/// Endpoints and timings for the three channels.
///
/// Durations are given in seconds in configuration files (fractions allowed).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub base_url: String,
    pub summary_stream_path: String,
    pub log_stream_path: String,
    pub summary_path: String,
    pub run_path: String,
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    /// First delay before reopening a dropped stream.
    #[serde(with = "secs")]
    pub reconnect_delay: Duration,
    /// Consecutive failures double the delay up to this cap.
    #[serde(with = "secs")]
    pub max_reconnect_delay: Duration,
    /// Push silence tolerated while a run is active.
    #[serde(with = "secs")]
    pub watchdog_timeout: Duration,
    #[serde(with = "secs")]
    pub watchdog_check_interval: Duration,
    #[serde(with = "secs")]
    pub poll_active: Duration,
    #[serde(with = "secs")]
    pub poll_idle: Duration,
    #[serde(with = "secs")]
    pub poll_hidden: Duration,
    /// Progress drift timer.
    #[serde(with = "secs")]
    pub tick_interval: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".to_string(),
            summary_stream_path: "/api/run/summary/stream".to_string(),
            log_stream_path: "/api/logs/stream?tag=SYNC".to_string(),
            summary_path: "/api/run/summary".to_string(),
            run_path: "/api/run".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
            max_reconnect_delay: Duration::from_secs(30),
            watchdog_timeout: Duration::from_secs(45),
            watchdog_check_interval: Duration::from_secs(5),
            poll_active: Duration::from_secs(2),
            poll_idle: Duration::from_secs(15),
            poll_hidden: Duration::from_secs(60),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Resolved endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub summary_stream: Url,
    pub log_stream: Url,
    pub summary: Url,
    pub run: Url,
}

impl SupervisorSettings {
    pub fn endpoints(&self) -> Result<Endpoints, ChannelError> {
        let base = Url::parse(&self.base_url)
            .map_err(|err| ChannelError::InvalidUrl(format!("{}: {err}", self.base_url)))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|err| ChannelError::InvalidUrl(format!("{path}: {err}")))
        };
        Ok(Endpoints {
            summary_stream: join(&self.summary_stream_path)?,
            log_stream: join(&self.log_stream_path)?,
            summary: join(&self.summary_path)?,
            run: join(&self.run_path)?,
        })
    }

    /// Delay before reconnect attempt number `failures` (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32 << failures.saturating_sub(1).min(16);
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
