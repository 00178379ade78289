//! Scheduler configuration
//!
//! Defaults, overridden by an optional TOML file, overridden by CLI flags.
//!
//! ```toml
//! worker_threads = 8
//! max_in_flight = 16
//! progress_interval_secs = 5
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use odflow_common::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Worker pool size, 0 = one per CPU
    pub worker_threads: usize,
    /// Origins admitted concurrently, 0 = one per worker
    pub max_in_flight: usize,
    /// Seconds between progress reports
    pub progress_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_in_flight: 0,
            progress_interval_secs: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SchedulerConfig =
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.progress_interval_secs == 0 {
            return Err(Error::Config(
                "progress_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Override fields given on the command line
    pub fn with_overrides(mut self, threads: Option<usize>, max_in_flight: Option<usize>) -> Self {
        if let Some(threads) = threads {
            self.worker_threads = threads;
        }
        if let Some(max) = max_in_flight {
            self.max_in_flight = max;
        }
        self
    }

    pub fn resolved_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }

    /// Admission gate size, independent of the worker count unless left at 0
    pub fn resolved_max_in_flight(&self) -> usize {
        if self.max_in_flight == 0 {
            self.resolved_threads()
        } else {
            self.max_in_flight
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_in_flight = 3").unwrap();
        let config = SchedulerConfig::load(file.path()).unwrap();
        assert_eq!(config.max_in_flight, 3);
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.progress_interval_secs, 5);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "threads = 3").unwrap();
        assert!(matches!(
            SchedulerConfig::load(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = SchedulerConfig {
            progress_interval_secs: 0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_and_resolution() {
        let config = SchedulerConfig::default().with_overrides(Some(2), None);
        assert_eq!(config.resolved_threads(), 2);
        assert_eq!(config.resolved_max_in_flight(), 2);

        let config = config.with_overrides(None, Some(7));
        assert_eq!(config.resolved_max_in_flight(), 7);
        assert!(SchedulerConfig::default().resolved_threads() >= 1);
    }
}
