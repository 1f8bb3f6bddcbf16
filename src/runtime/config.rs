use crate::ingest::types::{IngestionVersion, CURRENT_VERSION};
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_OUTDATED_BATCH_SIZE: usize = 1_000;
const DEFAULT_ACCOUNT_CACHE_CAPACITY: usize = 4_096;

const ENV_POLL_INTERVAL_MS: &str = "LEDGERSYNC_POLL_INTERVAL_MS";
const ENV_INGEST_VERSION: &str = "LEDGERSYNC_INGEST_VERSION";
const ENV_OUTDATED_BATCH_SIZE: &str = "LEDGERSYNC_OUTDATED_BATCH_SIZE";
const ENV_METRICS_INTERVAL_SECS: &str = "LEDGERSYNC_METRICS_INTERVAL_SECS";
const ENV_ACCOUNT_CACHE_CAPACITY: &str = "LEDGERSYNC_ACCOUNT_CACHE_CAPACITY";
const ENV_SWEEP_MAX_ITERATIONS: &str = "LEDGERSYNC_SWEEP_MAX_ITERATIONS";
const ENV_SWEEP_DETECT_STALLS: &str = "LEDGERSYNC_SWEEP_DETECT_STALLS";
const ENV_SERIALIZE_RANGES: &str = "LEDGERSYNC_SERIALIZE_OVERLAPPING_RANGES";

/// Opt-in safety bounds for the outdated-ledger sweep. The default imposes
/// none: the sweep runs until the outdated query comes back empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepLimits {
    /// Maximum number of non-empty outdated pages processed. The query that
    /// comes back empty and ends the sweep is not counted.
    pub max_iterations: Option<usize>,
    pub detect_stalls: bool,
}

/// Runtime configuration for the ingestion orchestrator.
///
/// All instances must be constructed via [`IngestConfig::builder`] or [`IngestConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    poll_interval: Duration,
    ingest_version: IngestionVersion,
    outdated_batch_size: usize,
    metrics_interval: Duration,
    account_cache_capacity: usize,
    sweep_limits: SweepLimits,
    serialize_overlapping_ranges: bool,
}

pub struct IngestConfigParams {
    pub poll_interval: Duration,
    pub ingest_version: IngestionVersion,
    pub outdated_batch_size: usize,
    pub metrics_interval: Duration,
    pub account_cache_capacity: usize,
    pub sweep_limits: SweepLimits,
    pub serialize_overlapping_ranges: bool,
}

impl IngestConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: IngestConfigParams) -> Result<Self> {
        let IngestConfigParams {
            poll_interval,
            ingest_version,
            outdated_batch_size,
            metrics_interval,
            account_cache_capacity,
            sweep_limits,
            serialize_overlapping_ranges,
        } = params;

        let config = Self {
            poll_interval,
            ingest_version,
            outdated_batch_size,
            metrics_interval,
            account_cache_capacity,
            sweep_limits,
            serialize_overlapping_ranges,
        };

        config.validate()?;
        Ok(config)
    }

    /// Interval between poller ticks.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Version passed to every session and to the outdated-ledger query.
    pub fn ingest_version(&self) -> IngestionVersion {
        self.ingest_version
    }

    /// Maximum number of outdated ledgers fetched per sweep query.
    pub fn outdated_batch_size(&self) -> usize {
        self.outdated_batch_size
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn account_cache_capacity(&self) -> usize {
        self.account_cache_capacity
    }

    pub fn sweep_limits(&self) -> SweepLimits {
        self.sweep_limits
    }

    /// Whether concurrent ingestion of overlapping ranges is rejected.
    pub fn serialize_overlapping_ranges(&self) -> bool {
        self.serialize_overlapping_ranges
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.ingest_version == 0 {
            bail!("ingest_version must be greater than 0");
        }

        if self.outdated_batch_size == 0 {
            bail!("outdated_batch_size must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.account_cache_capacity == 0 {
            bail!("account_cache_capacity must be greater than 0");
        }

        if self.sweep_limits.max_iterations == Some(0) {
            bail!("sweep_max_iterations must be greater than 0 when set");
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            ingest_version: CURRENT_VERSION,
            outdated_batch_size: DEFAULT_OUTDATED_BATCH_SIZE,
            metrics_interval: telemetry::DEFAULT_METRICS_INTERVAL,
            account_cache_capacity: DEFAULT_ACCOUNT_CACHE_CAPACITY,
            sweep_limits: SweepLimits::default(),
            serialize_overlapping_ranges: false,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct IngestConfigBuilder {
    poll_interval: Option<Duration>,
    ingest_version: Option<IngestionVersion>,
    outdated_batch_size: Option<usize>,
    metrics_interval: Option<Duration>,
    account_cache_capacity: Option<usize>,
    sweep_max_iterations: Option<usize>,
    sweep_detect_stalls: Option<bool>,
    serialize_overlapping_ranges: Option<bool>,
}

impl IngestConfigBuilder {
    /// Seeds a builder from `LEDGERSYNC_*` environment variables. Unset variables
    /// keep their defaults; malformed ones are reported.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_POLL_INTERVAL_MS)? {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Some(version) = parse_var(&lookup, ENV_INGEST_VERSION)? {
            builder = builder.ingest_version(version);
        }
        if let Some(size) = parse_var(&lookup, ENV_OUTDATED_BATCH_SIZE)? {
            builder = builder.outdated_batch_size(size);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_METRICS_INTERVAL_SECS)? {
            builder = builder.metrics_interval(Duration::from_secs(secs));
        }
        if let Some(capacity) = parse_var(&lookup, ENV_ACCOUNT_CACHE_CAPACITY)? {
            builder = builder.account_cache_capacity(capacity);
        }
        if let Some(iterations) = parse_var(&lookup, ENV_SWEEP_MAX_ITERATIONS)? {
            builder = builder.sweep_max_iterations(iterations);
        }
        if let Some(enabled) = parse_flag(&lookup, ENV_SWEEP_DETECT_STALLS)? {
            builder = builder.sweep_detect_stalls(enabled);
        }
        if let Some(enabled) = parse_flag(&lookup, ENV_SERIALIZE_RANGES)? {
            builder = builder.serialize_overlapping_ranges(enabled);
        }
        Ok(builder)
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn ingest_version(mut self, version: IngestionVersion) -> Self {
        self.ingest_version = Some(version);
        self
    }

    pub fn outdated_batch_size(mut self, size: usize) -> Self {
        self.outdated_batch_size = Some(size);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn account_cache_capacity(mut self, capacity: usize) -> Self {
        self.account_cache_capacity = Some(capacity);
        self
    }

    pub fn sweep_max_iterations(mut self, iterations: usize) -> Self {
        self.sweep_max_iterations = Some(iterations);
        self
    }

    pub fn sweep_detect_stalls(mut self, enabled: bool) -> Self {
        self.sweep_detect_stalls = Some(enabled);
        self
    }

    pub fn serialize_overlapping_ranges(mut self, enabled: bool) -> Self {
        self.serialize_overlapping_ranges = Some(enabled);
        self
    }

    pub fn build(self) -> Result<IngestConfig> {
        let defaults = IngestConfig::default();
        let params = IngestConfigParams {
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            ingest_version: self.ingest_version.unwrap_or(defaults.ingest_version),
            outdated_batch_size: self
                .outdated_batch_size
                .unwrap_or(defaults.outdated_batch_size),
            metrics_interval: self.metrics_interval.unwrap_or(defaults.metrics_interval),
            account_cache_capacity: self
                .account_cache_capacity
                .unwrap_or(defaults.account_cache_capacity),
            sweep_limits: SweepLimits {
                max_iterations: self.sweep_max_iterations,
                detect_stalls: self.sweep_detect_stalls.unwrap_or(false),
            },
            serialize_overlapping_ranges: self.serialize_overlapping_ranges.unwrap_or(false),
        };

        IngestConfig::new(params)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid value {raw:?} for {name}"))?;
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}

fn parse_flag<F>(lookup: &F, name: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" => Ok(Some(true)),
        "0" | "false" | "no" => Ok(Some(false)),
        other => bail!("invalid value {other:?} for {name}; expected true or false"),
    }
}
