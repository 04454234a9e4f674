//! Sampling configuration: the one piece of "config" the core owns, matching
//! `Domain::SamplingConfig`'s clamped constants.

pub const REFRESH_INTERVAL_DEFAULT_MS: u64 = 1000;
pub const REFRESH_INTERVAL_MIN_MS: u64 = 100;
pub const REFRESH_INTERVAL_MAX_MS: u64 = 5000;

pub const HISTORY_SECONDS_DEFAULT: u64 = 300;
pub const HISTORY_SECONDS_MIN: u64 = 10;
pub const HISTORY_SECONDS_MAX: u64 = 1800;

fn clamp(value: u64, min: u64, max: u64) -> u64 {
    value.clamp(min, max)
}

/// Clamps a raw `historySeconds` value to `[HISTORY_SECONDS_MIN, HISTORY_SECONDS_MAX]`,
/// for callers (models) that apply the same bound spec.md requires of the config
/// layer without going through a full `SamplingConfig`.
pub fn clamp_history_seconds(value: u64) -> u64 {
    clamp(value, HISTORY_SECONDS_MIN, HISTORY_SECONDS_MAX)
}

/// Clamped at construction and at every setter, so no downstream reader can
/// ever observe an out-of-range interval or history length.
#[derive(Debug, Clone, Copy)]
pub struct SamplingConfig {
    refresh_interval_ms: u64,
    history_seconds: u64,
}

impl SamplingConfig {
    pub fn new(refresh_interval_ms: u64, history_seconds: u64) -> Self {
        Self {
            refresh_interval_ms: clamp(refresh_interval_ms, REFRESH_INTERVAL_MIN_MS, REFRESH_INTERVAL_MAX_MS),
            history_seconds: clamp(history_seconds, HISTORY_SECONDS_MIN, HISTORY_SECONDS_MAX),
        }
    }

    pub fn refresh_interval_ms(&self) -> u64 {
        self.refresh_interval_ms
    }

    pub fn set_refresh_interval_ms(&mut self, value: u64) {
        self.refresh_interval_ms = clamp(value, REFRESH_INTERVAL_MIN_MS, REFRESH_INTERVAL_MAX_MS);
    }

    pub fn history_seconds(&self) -> u64 {
        self.history_seconds
    }

    pub fn set_history_seconds(&mut self, value: u64) {
        self.history_seconds = clamp(value, HISTORY_SECONDS_MIN, HISTORY_SECONDS_MAX);
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::new(REFRESH_INTERVAL_DEFAULT_MS, HISTORY_SECONDS_DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_clamps_out_of_range_values() {
        let cfg = SamplingConfig::new(10, 5);
        assert_eq!(cfg.refresh_interval_ms(), REFRESH_INTERVAL_MIN_MS);
        assert_eq!(cfg.history_seconds(), HISTORY_SECONDS_MIN);

        let cfg = SamplingConfig::new(100_000, 100_000);
        assert_eq!(cfg.refresh_interval_ms(), REFRESH_INTERVAL_MAX_MS);
        assert_eq!(cfg.history_seconds(), HISTORY_SECONDS_MAX);
    }

    #[test]
    fn setters_clamp_too() {
        let mut cfg = SamplingConfig::default();
        cfg.set_refresh_interval_ms(1);
        assert_eq!(cfg.refresh_interval_ms(), REFRESH_INTERVAL_MIN_MS);
        cfg.set_history_seconds(999_999);
        assert_eq!(cfg.history_seconds(), HISTORY_SECONDS_MAX);
    }

    #[test]
    fn clamp_history_seconds_matches_sampling_config_bounds() {
        assert_eq!(clamp_history_seconds(1), HISTORY_SECONDS_MIN);
        assert_eq!(clamp_history_seconds(100_000), HISTORY_SECONDS_MAX);
        assert_eq!(clamp_history_seconds(60), 60);
    }

    #[test]
    fn default_matches_spec_constants() {
        let cfg = SamplingConfig::default();
        assert_eq!(cfg.refresh_interval_ms(), REFRESH_INTERVAL_DEFAULT_MS);
        assert_eq!(cfg.history_seconds(), HISTORY_SECONDS_DEFAULT);
    }
}
