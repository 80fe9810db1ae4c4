use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// How many messages go out concurrently in one batch.
pub const BATCH_SIZE: usize = 5;

/// Hard cap on send attempts within one rolling 60-second window. Sized for
/// mailbox-provider-safe throughput; raise with care.
pub const EMAILS_PER_MINUTE: u32 = 30;

/// Pause between consecutive batches of the same campaign.
pub const PAUSE_BETWEEN_BATCHES: Duration = Duration::from_secs(2);

/// Upper bound on a single outbound send. A stuck transport call counts as a
/// failed send rather than blocking the batch forever.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatch policy knobs. Defaults match the constants above; individual
/// values can be overridden through environment variables.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub batch_size: usize,
    pub emails_per_minute: u32,
    pub pause_between_batches: Duration,
    pub send_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            emails_per_minute: EMAILS_PER_MINUTE,
            pause_between_batches: PAUSE_BETWEEN_BATCHES,
            send_timeout: SEND_TIMEOUT,
        }
    }
}

impl DispatchConfig {
    /// Read overrides from `BATCH_SIZE`, `EMAILS_PER_MINUTE`,
    /// `PAUSE_BETWEEN_BATCHES_MS` and `SEND_TIMEOUT_MS`. Unset variables fall
    /// back to the defaults; a set-but-unparseable value is logged and then
    /// falls back too, rather than silently changing the send rate.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_parse("BATCH_SIZE").unwrap_or(defaults.batch_size),
            emails_per_minute: env_parse("EMAILS_PER_MINUTE")
                .unwrap_or(defaults.emails_per_minute),
            pause_between_batches: env_parse("PAUSE_BETWEEN_BATCHES_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.pause_between_batches),
            send_timeout: env_parse("SEND_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.send_timeout),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let value = env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Unparseable override, using the default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy_constants() {
        let config = DispatchConfig::default();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.emails_per_minute, 30);
        assert_eq!(config.pause_between_batches, Duration::from_secs(2));
        assert_eq!(config.send_timeout, Duration::from_secs(30));
    }

    // Each test owns a distinct variable, so parallel test threads cannot
    // race on the process environment.

    #[test]
    fn parseable_env_override_applies() {
        unsafe { env::set_var("BATCH_SIZE", "3") };
        let config = DispatchConfig::from_env();
        unsafe { env::remove_var("BATCH_SIZE") };
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.emails_per_minute, 30);
    }

    #[test]
    fn unparseable_env_override_falls_back_to_default() {
        unsafe { env::set_var("EMAILS_PER_MINUTE", "plenty") };
        let config = DispatchConfig::from_env();
        unsafe { env::remove_var("EMAILS_PER_MINUTE") };
        assert_eq!(config.emails_per_minute, 30);
    }
}
