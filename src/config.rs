use gccore::FrameCrypto;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Exponential backoff for SFU requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), with up to 20% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        let capped = exp.min(self.max_delay);
        let jitter_ms = (capped.as_millis() as u64) / 5;
        if jitter_ms == 0 {
            return capped;
        }
        let jitter = rand::rng().random_range(0..=jitter_ms);
        capped
            .saturating_sub(Duration::from_millis(jitter_ms / 2))
            .saturating_add(Duration::from_millis(jitter))
    }
}

/// Tunables for the group call engine.
#[derive(Clone)]
pub struct GroupCallConfig {
    /// How often a joined call publishes and refreshes the encrypted call state.
    pub state_update_interval: Duration,
    /// How often known-but-not-joined calls are peeked.
    pub refresh_interval: Duration,
    pub peek_timeout: Duration,
    pub credential_refresh_timeout: Duration,
    /// Budget for ICE connectivity plus the SFU hello after the join request.
    pub connect_timeout: Duration,
    /// How long `leave` waits for the call to confirm teardown.
    pub leave_timeout: Duration,
    /// Time between announcing fresh media keys after a departure and using them.
    pub rekey_delay: Duration,
    pub sfu_retry: RetryPolicy,
    /// Protocol violations tolerated from one participant before it is removed.
    pub protocol_error_threshold: u32,
    /// Hostname suffixes an announced SFU base URL must match. Empty denies all.
    pub allowed_sfu_hostname_suffixes: Vec<String>,
    pub allow_ipv6_candidates: bool,
    /// Failed peeks after which an old call is forgotten.
    pub max_failed_peeks: u32,
    /// Minimum age before repeated peek failures make a call forgettable.
    pub stale_call_age: Duration,
    pub mailbox_capacity: usize,
    /// Frame cipher backend; AES-GCM when unset.
    pub frame_crypto: Option<Arc<dyn FrameCrypto>>,
}

impl std::fmt::Debug for GroupCallConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCallConfig")
            .field("state_update_interval", &self.state_update_interval)
            .field("refresh_interval", &self.refresh_interval)
            .field("peek_timeout", &self.peek_timeout)
            .field(
                "credential_refresh_timeout",
                &self.credential_refresh_timeout,
            )
            .field("connect_timeout", &self.connect_timeout)
            .field("leave_timeout", &self.leave_timeout)
            .field("rekey_delay", &self.rekey_delay)
            .field("sfu_retry", &self.sfu_retry)
            .field("protocol_error_threshold", &self.protocol_error_threshold)
            .field(
                "allowed_sfu_hostname_suffixes",
                &self.allowed_sfu_hostname_suffixes,
            )
            .field("allow_ipv6_candidates", &self.allow_ipv6_candidates)
            .field("max_failed_peeks", &self.max_failed_peeks)
            .field("stale_call_age", &self.stale_call_age)
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("frame_crypto", &self.frame_crypto.is_some())
            .finish()
    }
}

impl Default for GroupCallConfig {
    fn default() -> Self {
        Self {
            state_update_interval: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(10),
            peek_timeout: Duration::from_secs(5),
            credential_refresh_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            leave_timeout: Duration::from_secs(10),
            rekey_delay: Duration::from_secs(2),
            sfu_retry: RetryPolicy::default(),
            protocol_error_threshold: 3,
            allowed_sfu_hostname_suffixes: Vec::new(),
            allow_ipv6_candidates: true,
            max_failed_peeks: 3,
            stale_call_age: Duration::from_secs(10 * 60 * 60),
            mailbox_capacity: 64,
            frame_crypto: None,
        }
    }
}
