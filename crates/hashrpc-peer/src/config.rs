use std::time::Duration;

/// Default time a single poll waits for transport activity.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(15);

/// Default pause between polls in `run` loops.
pub const DEFAULT_TICK: Duration = Duration::from_millis(1);

/// Timing for endpoint poll loops.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// How long one `poll` waits for transport events.
    pub poll_timeout: Duration,
    /// Pause between polls when `run` drives the endpoint.
    pub tick: Duration,
}

impl EndpointConfig {
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            tick: DEFAULT_TICK,
        }
    }
}
