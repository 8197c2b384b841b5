use crate::driver::{retry::Retry, DecodeMode};
use std::time::Duration;

/// Configuration for drivers and calls.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Config {
    /// Amount of time to wait for the platform to reply with connection
    /// information after [`Call::join`] is used.
    ///
    /// This is a useful fallback in the event that the platform loses a
    /// join request, or believes that this account is already in the
    /// target channel.
    ///
    /// Defaults to 10 seconds. If set to `None`, joins will never time out.
    ///
    /// [`Call::join`]: crate::Call::join
    pub gateway_timeout: Option<Duration>,

    /// Maximum amount of time to wait for the engine to open a session,
    /// and for a graceful disconnect to be acknowledged.
    ///
    /// Defaults to 10 seconds. If set to `None`, these waits are unbounded.
    pub driver_timeout: Option<Duration>,

    /// Retry logic applied when the engine signals transport loss
    /// mid-session.
    pub driver_retry: Retry,

    /// Whether engine sessions should carry decoded audio alongside raw
    /// packet payloads in each tick.
    ///
    /// Defaults to [`DecodeMode::Decode`].
    pub decode_mode: DecodeMode,

    /// Number of concurrently active tracks to allocate memory for.
    ///
    /// This should be set at, or just above, the maximum number of tracks
    /// you expect to play at the same time.
    ///
    /// Defaults to `1`.
    pub preallocated_tracks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_timeout: Some(Duration::from_secs(10)),
            driver_timeout: Some(Duration::from_secs(10)),
            driver_retry: Retry::default(),
            decode_mode: DecodeMode::Decode,
            preallocated_tracks: 1,
        }
    }
}

impl Config {
    /// Sets this `Config`'s timeout for joining a voice channel.
    #[must_use]
    pub fn gateway_timeout(mut self, gateway_timeout: Option<Duration>) -> Self {
        self.gateway_timeout = gateway_timeout;
        self
    }

    /// Sets this `Config`'s timeout for engine session setup and graceful
    /// teardown.
    #[must_use]
    pub fn driver_timeout(mut self, driver_timeout: Option<Duration>) -> Self {
        self.driver_timeout = driver_timeout;
        self
    }

    /// Sets this `Config`'s transport-loss retry configuration.
    #[must_use]
    pub fn driver_retry(mut self, driver_retry: Retry) -> Self {
        self.driver_retry = driver_retry;
        self
    }

    /// Sets this `Config`'s received-audio decode behaviour.
    #[must_use]
    pub fn decode_mode(mut self, decode_mode: DecodeMode) -> Self {
        self.decode_mode = decode_mode;
        self
    }

    /// Sets this `Config`'s number of tracks to preallocate.
    #[must_use]
    pub fn preallocated_tracks(mut self, preallocated_tracks: usize) -> Self {
        self.preallocated_tracks = preallocated_tracks;
        self
    }
}
