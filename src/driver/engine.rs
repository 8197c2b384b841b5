//! Contract between the driver and the external audio transport.
//!
//! The transport (socket handling, encryption, jitter buffering, and
//! codec work) lives outside this crate. The driver sees it only as an
//! [`Engine`]: something which, given a complete [`ConnectionInfo`],
//! yields an [`EngineSession`] that consumes one mixed audio frame per
//! time-slice and emits an ordered stream of [`EngineEvent`]s.

use crate::{
    error::ConnectionResult,
    model::payload::Speaking,
    receive::VoiceTick,
    Config,
    ConnectionInfo,
};
use async_trait::async_trait;

/// An opaque audio transport capable of opening live voice sessions.
///
/// One engine instance serves every call built on top of it; each open
/// session is independent.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Opens a transport session against the server described by `info`.
    ///
    /// Implementations should honour `config.decode_mode` when populating
    /// tick contents. The driver bounds this call with
    /// [`Config::driver_timeout`].
    async fn open(&self, info: &ConnectionInfo, config: &Config) -> ConnectionResult<EngineSession>;
}

/// Live channel pair for one open engine session.
///
/// Dropping both halves closes the session.
#[derive(Debug)]
pub struct EngineSession {
    /// Sink for outbound audio: the driver sends exactly one
    /// [`OutboundAudio`] value per received tick.
    pub audio: flume::Sender<OutboundAudio>,
    /// Ordered inbound events. Implementations should bound this channel
    /// (see [`constants::ENGINE_EVENT_BUFFER`]) so a stalled consumer
    /// surfaces as backpressure rather than unbounded memory growth.
    ///
    /// [`constants::ENGINE_EVENT_BUFFER`]: crate::constants::ENGINE_EVENT_BUFFER
    pub events: flume::Receiver<EngineEvent>,
}

/// One mixed frame of outbound audio for a single time-slice.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum OutboundAudio {
    /// Interleaved stereo PCM covering one 20 ms slice.
    Frame(Vec<i16>),
    /// Nothing to transmit this slice.
    Silence,
}

/// An inbound event produced by an open engine session.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum EngineEvent {
    /// The periodic aggregate of all inbound audio for one time-slice.
    ///
    /// Exactly one fires per slice, in production order, even when no
    /// source is active.
    Tick(VoiceTick),
    /// A speaking-state payload mapping an SSRC to a platform user.
    Speaking(Speaking),
    /// The transport was lost mid-session. The driver will attempt to
    /// re-open the session under [`Config::driver_retry`].
    Dropped,
}
