//! Types describing inbound audio delivered by the engine.

use std::collections::{BTreeMap, HashSet};

/// Voice data for a single source within one tick.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct VoiceData {
    /// Raw transport payload for this source, if one arrived this tick.
    pub packet: Option<Vec<u8>>,
    /// Decoded 16-bit PCM audio, present when the engine is configured
    /// with [`DecodeMode::Decode`].
    ///
    /// [`DecodeMode::Decode`]: crate::driver::DecodeMode::Decode
    pub decoded_voice: Option<Vec<i16>>,
}

/// An aggregate of all inbound audio for one engine time-slice.
///
/// Exactly one tick is emitted per 20 ms slice, and ticks arrive in the
/// order the engine produced them. Receivers must treat the contents as
/// read-only snapshots.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct VoiceTick {
    /// Sources which produced audio this tick, in ascending SSRC order.
    pub speaking: BTreeMap<u32, VoiceData>,
    /// Known-active sources which produced no audio this tick.
    pub silent: HashSet<u32>,
}
