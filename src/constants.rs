//! Constants governing the audio format shared between the mixer, the
//! engine boundary, and receive consumers.

use std::time::Duration;

/// Sample rate of all PCM audio crossing the engine boundary.
pub const SAMPLE_RATE_RAW: usize = 48_000;

/// Number of audio frames/ticks processed per second.
pub const AUDIO_FRAME_RATE: usize = 50;

/// Length of time covered by one engine tick.
pub const TIMESTEP_LENGTH: Duration = Duration::from_millis(1000 / AUDIO_FRAME_RATE as u64);

/// Number of channels in mixed and decoded audio.
pub const CHANNEL_COUNT: usize = 2;

/// Bit depth of a single PCM sample.
pub const SAMPLE_BITS: usize = 16;

/// Number of samples in one frame of audio per channel.
pub const MONO_FRAME_SIZE: usize = SAMPLE_RATE_RAW / AUDIO_FRAME_RATE;

/// Number of individual samples in one complete frame of stereo audio.
pub const STEREO_FRAME_SIZE: usize = CHANNEL_COUNT * MONO_FRAME_SIZE;

/// Number of bytes in one complete frame of raw `i16`-encoded stereo audio.
pub const STEREO_FRAME_BYTE_SIZE: usize = STEREO_FRAME_SIZE * std::mem::size_of::<i16>();

/// Length (in milliseconds) of any audio frame.
pub const FRAME_LEN_MS: usize = 1000 / AUDIO_FRAME_RATE;

/// Number of engine events buffered between the engine boundary and the
/// driver's sequential consumer.
pub const ENGINE_EVENT_BUFFER: usize = 64;
