use crate::{
    constants::*,
    driver::OutboundAudio,
    tracks::{LoopState, PlayError, PlayMode, TrackCommand, TrackContext, TrackState},
    Config,
};
use byteorder::{ByteOrder, LittleEndian};
use flume::Sender;
use std::{sync::Arc, time::Duration};
use tracing::{trace, warn};
use uuid::Uuid;

/// The playback core: advances every live track by one 20 ms slice per
/// engine tick, and mixes their audio into a single outbound frame.
///
/// Control commands are drained at the start of each slice, so volume,
/// pause, and loop changes apply from the next processed chunk onward
/// and never retroactively.
pub(crate) struct Mixer {
    tracks: Vec<LiveTrack>,
    pub(crate) mute: bool,
}

struct LiveTrack {
    context: TrackContext,
    position: Duration,
    play_time: Duration,
}

/// Outcome of pulling one slice of audio from a track's input.
struct Pull {
    samples_written: usize,
    pass_ended: bool,
}

impl Mixer {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            tracks: Vec::with_capacity(config.preallocated_tracks),
            mute: false,
        }
    }

    pub(crate) fn add(&mut self, context: TrackContext) {
        trace!("Track {} added to playback core.", context.track.uuid);
        self.tracks.push(LiveTrack {
            context,
            position: Duration::ZERO,
            play_time: Duration::ZERO,
        });
    }

    /// Stops and discards every live track.
    pub(crate) fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Advances playback by one slice, sending the mixed frame into
    /// `audio`. Returns the UUIDs of tracks which reached a terminal
    /// state and were removed.
    pub(crate) fn advance(&mut self, audio: &Sender<OutboundAudio>) -> Vec<Uuid> {
        let mut mix = [0i32; STEREO_FRAME_SIZE];
        let mut live_audio = false;

        for live in &mut self.tracks {
            live.process_commands();

            if !live.context.track.playing.is_playing() {
                continue;
            }

            let mut frame = [0i16; STEREO_FRAME_SIZE];
            match live.pull_frame(&mut frame) {
                Ok(pull) => {
                    if pull.samples_written > 0 {
                        let volume = live.context.track.volume;
                        for (acc, sample) in mix.iter_mut().zip(frame.iter()) {
                            *acc += (f32::from(*sample) * volume) as i32;
                        }
                        live_audio = true;
                        live.position += TIMESTEP_LENGTH;
                        live.play_time += TIMESTEP_LENGTH;
                    }

                    if pull.pass_ended {
                        live.context.track.playing.change_to(PlayMode::End);
                    }
                },
                Err(e) => {
                    warn!("Track {} errored: {e}.", live.context.track.uuid);
                    live.context.track.playing.change_to(PlayMode::Errored(e));
                },
            }
        }

        let out = if self.mute || !live_audio {
            OutboundAudio::Silence
        } else {
            let mut frame = vec![0i16; STEREO_FRAME_SIZE];
            for (sample, acc) in frame.iter_mut().zip(mix.iter()) {
                *sample = (*acc).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            }
            OutboundAudio::Frame(frame)
        };

        if audio.try_send(out).is_err() {
            trace!("Engine audio channel backlogged; frame dropped.");
        }

        let mut finished = Vec::new();
        self.tracks.retain(|live| {
            if live.context.track.playing.is_done() {
                finished.push(live.context.track.uuid);
                false
            } else {
                true
            }
        });

        finished
    }
}

impl LiveTrack {
    fn process_commands(&mut self) {
        while let Ok(cmd) = self.context.receiver.try_recv() {
            match cmd {
                TrackCommand::Play => self.context.track.playing.change_to(PlayMode::Play),
                TrackCommand::Pause => self.context.track.playing.change_to(PlayMode::Pause),
                TrackCommand::Stop => self.context.track.playing.change_to(PlayMode::Stop),
                TrackCommand::Volume(vol) => self.context.track.volume = vol,
                TrackCommand::Loop(loops) => self.context.track.loops = loops,
                TrackCommand::Request(tx) => {
                    let _ = tx.send(self.state());
                },
            }
        }
    }

    fn state(&self) -> TrackState {
        TrackState {
            playing: self.context.track.playing.clone(),
            volume: self.context.track.volume,
            position: self.position,
            play_time: self.play_time,
            loops: self.context.track.loops,
        }
    }

    /// Reads up to one full slice of PCM, rewinding across pass
    /// boundaries while loop passes remain.
    fn pull_frame(&mut self, out: &mut [i16; STEREO_FRAME_SIZE]) -> Result<Pull, PlayError> {
        let track = &mut self.context.track;
        let mut bytes = [0u8; STEREO_FRAME_BYTE_SIZE];
        let mut filled = 0;
        let mut pass_ended = false;
        let mut just_rewound = false;

        while filled < bytes.len() {
            match track.input.source.read_pcm(&mut bytes[filled..]) {
                Ok(0) => {
                    // An empty pass directly after a rewind would spin forever.
                    if just_rewound {
                        pass_ended = true;
                        break;
                    }

                    match track.loops {
                        LoopState::Infinite => {},
                        LoopState::Finite(n) if n > 1 => track.loops = LoopState::Finite(n - 1),
                        LoopState::Finite(_) => {
                            pass_ended = true;
                            break;
                        },
                    }

                    track
                        .input
                        .source
                        .rewind()
                        .map_err(|e| PlayError::Io(Arc::new(e)))?;
                    just_rewound = true;
                },
                Ok(n) => {
                    filled += n;
                    just_rewound = false;
                },
                Err(e) => return Err(PlayError::Io(Arc::new(e))),
            }
        }

        LittleEndian::read_i16_into(&bytes, out);

        Ok(Pull {
            samples_written: filled / std::mem::size_of::<i16>(),
            pass_ended,
        })
    }
}
