//! Continuous multi-file WAV recording of inbound audio.

use super::{Receiver, ReceiverError, SpeakingUpdate, VoiceTick};
use crate::{constants::*, id::UserId};
use async_trait::async_trait;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use flume::{Receiver as MessageReceiver, Sender, TrySendError};
use std::{
    collections::HashMap,
    fs,
    io::{Result as IoResult, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};
use tracing::{error, info};

/// Number of ticks the recorder will queue for its worker before
/// preferring to drop audio over stalling the dispatch path.
const RECORDER_QUEUE_LEN: usize = 64;

/// Size of the placeholder/finalised WAV header.
const WAV_HEADER_LEN: u32 = 44;

/// A [`Receiver`] which records every inbound source to its own WAV file.
///
/// One file is created per SSRC, lazily on its first audio; all files for
/// sources observed in the same tick stay byte-aligned, because every
/// tick writes exactly one 20 ms chunk (decoded audio or silence) to each
/// file being recorded. When a source's owning user becomes known, its
/// file is renamed in place without losing written audio.
///
/// File I/O happens on a dedicated worker thread behind a bounded queue,
/// so a slow disk cannot stall tick dispatch: if the queue fills, whole
/// ticks are dropped, counted and reported, never silently discarded.
///
/// Files are finalised (header rewritten with the true data size) when
/// the driver disconnects; the recorder may then be reused, opening
/// fresh files on the next audio.
pub struct WavRecorder {
    tx: Sender<WorkerMessage>,
    dropped: Arc<AtomicU64>,
    dir: PathBuf,
}

enum WorkerMessage {
    Tick {
        speaking: Vec<(u32, Option<Vec<i16>>)>,
        silent: Vec<u32>,
    },
    Identity {
        ssrc: u32,
        user_id: UserId,
    },
    Finalise {
        ack: Sender<IoResult<()>>,
    },
}

impl WavRecorder {
    /// Creates a recorder which writes per-source files under `dir`,
    /// creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> IoResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let (tx, rx) = flume::bounded(RECORDER_QUEUE_LEN);
        let worker_dir = dir.clone();
        thread::spawn(move || Worker::new(worker_dir).run(rx));

        Ok(Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            dir,
        })
    }

    /// Directory this recorder writes into.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Number of whole ticks dropped because the worker queue was full.
    #[must_use]
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Receiver for WavRecorder {
    async fn voice_tick(&self, tick: &VoiceTick) -> Result<(), ReceiverError> {
        let message = WorkerMessage::Tick {
            speaking: tick
                .speaking
                .iter()
                .map(|(ssrc, data)| (*ssrc, data.decoded_voice.clone()))
                .collect(),
            silent: tick.silent.iter().copied().collect(),
        };

        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(ReceiverError::Backlogged)
            },
            Err(TrySendError::Disconnected(_)) => {
                Err(ReceiverError::Other("recorder worker terminated".into()))
            },
        }
    }

    async fn speaking_update(&self, update: &SpeakingUpdate) -> Result<(), ReceiverError> {
        if let Some(user_id) = update.user_id {
            self.tx
                .send_async(WorkerMessage::Identity {
                    ssrc: update.ssrc,
                    user_id,
                })
                .await
                .map_err(|_| ReceiverError::Other("recorder worker terminated".into()))?;
        }

        Ok(())
    }

    async fn driver_disconnect(&self) -> Result<(), ReceiverError> {
        let (ack, done) = flume::bounded(1);

        self.tx
            .send_async(WorkerMessage::Finalise { ack })
            .await
            .map_err(|_| ReceiverError::Other("recorder worker terminated".into()))?;

        done.recv_async()
            .await
            .map_err(|_| ReceiverError::Other("recorder worker terminated".into()))?
            .map_err(ReceiverError::Io)
    }
}

/// One open output file and its running byte count.
struct SsrcFile {
    file: fs::File,
    path: PathBuf,
    data_len: u32,
    named_user: Option<UserId>,
}

struct Worker {
    dir: PathBuf,
    files: HashMap<u32, SsrcFile>,
    known: HashMap<u32, UserId>,
    silence: Vec<u8>,
}

impl Worker {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: HashMap::new(),
            known: HashMap::new(),
            silence: vec![0; STEREO_FRAME_BYTE_SIZE],
        }
    }

    fn run(mut self, rx: MessageReceiver<WorkerMessage>) {
        while let Ok(message) = rx.recv() {
            match message {
                WorkerMessage::Tick { speaking, silent } => {
                    for (ssrc, pcm) in speaking {
                        if let Err(e) = self.write_chunk(ssrc, pcm.as_deref()) {
                            error!("Failed to record chunk for ssrc {ssrc}: {e}.");
                        }
                    }

                    // Silence-fill keeps already-open files aligned with
                    // the speakers; unseen silent sources open nothing.
                    for ssrc in silent {
                        if self.files.contains_key(&ssrc) {
                            if let Err(e) = self.write_chunk(ssrc, None) {
                                error!("Failed to record silence for ssrc {ssrc}: {e}.");
                            }
                        }
                    }
                },
                WorkerMessage::Identity { ssrc, user_id } => {
                    self.known.insert(ssrc, user_id);
                    if let Err(e) = self.apply_identity(ssrc, user_id) {
                        error!("Failed to rename recording for ssrc {ssrc}: {e}.");
                    }
                },
                WorkerMessage::Finalise { ack } => {
                    let _ = ack.send(self.finalise());
                },
            }
        }
    }

    fn write_chunk(&mut self, ssrc: u32, pcm: Option<&[i16]>) -> IoResult<()> {
        if !self.files.contains_key(&ssrc) {
            let named_user = self.known.get(&ssrc).copied();
            let path = self.dir.join(file_name(ssrc, named_user));

            let mut file = fs::File::create(&path)?;
            write_wav_header(&mut file, 0)?;
            info!("Created recording file {}.", path.display());

            self.files.insert(
                ssrc,
                SsrcFile {
                    file,
                    path,
                    data_len: 0,
                    named_user,
                },
            );
        }

        let entry = self.files.get_mut(&ssrc).unwrap();

        let bytes = match pcm {
            Some(pcm) => {
                let mut bytes = vec![0u8; pcm.len() * 2];
                LittleEndian::write_i16_into(pcm, &mut bytes);
                bytes
            },
            None => self.silence.clone(),
        };

        entry.file.write_all(&bytes)?;
        entry.data_len += bytes.len() as u32;

        Ok(())
    }

    /// Renames an open recording once its owner is known. The handle is
    /// kept open throughout, so written audio is never lost.
    fn apply_identity(&mut self, ssrc: u32, user_id: UserId) -> IoResult<()> {
        let Some(entry) = self.files.get_mut(&ssrc) else {
            return Ok(());
        };

        if entry.named_user == Some(user_id) {
            return Ok(());
        }

        let new_path = self.dir.join(file_name(ssrc, Some(user_id)));
        fs::rename(&entry.path, &new_path)?;
        info!("Renamed recording file to {}.", new_path.display());

        entry.path = new_path;
        entry.named_user = Some(user_id);

        Ok(())
    }

    fn finalise(&mut self) -> IoResult<()> {
        let mut result = Ok(());

        for (ssrc, mut entry) in self.files.drain() {
            let finalised = entry
                .file
                .seek(SeekFrom::Start(0))
                .and_then(|_| write_wav_header(&mut entry.file, entry.data_len))
                .and_then(|()| entry.file.flush());

            match finalised {
                Ok(()) => info!(
                    "Finalised recording for ssrc {ssrc}: {} bytes.",
                    entry.data_len
                ),
                Err(e) => {
                    error!("Failed to finalise recording for ssrc {ssrc}: {e}.");
                    if result.is_ok() {
                        result = Err(e);
                    }
                },
            }
        }

        self.known.clear();

        result
    }
}

fn file_name(ssrc: u32, user: Option<UserId>) -> String {
    match user {
        Some(user) => format!("ssrc_{ssrc}_user_{user}.wav"),
        None => format!("ssrc_{ssrc}_user_unknown.wav"),
    }
}

/// Emits the fixed 44-byte PCM WAV header.
///
/// Written twice per file: once as a placeholder with `data_len = 0` at
/// creation, and once finalised with the true byte count at teardown.
fn write_wav_header(mut w: impl Write, data_len: u32) -> IoResult<()> {
    let block_align = (CHANNEL_COUNT * SAMPLE_BITS / 8) as u16;
    let byte_rate = SAMPLE_RATE_RAW as u32 * u32::from(block_align);

    w.write_all(b"RIFF")?;
    w.write_u32::<LittleEndian>(WAV_HEADER_LEN - 8 + data_len)?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_u32::<LittleEndian>(16)?;
    w.write_u16::<LittleEndian>(1)?;
    w.write_u16::<LittleEndian>(CHANNEL_COUNT as u16)?;
    w.write_u32::<LittleEndian>(SAMPLE_RATE_RAW as u32)?;
    w.write_u32::<LittleEndian>(byte_rate)?;
    w.write_u16::<LittleEndian>(block_align)?;
    w.write_u16::<LittleEndian>(SAMPLE_BITS as u16)?;

    w.write_all(b"data")?;
    w.write_u32::<LittleEndian>(data_len)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receive::VoiceData;
    use std::collections::BTreeMap;

    fn tick_with(speaking: &[(u32, Option<Vec<i16>>)], silent: &[u32]) -> VoiceTick {
        VoiceTick {
            speaking: speaking
                .iter()
                .map(|(ssrc, pcm)| {
                    (
                        *ssrc,
                        VoiceData {
                            packet: None,
                            decoded_voice: pcm.clone(),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
            silent: silent.iter().copied().collect(),
        }
    }

    fn frame_of(value: i16) -> Vec<i16> {
        vec![value; STEREO_FRAME_SIZE]
    }

    fn header_fields(bytes: &[u8]) -> (u32, u32) {
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[36..40], b"data");

        let file_size = LittleEndian::read_u32(&bytes[4..8]);
        let data_size = LittleEndian::read_u32(&bytes[40..44]);

        (file_size, data_size)
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn finalised_header_matches_written_data() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = WavRecorder::new(dir.path().join("session")).unwrap();

        for _ in 0..3 {
            recorder
                .voice_tick(&tick_with(&[(11, Some(frame_of(100)))], &[]))
                .await
                .unwrap();
        }
        recorder.driver_disconnect().await.unwrap();

        let bytes = fs::read(recorder.path().join("ssrc_11_user_unknown.wav")).unwrap();
        let expected_data = 3 * STEREO_FRAME_BYTE_SIZE as u32;

        let (file_size, data_size) = header_fields(&bytes);
        assert_eq!(data_size, expected_data);
        assert_eq!(file_size, 36 + expected_data);
        assert_eq!(bytes.len() as u32, WAV_HEADER_LEN + expected_data);

        // First sample of the data region round-trips.
        assert_eq!(LittleEndian::read_i16(&bytes[44..46]), 100);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn sources_first_seen_together_stay_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = WavRecorder::new(dir.path().join("session")).unwrap();

        // Both sources appear in the first tick; the second then goes
        // silent, and finally vanishes while the first keeps speaking.
        recorder
            .voice_tick(&tick_with(
                &[(1, Some(frame_of(7))), (2, Some(frame_of(9)))],
                &[],
            ))
            .await
            .unwrap();

        for _ in 0..2 {
            recorder
                .voice_tick(&tick_with(&[(1, Some(frame_of(7)))], &[2]))
                .await
                .unwrap();
        }

        // A raw-only packet (no decoded audio) is silence-filled too.
        recorder
            .voice_tick(&tick_with(&[(1, None), (2, Some(frame_of(9)))], &[]))
            .await
            .unwrap();

        recorder.driver_disconnect().await.unwrap();

        let first = fs::read(recorder.path().join("ssrc_1_user_unknown.wav")).unwrap();
        let second = fs::read(recorder.path().join("ssrc_2_user_unknown.wav")).unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(first.len() as u32, WAV_HEADER_LEN + 4 * STEREO_FRAME_BYTE_SIZE as u32);
        assert_eq!(header_fields(&first), header_fields(&second));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn identity_discovery_renames_without_losing_audio() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = WavRecorder::new(dir.path().join("session")).unwrap();

        recorder
            .voice_tick(&tick_with(&[(5, Some(frame_of(3)))], &[]))
            .await
            .unwrap();

        recorder
            .speaking_update(&SpeakingUpdate {
                ssrc: 5,
                user_id: Some(UserId(777)),
                speaking: true,
            })
            .await
            .unwrap();

        recorder
            .voice_tick(&tick_with(&[(5, Some(frame_of(3)))], &[]))
            .await
            .unwrap();
        recorder.driver_disconnect().await.unwrap();

        assert!(!recorder.path().join("ssrc_5_user_unknown.wav").exists());

        let bytes = fs::read(recorder.path().join("ssrc_5_user_777.wav")).unwrap();
        let (_, data_size) = header_fields(&bytes);
        assert_eq!(data_size, 2 * STEREO_FRAME_BYTE_SIZE as u32);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn identity_known_before_first_audio_names_file_directly() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = WavRecorder::new(dir.path().join("session")).unwrap();

        recorder
            .speaking_update(&SpeakingUpdate {
                ssrc: 8,
                user_id: Some(UserId(42)),
                speaking: true,
            })
            .await
            .unwrap();

        recorder
            .voice_tick(&tick_with(&[(8, Some(frame_of(1)))], &[]))
            .await
            .unwrap();
        recorder.driver_disconnect().await.unwrap();

        assert!(recorder.path().join("ssrc_8_user_42.wav").exists());
    }
}
