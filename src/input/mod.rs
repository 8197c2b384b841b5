//! Raw audio sources and the [`Input`] type fed to the playback core.
//!
//! The playback core consumes signed 16-bit little-endian interleaved
//! stereo PCM at 48 kHz (see [`constants`]); encoded formats are the
//! engine's concern and never cross this boundary. Sources which can
//! restart from their first sample report themselves as rewindable,
//! which is what makes a track loopable.
//!
//! [`constants`]: crate::constants

use std::{
    fs,
    io::{BufReader, Error as IoError, ErrorKind, Read, Result as IoResult, Seek, SeekFrom},
    path::PathBuf,
};

/// A pull-based producer of raw PCM for one track.
pub trait AudioSource: Send {
    /// Pulls the next run of PCM bytes into `buf`, returning how many
    /// bytes were written. `Ok(0)` signals the end of one complete pass
    /// of the source.
    fn read_pcm(&mut self, buf: &mut [u8]) -> IoResult<usize>;

    /// Whether this source can restart from its first sample.
    fn is_rewindable(&self) -> bool {
        false
    }

    /// Restarts the source from its first sample.
    fn rewind(&mut self) -> IoResult<()> {
        Err(IoError::new(
            ErrorKind::Unsupported,
            "audio source cannot rewind",
        ))
    }
}

/// An audio stream which can be handed to a driver as part of a track.
pub struct Input {
    pub(crate) source: Box<dyn AudioSource>,
}

impl Input {
    /// Wraps an existing boxed source.
    #[must_use]
    pub fn new(source: Box<dyn AudioSource>) -> Self {
        Self { source }
    }

    /// Whether the wrapped source supports repeated playback.
    #[must_use]
    pub fn is_rewindable(&self) -> bool {
        self.source.is_rewindable()
    }
}

impl<T: AudioSource + 'static> From<T> for Input {
    fn from(source: T) -> Self {
        Input::new(Box::new(source))
    }
}

/// A rewindable in-memory buffer of raw PCM bytes.
pub struct MemorySource {
    data: Vec<u8>,
    position: usize,
}

impl MemorySource {
    /// Creates a source over the given PCM bytes.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl AudioSource for MemorySource {
    fn read_pcm(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let remaining = &self.data[self.position..];
        let len = remaining.len().min(buf.len());
        buf[..len].copy_from_slice(&remaining[..len]);
        self.position += len;
        Ok(len)
    }

    fn is_rewindable(&self) -> bool {
        true
    }

    fn rewind(&mut self) -> IoResult<()> {
        self.position = 0;
        Ok(())
    }
}

/// A lazily-opened file of raw PCM bytes.
///
/// The file is opened when the playback core first pulls audio, so
/// missing files surface as a playback error rather than a construction
/// failure.
pub struct File {
    path: PathBuf,
    handle: Option<BufReader<fs::File>>,
}

impl File {
    /// Creates a source which will read from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: None,
        }
    }

    fn reader(&mut self) -> IoResult<&mut BufReader<fs::File>> {
        if self.handle.is_none() {
            self.handle = Some(BufReader::new(fs::File::open(&self.path)?));
        }

        Ok(self.handle.as_mut().unwrap())
    }
}

impl AudioSource for File {
    fn read_pcm(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.reader()?.read(buf)
    }

    fn is_rewindable(&self) -> bool {
        true
    }

    fn rewind(&mut self) -> IoResult<()> {
        if let Some(reader) = self.handle.as_mut() {
            reader.seek(SeekFrom::Start(0))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_rewinds_to_first_byte() {
        let mut source = MemorySource::new(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 4];

        assert_eq!(source.read_pcm(&mut buf).unwrap(), 4);
        assert_eq!(source.read_pcm(&mut buf).unwrap(), 0);

        source.rewind().unwrap();
        assert_eq!(source.read_pcm(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn missing_file_errors_on_first_read() {
        let mut source = File::new("/definitely/not/here.pcm");
        let mut buf = [0u8; 16];

        assert!(source.read_pcm(&mut buf).is_err());
    }
}
