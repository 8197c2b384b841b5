use super::{PlayMode, Track, TrackHandle, TrackResult};
use parking_lot::Mutex;
use std::{collections::VecDeque, ops::Deref, sync::Arc};
use tracing::{info, warn};
use uuid::Uuid;

/// A simple queue for several audio sources, designed to play in sequence.
///
/// The queue is strictly serial: one track plays at a time, and the next
/// begins when the playback core reports that the head has ended, errored,
/// or been stopped. Tracks played outside the queue (via [`Driver::play`])
/// mix concurrently and never touch queue state.
///
/// [`Driver::play`]: crate::driver::Driver::play
#[derive(Clone, Debug, Default)]
pub struct TrackQueue {
    // NOTE: the choice of a parking lot mutex is quite deliberate
    inner: Arc<Mutex<TrackQueueCore>>,
}

/// Reference to a track which is known to be part of a queue.
///
/// Instances *should not* be moved from one queue to another.
#[derive(Debug)]
pub struct Queued(TrackHandle);

impl Deref for Queued {
    type Target = TrackHandle;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Queued {
    /// Clones the inner handle.
    #[must_use]
    pub fn handle(&self) -> TrackHandle {
        self.0.clone()
    }
}

/// Inner portion of a [`TrackQueue`].
///
/// This abstracts away thread-safety from the user, and offers a
/// convenient location to store further state if required.
#[derive(Debug, Default)]
struct TrackQueueCore {
    tracks: VecDeque<Queued>,
}

impl TrackQueue {
    /// Create a new, empty, track queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackQueueCore {
                tracks: VecDeque::new(),
            })),
        }
    }

    /// Registers a track in the queue before it is handed to the playback
    /// core, pausing it if another track is already at the head.
    pub(crate) fn add_raw(&self, track: &mut Track, handle: TrackHandle) {
        info!("Track added to queue.");
        let mut inner = self.inner.lock();

        if !inner.tracks.is_empty() {
            track.playing = PlayMode::Pause;
        }

        inner.tracks.push_back(Queued(handle));
    }

    /// Progresses the queue in response to the playback core reporting
    /// that track `ended` has finished.
    ///
    /// Users may remove, reorder, or dequeue+stop tracks at any time, so
    /// the queue only advances when the *head* is the ended track.
    pub(crate) fn advance(&self, ended: Uuid) {
        let mut inner = self.inner.lock();

        let front_ended = inner
            .tracks
            .front()
            .map_or(false, |queued| queued.uuid() == ended);

        if !front_ended {
            return;
        }

        let _old = inner.tracks.pop_front();

        info!("Queued track ended: {ended}.");
        info!("{} tracks remain.", inner.tracks.len());

        // Keep going until we find one track which works, or we run out.
        while let Some(new) = inner.tracks.front() {
            if new.play().is_ok() {
                break;
            }

            warn!("Track in queue couldn't be played...");
            let _ = inner.tracks.pop_front();
        }
    }

    /// Returns a handle to the currently playing track.
    #[must_use]
    pub fn current(&self) -> Option<TrackHandle> {
        let inner = self.inner.lock();

        inner.tracks.front().map(Queued::handle)
    }

    /// Attempts to remove a track from the specified index.
    pub fn dequeue(&self, index: usize) -> Option<Queued> {
        self.modify_queue(|vq| vq.remove(index))
    }

    /// Returns the number of tracks currently in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();

        inner.tracks.len()
    }

    /// Returns whether there are no tracks currently in the queue.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();

        inner.tracks.is_empty()
    }

    /// Allows modification of the inner queue (i.e., deletion, reordering).
    ///
    /// Users must be careful to `stop` removed tracks, so as to prevent
    /// resource leaks.
    pub fn modify_queue<F, O>(&self, func: F) -> O
    where
        F: FnOnce(&mut VecDeque<Queued>) -> O,
    {
        let mut inner = self.inner.lock();
        func(&mut inner.tracks)
    }

    /// Pause the track at the head of the queue.
    pub fn pause(&self) -> TrackResult<()> {
        let inner = self.inner.lock();

        if let Some(handle) = inner.tracks.front() {
            handle.pause()
        } else {
            Ok(())
        }
    }

    /// Resume the track at the head of the queue.
    pub fn resume(&self) -> TrackResult<()> {
        let inner = self.inner.lock();

        if let Some(handle) = inner.tracks.front() {
            handle.play()
        } else {
            Ok(())
        }
    }

    /// Stop the currently playing track, and clear the queue.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();

        for track in inner.tracks.drain(..) {
            // An error here just implies the track is already gone.
            let _ = track.stop();
        }
    }

    /// Skip to the next track in the queue, if it exists.
    pub fn skip(&self) -> TrackResult<()> {
        let inner = self.inner.lock();

        if let Some(handle) = inner.tracks.front() {
            handle.stop()
        } else {
            Ok(())
        }
    }

    /// Returns a snapshot of all currently queued track handles.
    #[must_use]
    pub fn current_queue(&self) -> Vec<TrackHandle> {
        let inner = self.inner.lock();

        inner.tracks.iter().map(Queued::handle).collect()
    }
}
