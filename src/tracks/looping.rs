/// Looping behaviour for a [`Track`].
///
/// [`Track`]: super::Track
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoopState {
    /// Track will replay endlessly until its loop state is changed or
    /// it is manually stopped.
    Infinite,

    /// Track will play `n` more complete passes of its source, counting
    /// the pass currently in progress.
    ///
    /// `Finite(1)` is the `Default`, playing a source exactly once.
    /// `Finite(0)` ends the track at the next pass boundary.
    Finite(usize),
}

impl Default for LoopState {
    fn default() -> Self {
        Self::Finite(1)
    }
}
