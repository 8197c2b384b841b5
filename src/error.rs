//! Gateway and engine-connection error handling.

use std::{error::Error, fmt, io::Error as IoError};

/// Error returned when a manager or call handler fails to join,
/// leave, or otherwise operate upon a voice channel.
#[derive(Debug)]
#[non_exhaustive]
pub enum JoinError {
    /// Request to join was dropped, cancelled, or replaced.
    Dropped,
    /// No gateway connection was provided to send voice state
    /// update messages.
    NoSender,
    /// Tried to leave a [`Call`] which was not found.
    ///
    /// [`Call`]: crate::Call
    NoCall,
    /// A control operation required a completed voice connection.
    NotConnected,
    /// Connection details were not received from the platform in the
    /// time given in [the `Call`'s configuration].
    ///
    /// [the `Call`'s configuration]: crate::Config
    TimedOut,
    /// The driver failed to establish an engine session.
    Driver(ConnectionError),
}

impl JoinError {
    /// Indicates whether this failure may have left the platform gateway
    /// believing the account is still mid-join.
    ///
    /// Failure to leave before rejoining may cause further timeouts.
    #[must_use]
    pub fn should_leave_server(&self) -> bool {
        matches!(self, JoinError::TimedOut)
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to join voice channel: ")?;
        match self {
            JoinError::Dropped => write!(f, "request was cancelled/dropped"),
            JoinError::NoSender => write!(f, "no gateway destination"),
            JoinError::NoCall => write!(f, "tried to leave a non-existent call"),
            JoinError::NotConnected => write!(f, "no voice connection is live"),
            JoinError::TimedOut => write!(f, "gateway response timed out"),
            JoinError::Driver(e) => write!(f, "engine connection failure: {e}"),
        }
    }
}

impl Error for JoinError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            JoinError::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConnectionError> for JoinError {
    fn from(e: ConnectionError) -> Self {
        JoinError::Driver(e)
    }
}

/// Convenience type for gateway and call error handling.
pub type JoinResult<T> = Result<T, JoinError>;

/// Error returned when applying a voice-server update fails.
#[derive(Debug)]
#[non_exhaustive]
pub enum ServerUpdateError {
    /// The platform explicitly reported that no voice server is
    /// available for this session; any handshake in progress has been
    /// rolled back.
    NoVoiceServer,
}

impl fmt::Display for ServerUpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerUpdateError::NoVoiceServer => {
                write!(f, "platform reported no available voice server")
            },
        }
    }
}

impl Error for ServerUpdateError {}

/// Errors encountered while opening (or reopening) an engine session.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConnectionError {
    /// This connection attempt was replaced by a newer request.
    AttemptDiscarded,
    /// The engine reported an I/O fault while opening the session.
    Io(IoError),
    /// The engine did not produce a live session in the configured time.
    TimedOut,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to open engine session: ")?;
        match self {
            ConnectionError::AttemptDiscarded => write!(f, "attempt was discarded"),
            ConnectionError::Io(e) => write!(f, "i/o failure: {e}"),
            ConnectionError::TimedOut => write!(f, "timed out"),
        }
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConnectionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for ConnectionError {
    fn from(e: IoError) -> Self {
        ConnectionError::Io(e)
    }
}

/// Convenience type for engine-connection error handling.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

pub use crate::{
    receive::ReceiverError,
    tracks::{ControlError, TrackResult},
};
