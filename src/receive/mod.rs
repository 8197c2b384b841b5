//! Consumption of inbound voice data.
//!
//! Implement [`Receiver`] and register it with
//! [`Driver::add_receiver`] to observe every [`VoiceTick`], derived
//! speaking-state edges, and driver lifecycle transitions. Only
//! [`Receiver::voice_tick`] is mandatory; the remaining methods default
//! to no-ops.
//!
//! Receivers run inside the driver's sequential dispatch loop: a receiver
//! which needs to perform blocking work (such as file I/O) should hand it
//! to an internal queue or worker rather than stall the loop, as
//! [`WavRecorder`] does.
//!
//! [`Driver::add_receiver`]: crate::driver::Driver::add_receiver

mod data;
mod recorder;

pub use self::{data::*, recorder::WavRecorder};

use crate::id::UserId;
use async_trait::async_trait;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
};

/// A speaking-state transition for one source, derived from tick contents.
///
/// "Started" fires on the tick where a source first produces audio after
/// being absent or silent; "stopped" fires when it transitions into the
/// silent set or disappears. Neither fires more than once per contiguous
/// run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct SpeakingUpdate {
    /// Synchronisation source of the transitioning stream.
    pub ssrc: u32,
    /// The owning user, where the platform has identified one.
    pub user_id: Option<UserId>,
    /// Whether this source has started (`true`) or stopped (`false`)
    /// producing audio.
    pub speaking: bool,
}

/// Handler for inbound voice data and driver lifecycle signals.
///
/// All methods receive `&self`: receivers are shared with the dispatch
/// loop, and manage any interior state themselves.
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Called once per engine time-slice with all sources' audio.
    async fn voice_tick(&self, tick: &VoiceTick) -> Result<(), ReceiverError>;

    /// Called when a source starts or stops producing audio.
    async fn speaking_update(&self, _update: &SpeakingUpdate) -> Result<(), ReceiverError> {
        Ok(())
    }

    /// Called when the driver successfully connects to a voice channel.
    async fn driver_connect(&self) -> Result<(), ReceiverError> {
        Ok(())
    }

    /// Called when the driver disconnects, before session resources are
    /// released.
    async fn driver_disconnect(&self) -> Result<(), ReceiverError> {
        Ok(())
    }

    /// Called when the driver recovers its transport after a network
    /// error. SSRC assignments are not stable across this boundary.
    async fn driver_reconnect(&self) -> Result<(), ReceiverError> {
        Ok(())
    }
}

/// Failure raised by a [`Receiver`] during dispatch.
///
/// These are contained per receiver: the dispatcher logs the error and
/// continues delivering to the remaining receivers, and the faulty
/// receiver keeps receiving future events.
#[derive(Debug)]
#[non_exhaustive]
pub enum ReceiverError {
    /// An I/O fault inside the receiver.
    Io(IoError),
    /// The receiver's internal queue was full, and the delivered data
    /// was dropped rather than stalling the dispatch loop.
    Backlogged,
    /// Any other receiver-specific failure.
    Other(Box<dyn Error + Send + Sync>),
}

impl Display for ReceiverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "receiver failed: ")?;
        match self {
            ReceiverError::Io(e) => write!(f, "i/o failure: {e}"),
            ReceiverError::Backlogged => write!(f, "internal queue full, data dropped"),
            ReceiverError::Other(e) => write!(f, "{e}"),
        }
    }
}

impl Error for ReceiverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReceiverError::Io(e) => Some(e),
            ReceiverError::Other(e) => Some(e.as_ref()),
            ReceiverError::Backlogged => None,
        }
    }
}

impl From<IoError> for ReceiverError {
    fn from(e: IoError) -> Self {
        ReceiverError::Io(e)
    }
}
