use crate::{
    driver::EngineSession,
    error::ConnectionResult,
    receive::Receiver,
    tracks::TrackContext,
    ConnectionInfo,
};
use flume::Sender;
use std::sync::Arc;

/// Requests from a [`Driver`] (or its `Call`) to the session's core task.
///
/// [`Driver`]: crate::driver::Driver
pub(crate) enum CoreMessage {
    Connect {
        info: ConnectionInfo,
        tx: Sender<ConnectionResult<()>>,
    },
    Leave {
        ack: Option<Sender<()>>,
    },
    SetMute(bool),
    AddTrack(TrackContext),
    StopTracks,
    AddReceiver(Arc<dyn Receiver>),
    RemoveReceivers,
}

/// One live engine session plus the info used to open it, retained so
/// transport loss can be retried without gateway involvement.
pub(crate) struct Live {
    pub(crate) info: ConnectionInfo,
    pub(crate) session: EngineSession,
}
