pub(crate) mod dispatch;
pub(crate) mod message;
pub(crate) mod mixer;

use self::{dispatch::Dispatcher, message::*, mixer::Mixer};
use crate::{
    driver::{Engine, EngineEvent, EngineSession},
    error::{ConnectionError, ConnectionResult},
    tracks::TrackQueue,
    Config,
    ConnectionInfo,
};
use flume::{Receiver, Sender};
use std::sync::Arc;
use tokio::time;
use tracing::{debug, info, trace, warn};

/// Spawns the session's core task, returning its control channel.
///
/// The core task is the *only* consumer of control messages and engine
/// events for one session: handshake results, ticks, and control calls
/// are applied as a single sequential stream of steps, so no control
/// call is ever interleaved mid-tick.
pub(crate) fn start(config: Config, engine: Arc<dyn Engine>, queue: TrackQueue) -> Sender<CoreMessage> {
    let (tx, rx) = flume::unbounded();

    tokio::spawn(runner(config, engine, queue, rx));

    tx
}

enum Incoming {
    Core(CoreMessage),
    Engine(EngineEvent),
}

async fn runner(
    config: Config,
    engine: Arc<dyn Engine>,
    queue: TrackQueue,
    rx: Receiver<CoreMessage>,
) {
    let mut dispatcher = Dispatcher::new();
    let mut mixer = Mixer::new(&config);
    let mut conn: Option<Live> = None;

    loop {
        let incoming = if let Some(live) = conn.as_ref() {
            tokio::select! {
                biased;
                msg = rx.recv_async() => match msg {
                    Ok(msg) => Incoming::Core(msg),
                    Err(_) => break,
                },
                evt = live.session.events.recv_async() => match evt {
                    Ok(evt) => Incoming::Engine(evt),
                    // The engine hung up without a drop notice: treat as
                    // transport loss all the same.
                    Err(_) => Incoming::Engine(EngineEvent::Dropped),
                },
            }
        } else {
            match rx.recv_async().await {
                Ok(msg) => Incoming::Core(msg),
                Err(_) => break,
            }
        };

        match incoming {
            Incoming::Core(CoreMessage::Connect { info, tx }) => {
                if let Some(old) = conn.take() {
                    // A (re)join replaces the old session; its ssrc state
                    // is stale from here on.
                    dispatcher.session_closed().await;
                    drop(old);
                }

                match open_session(engine.as_ref(), &info, &config).await {
                    Ok(session) => {
                        info!("Connected to endpoint {}.", info.endpoint);
                        conn = Some(Live { info, session });
                        dispatcher.driver_connect().await;
                        let _ = tx.send(Ok(()));
                    },
                    Err(e) => {
                        warn!("Engine connection failed: {e}.");
                        let _ = tx.send(Err(e));
                    },
                }
            },
            Incoming::Core(CoreMessage::Leave { ack }) => {
                if let Some(live) = conn.take() {
                    // Receivers see the disconnect before any session
                    // resources are released.
                    dispatcher.session_closed().await;
                    dispatcher.driver_disconnect().await;
                    drop(live);
                    info!("Session released.");
                }

                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            },
            Incoming::Core(CoreMessage::SetMute(mute)) => {
                mixer.mute = mute;
            },
            Incoming::Core(CoreMessage::AddTrack(context)) => {
                mixer.add(context);
            },
            Incoming::Core(CoreMessage::StopTracks) => {
                mixer.clear();
                queue.stop();
            },
            Incoming::Core(CoreMessage::AddReceiver(receiver)) => {
                dispatcher.add_receiver(receiver);
            },
            Incoming::Core(CoreMessage::RemoveReceivers) => {
                dispatcher.remove_receivers();
            },
            Incoming::Engine(EngineEvent::Tick(tick)) => {
                let live = conn.as_ref().expect("Tick outside of a live session.");

                for uuid in mixer.advance(&live.session.audio) {
                    queue.advance(uuid);
                }

                dispatcher.tick(&tick).await;
            },
            Incoming::Engine(EngineEvent::Speaking(payload)) => {
                dispatcher.speaking_state(&payload);
            },
            Incoming::Engine(EngineEvent::Dropped) => {
                let Some(live) = conn.take() else {
                    continue;
                };

                warn!("Transport lost; attempting to reconnect.");
                dispatcher.session_closed().await;

                match reopen_session(engine.as_ref(), &live.info, &config).await {
                    Some(session) => {
                        info!("Transport recovered.");
                        conn = Some(Live {
                            info: live.info,
                            session,
                        });
                        dispatcher.driver_reconnect().await;
                    },
                    None => {
                        warn!("Reconnection attempts exhausted; session released.");
                        dispatcher.driver_disconnect().await;
                    },
                }
            },
        }
    }

    trace!("Core task exited.");
}

async fn open_session(
    engine: &dyn Engine,
    info: &ConnectionInfo,
    config: &Config,
) -> ConnectionResult<EngineSession> {
    match config.driver_timeout {
        Some(t) => time::timeout(t, engine.open(info, config))
            .await
            .map_err(|_| ConnectionError::TimedOut)?,
        None => engine.open(info, config).await,
    }
}

/// Retries a lost session under [`Config::driver_retry`], returning
/// `None` once the attempt budget is spent.
async fn reopen_session(
    engine: &dyn Engine,
    info: &ConnectionInfo,
    config: &Config,
) -> Option<EngineSession> {
    let retry = &config.driver_retry;
    let mut attempts = 0usize;
    let mut last_wait = None;

    loop {
        match open_session(engine, info, config).await {
            Ok(session) => return Some(session),
            Err(e) => {
                debug!("Reconnect attempt {} failed: {e}.", attempts + 1);

                if retry.retry_limit.map_or(false, |limit| attempts >= limit) {
                    return None;
                }

                let wait = retry.strategy.retry_in(last_wait);
                last_wait = Some(wait);
                time::sleep(wait).await;
                attempts += 1;
            },
        }
    }
}
