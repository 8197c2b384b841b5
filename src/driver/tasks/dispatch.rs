use crate::{
    id::UserId,
    model::payload::Speaking,
    receive::{Receiver, SpeakingUpdate, VoiceTick},
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::warn;

/// Fan-out of inbound engine events to registered receivers.
///
/// The dispatcher is owned by the session's core task and mutated only by
/// that task's sequential processing: no two ticks for one session are
/// ever handled concurrently. It tracks the previous tick's active-SSRC
/// set to derive speaking edges, and the SSRC→user map built from
/// speaking payloads.
pub(crate) struct Dispatcher {
    receivers: Vec<Arc<dyn Receiver>>,
    identities: HashMap<u32, Option<UserId>>,
    active: HashSet<u32>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            receivers: Vec::new(),
            identities: HashMap::new(),
            active: HashSet::new(),
        }
    }

    pub(crate) fn add_receiver(&mut self, receiver: Arc<dyn Receiver>) {
        self.receivers.push(receiver);
    }

    pub(crate) fn remove_receivers(&mut self) {
        self.receivers.clear();
    }

    /// Records an SSRC→user mapping from a speaking payload.
    ///
    /// Entries are never removed individually; the map is cleared
    /// wholesale on session teardown.
    pub(crate) fn speaking_state(&mut self, payload: &Speaking) {
        let entry = self.identities.entry(payload.ssrc).or_insert(None);
        if payload.user_id.is_some() {
            *entry = payload.user_id;
        }
    }

    /// Delivers one tick: derived speaking edges first, then the tick
    /// body, each to every receiver in registration order.
    pub(crate) async fn tick(&mut self, tick: &VoiceTick) {
        for ssrc in tick.speaking.keys() {
            self.identities.entry(*ssrc).or_insert(None);
        }

        let now_active: HashSet<u32> = tick.speaking.keys().copied().collect();

        let started: Vec<u32> = tick
            .speaking
            .keys()
            .filter(|ssrc| !self.active.contains(ssrc))
            .copied()
            .collect();

        let mut stopped: Vec<u32> = self.active.difference(&now_active).copied().collect();
        stopped.sort_unstable();

        self.active = now_active;

        for ssrc in started {
            self.fire_speaking_update(ssrc, true).await;
        }

        for ssrc in stopped {
            self.fire_speaking_update(ssrc, false).await;
        }

        for receiver in &self.receivers {
            if let Err(e) = receiver.voice_tick(tick).await {
                warn!("Receiver failed to handle voice tick: {e}.");
            }
        }
    }

    async fn fire_speaking_update(&self, ssrc: u32, speaking: bool) {
        let update = SpeakingUpdate {
            ssrc,
            user_id: self.identities.get(&ssrc).copied().flatten(),
            speaking,
        };

        for receiver in &self.receivers {
            if let Err(e) = receiver.speaking_update(&update).await {
                warn!("Receiver failed to handle speaking update: {e}.");
            }
        }
    }

    /// Closes out per-session receive state: every active source gets a
    /// final "stopped" edge, then the identity map and active set are
    /// cleared. SSRCs are not stable across transport sessions, so this
    /// runs on teardown, on transport loss, and when a session is
    /// replaced by a (re)join.
    pub(crate) async fn session_closed(&mut self) {
        let mut stopped: Vec<u32> = self.active.drain().collect();
        stopped.sort_unstable();

        for ssrc in stopped {
            self.fire_speaking_update(ssrc, false).await;
        }

        self.identities.clear();
    }

    pub(crate) async fn driver_connect(&self) {
        for receiver in &self.receivers {
            if let Err(e) = receiver.driver_connect().await {
                warn!("Receiver failed to handle connect: {e}.");
            }
        }
    }

    pub(crate) async fn driver_reconnect(&self) {
        for receiver in &self.receivers {
            if let Err(e) = receiver.driver_reconnect().await {
                warn!("Receiver failed to handle reconnect: {e}.");
            }
        }
    }

    pub(crate) async fn driver_disconnect(&self) {
        for receiver in &self.receivers {
            if let Err(e) = receiver.driver_disconnect().await {
                warn!("Receiver failed to handle disconnect: {e}.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receive::{ReceiverError, VoiceData};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[derive(Debug, Eq, PartialEq)]
    enum Seen {
        Edge(u32, Option<UserId>, bool),
        Tick(usize),
    }

    #[derive(Default)]
    struct Probe {
        seen: Mutex<Vec<Seen>>,
        fail_ticks: bool,
    }

    #[async_trait]
    impl Receiver for Probe {
        async fn voice_tick(&self, tick: &VoiceTick) -> Result<(), ReceiverError> {
            if self.fail_ticks {
                return Err(ReceiverError::Backlogged);
            }
            self.seen.lock().push(Seen::Tick(tick.speaking.len()));
            Ok(())
        }

        async fn speaking_update(&self, update: &SpeakingUpdate) -> Result<(), ReceiverError> {
            self.seen
                .lock()
                .push(Seen::Edge(update.ssrc, update.user_id, update.speaking));
            Ok(())
        }
    }

    fn tick_of(speaking: &[u32], silent: &[u32]) -> VoiceTick {
        VoiceTick {
            speaking: speaking
                .iter()
                .map(|ssrc| (*ssrc, VoiceData::default()))
                .collect::<BTreeMap<_, _>>(),
            silent: silent.iter().copied().collect(),
        }
    }

    #[tokio::test]
    async fn speaking_edges_fire_once_per_run() {
        let mut dispatcher = Dispatcher::new();
        let probe = Arc::new(Probe::default());
        dispatcher.add_receiver(probe.clone());

        // Three speaking ticks, two silent, then speech again.
        for _ in 0..3 {
            dispatcher.tick(&tick_of(&[7], &[])).await;
        }
        for _ in 0..2 {
            dispatcher.tick(&tick_of(&[], &[7])).await;
        }
        dispatcher.tick(&tick_of(&[7], &[])).await;

        let seen = probe.seen.lock();
        let edges: Vec<&Seen> = seen
            .iter()
            .filter(|s| matches!(s, Seen::Edge(..)))
            .collect();

        assert_eq!(
            edges,
            vec![
                &Seen::Edge(7, None, true),
                &Seen::Edge(7, None, false),
                &Seen::Edge(7, None, true),
            ]
        );
    }

    #[tokio::test]
    async fn identity_learned_from_speaking_payload() {
        let mut dispatcher = Dispatcher::new();
        let probe = Arc::new(Probe::default());
        dispatcher.add_receiver(probe.clone());

        dispatcher.speaking_state(&Speaking {
            ssrc: 5,
            user_id: Some(UserId(900)),
            speaking: true,
        });
        dispatcher.tick(&tick_of(&[5], &[])).await;

        assert_eq!(
            probe.seen.lock()[0],
            Seen::Edge(5, Some(UserId(900)), true)
        );
    }

    #[tokio::test]
    async fn failing_receiver_does_not_block_later_receivers() {
        let mut dispatcher = Dispatcher::new();
        let faulty = Arc::new(Probe {
            fail_ticks: true,
            ..Probe::default()
        });
        let healthy = Arc::new(Probe::default());
        dispatcher.add_receiver(faulty.clone());
        dispatcher.add_receiver(healthy.clone());

        dispatcher.tick(&tick_of(&[1, 2], &[])).await;
        dispatcher.tick(&tick_of(&[1, 2], &[])).await;

        let ticks_seen = healthy
            .seen
            .lock()
            .iter()
            .filter(|s| matches!(s, Seen::Tick(2)))
            .count();
        assert_eq!(ticks_seen, 2);

        // The faulty receiver still gets speaking updates and later ticks.
        assert!(faulty
            .seen
            .lock()
            .iter()
            .any(|s| matches!(s, Seen::Edge(1, _, true))));
    }

    #[tokio::test]
    async fn session_close_ends_runs_and_forgets_identities() {
        let mut dispatcher = Dispatcher::new();
        let probe = Arc::new(Probe::default());
        dispatcher.add_receiver(probe.clone());

        dispatcher.speaking_state(&Speaking {
            ssrc: 3,
            user_id: Some(UserId(42)),
            speaking: true,
        });
        dispatcher.tick(&tick_of(&[3], &[])).await;
        dispatcher.session_closed().await;

        // Same ssrc on the next session: a fresh run, with no stale identity.
        dispatcher.tick(&tick_of(&[3], &[])).await;

        let seen = probe.seen.lock();
        let edges: Vec<&Seen> = seen
            .iter()
            .filter(|s| matches!(s, Seen::Edge(..)))
            .collect();
        assert_eq!(
            edges,
            vec![
                &Seen::Edge(3, Some(UserId(42)), true),
                &Seen::Edge(3, Some(UserId(42)), false),
                &Seen::Edge(3, None, true),
            ]
        );
    }
}
