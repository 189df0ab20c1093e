//! Registry Store
//!
//! Holds the record map, the used-key set and the event journal behind one
//! lock. Mutations run as transactions: the closure stages changes against a
//! read view of committed state, and the staged changes are applied in one
//! step only if the closure returns `Ok`. Holding the write lock for the whole
//! transaction gives every mutation a place in a single total order.

use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::registry::{
    ClientRecord, EventSink, HardwareKeyFingerprint, Identity, RegistryEvent, RegistryResult,
    SequencedEvent,
};

/// Default number of journal entries retained
pub const DEFAULT_JOURNAL_CAPACITY: usize = 100_000;

const BROADCAST_CAPACITY: usize = 1024;

/// Committed registry state
#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    records: HashMap<Identity, ClientRecord>,
    used_keys: HashSet<HardwareKeyFingerprint>,
    journal: VecDeque<SequencedEvent>,
    sequence: u64,
}

impl RegistryState {
    pub fn record(&self, identity: &Identity) -> Option<&ClientRecord> {
        self.records.get(identity)
    }

    pub fn records(&self) -> impl Iterator<Item = &ClientRecord> {
        self.records.values()
    }

    pub fn is_key_used(&self, fingerprint: &HardwareKeyFingerprint) -> bool {
        self.used_keys.contains(fingerprint)
    }

    pub fn used_key_count(&self) -> usize {
        self.used_keys.len()
    }

    /// Sequence number of the most recent event, 0 before any commit
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn journal(&self) -> &VecDeque<SequencedEvent> {
        &self.journal
    }

    fn apply(&mut self, staged: StagedChanges, journal_capacity: usize) -> Vec<SequencedEvent> {
        self.records.extend(staged.records);
        self.used_keys.extend(staged.keys);

        let recorded_at = Utc::now();
        let mut committed = Vec::with_capacity(staged.events.len());
        for event in staged.events {
            self.sequence += 1;
            let sequenced = SequencedEvent {
                sequence: self.sequence,
                recorded_at,
                event,
            };
            self.journal.push_back(sequenced.clone());
            committed.push(sequenced);
        }

        while self.journal.len() > journal_capacity {
            self.journal.pop_front();
        }

        committed
    }
}

#[derive(Debug, Default)]
struct StagedChanges {
    records: HashMap<Identity, ClientRecord>,
    keys: HashSet<HardwareKeyFingerprint>,
    events: Vec<RegistryEvent>,
}

/// Staging area for one mutation.
///
/// Reads see staged changes layered over committed state.
pub(crate) struct Transaction<'a> {
    base: &'a RegistryState,
    staged: StagedChanges,
}

impl<'a> Transaction<'a> {
    fn new(base: &'a RegistryState) -> Self {
        Self {
            base,
            staged: StagedChanges::default(),
        }
    }

    pub(crate) fn record(&self, identity: &Identity) -> Option<&ClientRecord> {
        self.staged
            .records
            .get(identity)
            .or_else(|| self.base.record(identity))
    }

    pub(crate) fn is_key_used(&self, fingerprint: &HardwareKeyFingerprint) -> bool {
        self.staged.keys.contains(fingerprint) || self.base.is_key_used(fingerprint)
    }

    pub(crate) fn put_record(&mut self, record: ClientRecord) {
        self.staged.records.insert(record.identity.clone(), record);
    }

    pub(crate) fn bind_key(&mut self, fingerprint: HardwareKeyFingerprint) {
        self.staged.keys.insert(fingerprint);
    }

    pub(crate) fn emit(&mut self, event: RegistryEvent) {
        self.staged.events.push(event);
    }

    fn into_staged(self) -> StagedChanges {
        self.staged
    }
}

/// Shared, transactional registry state
pub(crate) struct RegistryStore {
    state: RwLock<RegistryState>,
    journal_capacity: usize,
    sinks: Vec<Arc<dyn EventSink>>,
    broadcaster: broadcast::Sender<SequencedEvent>,
}

impl RegistryStore {
    pub(crate) fn new(journal_capacity: usize) -> Self {
        let (broadcaster, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            state: RwLock::new(RegistryState::default()),
            journal_capacity: journal_capacity.max(1),
            sinks: Vec::new(),
            broadcaster,
        }
    }

    pub(crate) fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.broadcaster.subscribe()
    }

    /// Run a mutation atomically.
    ///
    /// On `Err` nothing staged by `f` is applied and no event is published.
    pub(crate) async fn transact<T, F>(&self, f: F) -> RegistryResult<(T, Vec<SequencedEvent>)>
    where
        F: FnOnce(&mut Transaction<'_>) -> RegistryResult<T>,
    {
        let mut state = self.state.write().await;

        let (value, staged) = {
            let mut tx = Transaction::new(&state);
            let value = f(&mut tx)?;
            (value, tx.into_staged())
        };

        let committed = state.apply(staged, self.journal_capacity);

        for event in &committed {
            for sink in &self.sinks {
                sink.publish(event);
            }
            // No receivers is not an error
            let _ = self.broadcaster.send(event.clone());
        }

        debug!(
            events = committed.len(),
            sequence = state.sequence(),
            "Committed registry transaction"
        );

        Ok((value, committed))
    }

    /// Run a read against committed state
    pub(crate) async fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&RegistryState) -> T,
    {
        let state = self.state.read().await;
        f(&state)
    }
}

impl Default for RegistryStore {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryError;
    use std::sync::Mutex;

    fn record(identity: &str, key: u8) -> ClientRecord {
        ClientRecord {
            identity: Identity::new(identity),
            hardware_key_fingerprint: HardwareKeyFingerprint::from_bytes([key; 32]),
            reputation: 100,
            active: true,
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        seen: Mutex<Vec<u64>>,
    }

    impl EventSink for CollectingSink {
        fn publish(&self, event: &SequencedEvent) {
            self.seen.lock().unwrap().push(event.sequence);
        }
    }

    #[tokio::test]
    async fn test_commit_applies_all_changes() {
        let store = RegistryStore::default();
        let fp = HardwareKeyFingerprint::from_bytes([1; 32]);

        let (_, events) = store
            .transact(|tx| {
                tx.put_record(record("client_1", 1));
                tx.bind_key(fp);
                tx.emit(RegistryEvent::Registered {
                    identity: Identity::new("client_1"),
                    hardware_key_fingerprint: fp,
                });
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, 1);

        store
            .read(|state| {
                assert!(state.record(&Identity::new("client_1")).is_some());
                assert!(state.is_key_used(&fp));
                assert_eq!(state.journal().len(), 1);
                assert_eq!(state.sequence(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_state_untouched() {
        let store = RegistryStore::default();
        let fp = HardwareKeyFingerprint::from_bytes([2; 32]);

        let result: RegistryResult<((), _)> = store
            .transact(|tx| {
                tx.put_record(record("client_2", 2));
                tx.bind_key(fp);
                tx.emit(RegistryEvent::ReputationChanged {
                    identity: Identity::new("client_2"),
                    new_score: 10,
                });
                Err(RegistryError::ClientNotActive(Identity::new("client_2")))
            })
            .await;

        assert!(result.is_err());
        store
            .read(|state| {
                assert!(state.record(&Identity::new("client_2")).is_none());
                assert!(!state.is_key_used(&fp));
                assert!(state.journal().is_empty());
                assert_eq!(state.sequence(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn test_transaction_reads_its_own_writes() {
        let store = RegistryStore::default();
        let fp = HardwareKeyFingerprint::from_bytes([3; 32]);

        store
            .transact(|tx| {
                assert!(!tx.is_key_used(&fp));
                tx.bind_key(fp);
                assert!(tx.is_key_used(&fp));

                tx.put_record(record("client_3", 3));
                assert_eq!(tx.record(&Identity::new("client_3")).unwrap().reputation, 100);
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_journal_is_bounded() {
        let store = RegistryStore::new(2);

        for score in 0..5u8 {
            store
                .transact(|tx| {
                    tx.emit(RegistryEvent::ReputationChanged {
                        identity: Identity::new("client_4"),
                        new_score: score,
                    });
                    Ok(())
                })
                .await
                .unwrap();
        }

        store
            .read(|state| {
                assert_eq!(state.journal().len(), 2);
                assert_eq!(state.journal().front().unwrap().sequence, 4);
                assert_eq!(state.sequence(), 5);
            })
            .await;
    }

    #[tokio::test]
    async fn test_sinks_and_subscribers_see_commit_order() {
        let sink = Arc::new(CollectingSink::default());
        let mut store = RegistryStore::default();
        store.add_sink(sink.clone());
        let mut rx = store.subscribe();

        for _ in 0..3 {
            store
                .transact(|tx| {
                    tx.emit(RegistryEvent::Deactivated {
                        identity: Identity::new("client_5"),
                        reason: "test".to_string(),
                    });
                    Ok(())
                })
                .await
                .unwrap();
        }

        assert_eq!(*sink.seen.lock().unwrap(), vec![1, 2, 3]);
        for expected in 1..=3 {
            assert_eq!(rx.recv().await.unwrap().sequence, expected);
        }
    }
}
