//! kstate store: per-kind watch cache. Deltas from a watcher are coalesced, applied to
//! a mirror, and published as immutable snapshots through `ArcSwap` so scrapes read
//! without locks or network calls.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use kstate_core::{ListError, ObjectSnapshot, ResourceLister};
use kube::{Resource, ResourceExt};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const FLUSH_EVERY: Duration = Duration::from_millis(8);

/// One change notification for a single kind.
#[derive(Debug, Clone)]
pub enum Delta<K> {
    Applied(K),
    Deleted(K),
    /// Full relist; replaces the mirror and marks it synchronized.
    Restarted(Vec<K>),
    /// Transport fault reported by the watcher. Cleared by the next non-fault delta.
    Fault(String),
}

/// Mirror key; orders snapshots by namespace, then name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self { namespace: obj.namespace(), name: obj.name_any() }
    }
}

#[derive(Debug, Clone)]
pub enum Op<K> {
    Upsert(K),
    Remove,
}

/// Everything drained from the coalescer in one flush.
#[derive(Debug)]
pub struct Batch<K> {
    pub reset: Option<Vec<K>>,
    pub ops: Vec<(ObjectKey, Op<K>)>,
    /// `Some(Some(reason))` sets a fault, `Some(None)` clears it, `None` leaves it.
    pub fault: Option<Option<String>>,
}

impl<K> Batch<K> {
    pub fn is_empty(&self) -> bool {
        self.reset.is_none() && self.ops.is_empty() && self.fault.is_none()
    }
}

/// Coalescing queue keyed by object with FIFO order; the last op per key wins.
pub struct Coalescer<K> {
    map: FxHashMap<ObjectKey, Op<K>>,
    order: VecDeque<ObjectKey>,
    reset: Option<Vec<K>>,
    fault: Option<Option<String>>,
}

impl<K: Resource> Coalescer<K> {
    pub fn new() -> Self {
        Self { map: FxHashMap::default(), order: VecDeque::new(), reset: None, fault: None }
    }

    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() && self.reset.is_none() && self.fault.is_none() }

    pub fn push(&mut self, d: Delta<K>) {
        match d {
            Delta::Applied(o) => {
                self.fault = Some(None);
                self.enqueue(ObjectKey::of(&o), Op::Upsert(o));
            }
            Delta::Deleted(o) => {
                self.fault = Some(None);
                self.enqueue(ObjectKey::of(&o), Op::Remove);
            }
            Delta::Restarted(list) => {
                // A relist supersedes anything queued before it.
                self.map.clear();
                self.order.clear();
                self.reset = Some(list);
                self.fault = Some(None);
            }
            Delta::Fault(reason) => self.fault = Some(Some(reason)),
        }
    }

    fn enqueue(&mut self, key: ObjectKey, op: Op<K>) {
        if !self.map.contains_key(&key) {
            self.order.push_back(key.clone());
        }
        self.map.insert(key, op);
    }

    pub fn drain_ready(&mut self) -> Batch<K> {
        let mut ops = Vec::with_capacity(self.order.len());
        while let Some(key) = self.order.pop_front() {
            if let Some(op) = self.map.remove(&key) {
                ops.push((key, op));
            }
        }
        Batch { reset: self.reset.take(), ops, fault: self.fault.take() }
    }
}

impl<K: Resource> Default for Coalescer<K> {
    fn default() -> Self { Self::new() }
}

/// What readers see: the latest snapshot plus the cache's sync/fault state.
#[derive(Debug)]
pub struct Mirror<K> {
    pub synced: bool,
    pub fault: Option<String>,
    pub snapshot: Arc<ObjectSnapshot<K>>,
}

impl<K> Default for Mirror<K> {
    fn default() -> Self {
        Self { synced: false, fault: None, snapshot: Arc::new(ObjectSnapshot::default()) }
    }
}

/// Builds mirrors from batches.
pub struct MirrorBuilder<K> {
    epoch: u64,
    synced: bool,
    fault: Option<String>,
    items: BTreeMap<ObjectKey, Arc<K>>,
}

impl<K: Resource> MirrorBuilder<K> {
    pub fn new() -> Self {
        Self { epoch: 0, synced: false, fault: None, items: BTreeMap::new() }
    }

    pub fn epoch(&self) -> u64 { self.epoch }

    pub fn apply(&mut self, batch: Batch<K>) {
        if let Some(list) = batch.reset {
            self.items = list.into_iter().map(|o| (ObjectKey::of(&o), Arc::new(o))).collect();
            self.synced = true;
        }
        for (key, op) in batch.ops {
            match op {
                Op::Upsert(o) => {
                    self.items.insert(key, Arc::new(o));
                }
                Op::Remove => {
                    self.items.remove(&key);
                }
            }
        }
        if let Some(fault) = batch.fault {
            self.fault = fault;
        }
        self.epoch = self.epoch.saturating_add(1);
    }

    pub fn freeze(&self) -> Arc<Mirror<K>> {
        let items = self.items.values().cloned().collect();
        Arc::new(Mirror {
            synced: self.synced,
            fault: self.fault.clone(),
            snapshot: Arc::new(ObjectSnapshot::new(self.epoch, items)),
        })
    }
}

impl<K: Resource> Default for MirrorBuilder<K> {
    fn default() -> Self { Self::new() }
}

/// Read handle for one kind's mirror. Cheap to clone.
pub struct WatchCache<K> {
    kind: &'static str,
    mirror: Arc<ArcSwap<Mirror<K>>>,
    epoch_rx: watch::Receiver<u64>,
}

impl<K> Clone for WatchCache<K> {
    fn clone(&self) -> Self {
        Self { kind: self.kind, mirror: Arc::clone(&self.mirror), epoch_rx: self.epoch_rx.clone() }
    }
}

impl<K> WatchCache<K> {
    pub fn kind(&self) -> &'static str { self.kind }
    pub fn current(&self) -> Arc<Mirror<K>> { self.mirror.load_full() }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }
}

impl<K: Send + Sync> ResourceLister<K> for WatchCache<K> {
    fn list(&self) -> Result<Arc<ObjectSnapshot<K>>, ListError> {
        let m = self.mirror.load();
        if let Some(reason) = &m.fault {
            return Err(ListError::Faulted { kind: self.kind, reason: reason.clone() });
        }
        if !m.synced {
            return Err(ListError::NotSynced { kind: self.kind });
        }
        Ok(Arc::clone(&m.snapshot))
    }
}

fn publish<K: Resource>(
    kind: &'static str,
    builder: &mut MirrorBuilder<K>,
    batch: Batch<K>,
    mirror: &ArcSwap<Mirror<K>>,
    epoch_tx: &watch::Sender<u64>,
) {
    builder.apply(batch);
    let next = builder.freeze();
    let objects = next.snapshot.len();
    let epoch = next.snapshot.epoch;
    mirror.store(next);
    let _ = epoch_tx.send(epoch);
    metrics::counter!(INGEST_BATCHES, "resource" => kind).increment(1);
    metrics::gauge!(MIRROR_OBJECTS, "resource" => kind).set(objects as f64);
}

pub const INGEST_BATCHES: &str = "kstate_ingest_batches_total";
pub const MIRROR_OBJECTS: &str = "kstate_mirror_objects";

/// Help text for the ingest metrics. Call once after installing a recorder.
pub fn describe_ingest_metrics() {
    metrics::describe_counter!(INGEST_BATCHES, "Batches of watch deltas applied to the mirror");
    metrics::describe_gauge!(MIRROR_OBJECTS, "Objects in the published mirror");
}

/// Spawn the ingest loop for one kind. Returns the delta sender, the read handle, and
/// the task handle; the loop drains and exits once every sender is dropped.
pub fn spawn_ingest<K>(kind: &'static str, cap: usize) -> (mpsc::Sender<Delta<K>>, WatchCache<K>, JoinHandle<()>)
where
    K: Resource + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Delta<K>>(cap.max(1));
    let mirror = Arc::new(ArcSwap::from_pointee(Mirror::default()));
    let (epoch_tx, epoch_rx) = watch::channel(0u64);
    let mirror_clone = Arc::clone(&mirror);

    let handle = tokio::spawn(async move {
        let mut coalescer = Coalescer::new();
        let mut builder = MirrorBuilder::new();
        let mut ticker = tokio::time::interval(FLUSH_EVERY);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    match maybe {
                        Some(d) => coalescer.push(d),
                        None => {
                            debug!(kind, "delta channel closed; draining and exiting ingest loop");
                            let batch = coalescer.drain_ready();
                            if !batch.is_empty() {
                                publish(kind, &mut builder, batch, &mirror_clone, &epoch_tx);
                            }
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    let batch = coalescer.drain_ready();
                    if !batch.is_empty() {
                        publish(kind, &mut builder, batch, &mirror_clone, &epoch_tx);
                    }
                }
            }
        }
        info!(kind, epoch = builder.epoch(), "ingest loop stopped");
    });

    (tx, WatchCache { kind, mirror, epoch_rx }, handle)
}
