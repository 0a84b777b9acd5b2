//! Fan-in barrier store
//!
//! Parts of a request returning to a pod with `expected_parts > 1` wait in a
//! bucket keyed by `(pod, request_id)` until all parts have arrived. Bucket
//! lifecycle: created by the first part, advanced by later parts, released
//! when the barrier is met, torn down by timeout, cancel or terminate.
//!
//! A bucket that expires or is cancelled leaves its key in a bounded
//! closed set; parts arriving later for that key are discarded.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mesh_config::defaults;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};
use types::Message;

use crate::time::secs_to_ns;

type BucketKey = (String, String);

#[derive(Debug)]
struct Bucket {
    parts: Vec<Message>,
    expected: u32,
    /// Absolute deadline in ns, `None` waits forever
    deadline_ns: Option<u64>,
}

impl Bucket {
    fn is_expired(&self, now: u64) -> bool {
        self.deadline_ns.is_some_and(|deadline| now >= deadline)
    }
}

/// Result of offering one part to the store
#[derive(Debug)]
pub enum FanIn {
    /// Barrier not met yet
    Held { received: usize, expected: u32 },
    /// Every expected part, in arrival order
    Ready(Vec<Message>),
    /// The part arrived after the bucket's deadline; the bucket is removed
    /// with the parts gathered before it, the late part is dropped
    Expired(ReleasedBucket),
    /// The request was already timed out or cancelled here
    Discarded,
}

/// A bucket removed before its barrier was met
#[derive(Debug)]
pub struct ReleasedBucket {
    pub pod: String,
    pub request_id: String,
    pub expected: u32,
    pub parts: Vec<Message>,
}

/// FIFO-bounded set of keys whose buckets were torn down
#[derive(Debug, Default)]
struct ClosedKeys {
    keys: HashSet<BucketKey>,
    order: VecDeque<BucketKey>,
}

impl ClosedKeys {
    fn insert(&mut self, key: BucketKey, limit: usize) {
        if limit == 0 || !self.keys.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > limit {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
    }
}

#[derive(Debug)]
pub struct FanInStore {
    buckets: DashMap<BucketKey, Bucket>,
    closed: Mutex<ClosedKeys>,
    closed_limit: usize,
}

impl Default for FanInStore {
    fn default() -> Self {
        Self::with_closed_limit(defaults::fan_in::CLOSED_KEY_LIMIT)
    }
}

impl FanInStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember at most `limit` timed-out or cancelled requests
    pub fn with_closed_limit(limit: usize) -> Self {
        Self {
            buckets: DashMap::new(),
            closed: Mutex::new(ClosedKeys::default()),
            closed_limit: limit,
        }
    }

    /// Add a part for `pod`; the first part fixes the bucket's deadline
    ///
    /// `timeout_secs = 0` disables the deadline. A part reaching a bucket
    /// whose deadline has passed never completes it.
    pub fn offer(
        &self,
        pod: &str,
        message: Message,
        expected: u32,
        timeout_secs: u32,
        now: u64,
    ) -> FanIn {
        if expected <= 1 {
            return FanIn::Ready(vec![message]);
        }

        let key = (pod.to_string(), message.request_id().to_string());
        if self.is_closed(&key) {
            debug!(pod, request_id = %key.1, "Discarded part of a closed request");
            return FanIn::Discarded;
        }
        match self.buckets.entry(key) {
            Entry::Occupied(occupied) if occupied.get().is_expired(now) => {
                let (key, bucket) = occupied.remove_entry();
                warn!(
                    pod,
                    request_id = %key.1,
                    received = bucket.parts.len(),
                    expected = bucket.expected,
                    "Part arrived after the fan-in deadline"
                );
                self.close(key.clone());
                FanIn::Expired(release((key, bucket)))
            }
            Entry::Vacant(vacant) => {
                let deadline_ns = (timeout_secs > 0).then(|| now.saturating_add(secs_to_ns(timeout_secs)));
                debug!(
                    pod,
                    request_id = %message.request_id(),
                    expected,
                    "Opened fan-in bucket"
                );
                vacant.insert(Bucket {
                    parts: vec![message],
                    expected,
                    deadline_ns,
                });
                FanIn::Held {
                    received: 1,
                    expected,
                }
            }
            Entry::Occupied(mut occupied) => {
                let bucket = occupied.get_mut();
                bucket.parts.push(message);
                let received = bucket.parts.len();
                let expected = bucket.expected;
                if received >= expected as usize {
                    let bucket = occupied.remove();
                    debug!(pod, received, "Fan-in barrier met");
                    FanIn::Ready(bucket.parts)
                } else {
                    FanIn::Held { received, expected }
                }
            }
        }
    }

    /// Remove and return every bucket whose deadline has passed
    pub fn sweep_expired(&self, now: u64) -> Vec<ReleasedBucket> {
        let released = self.remove_where(|_, bucket| bucket.is_expired(now));
        self.close_released(&released);
        if !released.is_empty() {
            info!(count = released.len(), "Released expired fan-in buckets");
        }
        released
    }

    /// [`sweep_expired`](Self::sweep_expired) limited to one pod's buckets
    pub fn sweep_expired_for(&self, pod: &str, now: u64) -> Vec<ReleasedBucket> {
        let released = self.remove_where(|key, bucket| key.0 == pod && bucket.is_expired(now));
        self.close_released(&released);
        if !released.is_empty() {
            info!(pod, count = released.len(), "Released expired fan-in buckets");
        }
        released
    }

    /// Drop every bucket held for `pod`, returning their request ids
    pub fn cancel_pod(&self, pod: &str) -> Vec<String> {
        let drained = self.drain_pod(pod);
        self.close_released(&drained);
        let cancelled: Vec<String> = drained
            .into_iter()
            .map(|bucket| bucket.request_id)
            .collect();
        info!(pod, count = cancelled.len(), "Cancelled fan-in buckets");
        cancelled
    }

    pub fn drain_pod(&self, pod: &str) -> Vec<ReleasedBucket> {
        self.remove_where(|key, _| key.0 == pod)
    }

    /// Remove everything
    pub fn drain_all(&self) -> Vec<ReleasedBucket> {
        self.remove_where(|_, _| true)
    }

    /// Keys are collected first; each removal re-checks the predicate under
    /// the shard lock so a bucket completed in between is left alone.
    fn remove_where<F>(&self, predicate: F) -> Vec<ReleasedBucket>
    where
        F: Fn(&BucketKey, &Bucket) -> bool,
    {
        let keys: Vec<BucketKey> = self
            .buckets
            .iter()
            .filter(|entry| predicate(entry.key(), entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        keys.into_iter()
            .filter_map(|key| self.buckets.remove_if(&key, |k, b| predicate(k, b)))
            .map(release)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Parts received so far for an open bucket
    pub fn received(&self, pod: &str, request_id: &str) -> Option<usize> {
        self.buckets
            .get(&(pod.to_string(), request_id.to_string()))
            .map(|bucket| bucket.parts.len())
    }

    pub fn pending_for(&self, pod: &str) -> usize {
        self.buckets.iter().filter(|e| e.key().0 == pod).count()
    }

    /// Whether late parts for this request are being discarded
    pub fn is_closed_for(&self, pod: &str, request_id: &str) -> bool {
        self.is_closed(&(pod.to_string(), request_id.to_string()))
    }

    fn is_closed(&self, key: &BucketKey) -> bool {
        self.closed.lock().keys.contains(key)
    }

    fn close(&self, key: BucketKey) {
        self.closed.lock().insert(key, self.closed_limit);
    }

    fn close_released(&self, released: &[ReleasedBucket]) {
        if released.is_empty() {
            return;
        }
        let mut closed = self.closed.lock();
        for bucket in released {
            closed.insert(
                (bucket.pod.clone(), bucket.request_id.clone()),
                self.closed_limit,
            );
        }
    }
}

fn release(((pod, request_id), bucket): (BucketKey, Bucket)) -> ReleasedBucket {
    ReleasedBucket {
        pod,
        request_id,
        expected: bucket.expected,
        parts: bucket.parts,
    }
}
