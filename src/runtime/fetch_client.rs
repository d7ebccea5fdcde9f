// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Shared buffer of fetched remote data chunks, decoupled from decoding.
//!
//! Responsibilities:
//! - Owns one FIFO queue of not-yet-consumed data chunks per registered
//!   remote source; admits concurrent producers (transport completions) and
//!   concurrent consumers (exchange source lanes).
//! - Implements poll-or-register-future semantics so consumer lanes never
//!   block a worker thread.
//!
//! Key exported interfaces:
//! - Types: `DataChunk`, `PollResult`, `FetchClient`, `FetchClientStats`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;

use crate::exec::pipeline::dependency::{Dependency, DependencyHandle};
use crate::ironflow_logging::debug;

/// Raw serialized batch bytes as received from one remote producer.
/// Exclusively owned by the consumer lane once handed off by `poll`.
#[derive(Clone, Debug)]
pub struct DataChunk {
    bytes: Bytes,
}

impl DataChunk {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

/// Outcome of one non-blocking poll.
pub enum PollResult {
    /// Chunks from one source, in that source's arrival order.
    Chunks(Vec<DataChunk>),
    /// Nothing obtainable right now; the token completes when chunks
    /// arrive, a source finishes, the client fails, or it is canceled.
    Empty(DependencyHandle),
    /// No chunk will ever arrive again: no further sources will be
    /// registered and every registered source is drained.
    Exhausted,
}

/// Counters owned by the client during its lifetime; merged exactly once
/// into each operator's stats at close time.
#[derive(Clone, Debug, Default)]
pub struct FetchClientStats {
    pub bytes_fetched: u128,
    pub chunks_fetched: u128,
    pub queue_wait_ns: u128,
}

/// Point-in-time view of the client state, for debug logging.
#[derive(Clone, Debug)]
pub struct FetchClientSnapshot {
    pub registered_sources: usize,
    pub finished_sources: usize,
    pub queued_chunks: usize,
    pub queued_bytes: usize,
    pub no_more_sources: bool,
    pub canceled: bool,
}

struct SourceQueue {
    chunks: VecDeque<DataChunk>,
    finished: bool,
}

#[derive(Default)]
struct ClientState {
    // Live queues, keyed by source id. Drained finished sources are removed;
    // `registered` remembers every id ever seen for duplicate detection.
    sources: HashMap<String, SourceQueue>,
    source_order: VecDeque<String>,
    registered: HashSet<String>,
    finished_sources: usize,
    no_more_sources: bool,
    canceled: bool,
    failure: Option<String>,
    consumers: usize,
    data_wait: Option<DependencyHandle>,
    wait_since: Option<Instant>,
    stats: FetchClientStats,
}

impl ClientState {
    fn exhausted(&self) -> bool {
        self.no_more_sources
            && self
                .sources
                .values()
                .all(|q| q.finished && q.chunks.is_empty())
    }

    fn take_waiter(&mut self) -> Option<DependencyHandle> {
        self.data_wait.take()
    }
}

/// Thread-safe fetch client shared by every exchange source lane of one
/// pipeline stage. The transport pushes chunks in; lanes poll them out.
pub struct FetchClient {
    label: String,
    mu: Mutex<ClientState>,
}

impl FetchClient {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            mu: Mutex::new(ClientState::default()),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Record one consumer lane's interest. Paired with `release`.
    pub fn register_consumer(&self) {
        let mut st = self.mu.lock().expect("fetch client lock");
        st.consumers += 1;
    }

    /// Drop one consumer lane's interest. The last release drops all queued
    /// chunks and completes any outstanding future so no lane parks forever.
    pub fn release(&self) {
        let waiter = {
            let mut st = self.mu.lock().expect("fetch client lock");
            st.consumers = st.consumers.saturating_sub(1);
            if st.consumers > 0 {
                return;
            }
            let dropped: usize = st.sources.values().map(|q| q.chunks.len()).sum();
            if dropped > 0 {
                debug!(
                    "fetch client released with queued chunks: label={} dropped={}",
                    self.label, dropped
                );
            }
            st.sources.clear();
            st.source_order.clear();
            st.take_waiter()
        };
        if let Some(dep) = waiter {
            dep.set_ready();
        }
    }

    /// Register one remote source. Registering the same source id twice is a
    /// programming error, as is registering after `no_more_sources`.
    pub fn register_source(&self, source_id: &str) -> Result<(), String> {
        let mut st = self.mu.lock().expect("fetch client lock");
        if st.canceled {
            return Err(format!("fetch client canceled: label={}", self.label));
        }
        if st.no_more_sources {
            return Err(format!(
                "source registered after no-more-sources: label={} source_id={}",
                self.label, source_id
            ));
        }
        if !st.registered.insert(source_id.to_string()) {
            return Err(format!(
                "duplicate source registration: label={} source_id={}",
                self.label, source_id
            ));
        }
        st.sources.insert(
            source_id.to_string(),
            SourceQueue {
                chunks: VecDeque::new(),
                finished: false,
            },
        );
        st.source_order.push_back(source_id.to_string());
        debug!(
            "source registered: label={} source_id={} sources={}",
            self.label,
            source_id,
            st.sources.len()
        );
        Ok(())
    }

    /// Declare that no further sources will be registered. Idempotent.
    pub fn no_more_sources(&self) {
        let waiter = {
            let mut st = self.mu.lock().expect("fetch client lock");
            if st.no_more_sources {
                return;
            }
            st.no_more_sources = true;
            debug!(
                "no more sources: label={} registered={}",
                self.label,
                st.registered.len()
            );
            // Lanes parked on an empty queue must wake to observe exhaustion.
            st.take_waiter()
        };
        if let Some(dep) = waiter {
            dep.set_ready();
        }
    }

    /// Transport side: enqueue one chunk fetched from a remote source.
    /// Chunks pushed after cancellation are dropped.
    pub fn push_chunk(&self, source_id: &str, chunk: DataChunk) -> Result<(), String> {
        let waiter = {
            let mut st = self.mu.lock().expect("fetch client lock");
            if st.canceled {
                debug!(
                    "push dropped, canceled: label={} source_id={} size={}",
                    self.label,
                    source_id,
                    chunk.size_bytes()
                );
                return Ok(());
            }
            let size = chunk.size_bytes();
            let queue = st.sources.get_mut(source_id).ok_or_else(|| {
                format!(
                    "chunk for unregistered source: label={} source_id={}",
                    self.label, source_id
                )
            })?;
            if queue.finished {
                return Err(format!(
                    "chunk after end of stream: label={} source_id={}",
                    self.label, source_id
                ));
            }
            queue.chunks.push_back(chunk);
            st.stats.bytes_fetched = st.stats.bytes_fetched.saturating_add(size as u128);
            st.stats.chunks_fetched = st.stats.chunks_fetched.saturating_add(1);
            st.take_waiter()
        };
        if let Some(dep) = waiter {
            dep.set_ready();
        }
        Ok(())
    }

    /// Transport side: mark one source as exhausted.
    pub fn finish_source(&self, source_id: &str) -> Result<(), String> {
        let waiter = {
            let mut st = self.mu.lock().expect("fetch client lock");
            if st.canceled {
                return Ok(());
            }
            let queue = st.sources.get_mut(source_id).ok_or_else(|| {
                format!(
                    "end of stream for unregistered source: label={} source_id={}",
                    self.label, source_id
                )
            })?;
            if queue.finished {
                return Ok(());
            }
            queue.finished = true;
            st.finished_sources += 1;
            debug!(
                "source finished: label={} source_id={} finished={}/{}",
                self.label,
                source_id,
                st.finished_sources,
                st.registered.len()
            );
            st.take_waiter()
        };
        if let Some(dep) = waiter {
            dep.set_ready();
        }
        Ok(())
    }

    /// Transport side: report an unrecoverable remote fetch error. The
    /// failure is task-fatal; it surfaces from every subsequent poll.
    pub fn fail_source(&self, source_id: &str, message: &str) {
        let waiter = {
            let mut st = self.mu.lock().expect("fetch client lock");
            if st.failure.is_none() {
                st.failure = Some(format!(
                    "remote fetch failed: label={} source_id={} error={}",
                    self.label, source_id, message
                ));
            }
            st.take_waiter()
        };
        if let Some(dep) = waiter {
            dep.set_ready();
        }
    }

    /// Cancel the client: drops queued chunks and completes any outstanding
    /// future so no lane is left pending forever.
    pub fn cancel(&self) {
        let waiter = {
            let mut st = self.mu.lock().expect("fetch client lock");
            if st.canceled {
                return;
            }
            st.canceled = true;
            st.sources.clear();
            st.source_order.clear();
            debug!("fetch client canceled: label={}", self.label);
            st.take_waiter()
        };
        if let Some(dep) = waiter {
            dep.set_ready();
        }
    }

    /// Non-blocking poll for the next available chunks from any registered
    /// source. Chunks of one source come out in arrival order; distinct
    /// sources carry no mutual order.
    pub fn poll(&self) -> Result<PollResult, String> {
        let mut guard = self.mu.lock().expect("fetch client lock");
        let st = &mut *guard;
        if st.canceled {
            return Err(format!("fetch client canceled: label={}", self.label));
        }
        if let Some(failure) = st.failure.as_ref() {
            return Err(failure.clone());
        }

        // Rotate over sources in registration order; hand out the first
        // non-empty queue wholesale so per-source order is preserved.
        for _ in 0..st.source_order.len() {
            let source_id = st.source_order.pop_front().expect("source order entry");
            let chunks = match st.sources.get_mut(&source_id) {
                Some(queue) if !queue.chunks.is_empty() => {
                    let chunks: Vec<DataChunk> = queue.chunks.drain(..).collect();
                    if queue.finished {
                        // Finished and drained: the descriptor's life ends here.
                        st.sources.remove(&source_id);
                    } else {
                        st.source_order.push_back(source_id);
                    }
                    chunks
                }
                _ => {
                    st.source_order.push_back(source_id);
                    continue;
                }
            };
            if let Some(since) = st.wait_since.take() {
                st.stats.queue_wait_ns = st
                    .stats
                    .queue_wait_ns
                    .saturating_add(since.elapsed().as_nanos());
            }
            return Ok(PollResult::Chunks(chunks));
        }

        if st.exhausted() {
            if let Some(since) = st.wait_since.take() {
                st.stats.queue_wait_ns = st
                    .stats
                    .queue_wait_ns
                    .saturating_add(since.elapsed().as_nanos());
            }
            st.sources.clear();
            st.source_order.clear();
            return Ok(PollResult::Exhausted);
        }

        if st.wait_since.is_none() {
            st.wait_since = Some(Instant::now());
        }
        let reuse = st.data_wait.as_ref().is_some_and(|dep| !dep.is_ready());
        if !reuse {
            st.data_wait = Some(Dependency::new(format!("fetch_client:{}", self.label)));
        }
        let dep = Arc::clone(st.data_wait.as_ref().expect("data wait set"));
        Ok(PollResult::Empty(dep))
    }

    pub fn stats(&self) -> FetchClientStats {
        let st = self.mu.lock().expect("fetch client lock");
        st.stats.clone()
    }

    pub fn snapshot(&self) -> FetchClientSnapshot {
        let st = self.mu.lock().expect("fetch client lock");
        FetchClientSnapshot {
            registered_sources: st.registered.len(),
            finished_sources: st.finished_sources,
            queued_chunks: st.sources.values().map(|q| q.chunks.len()).sum(),
            queued_bytes: st
                .sources
                .values()
                .flat_map(|q| q.chunks.iter())
                .map(|c| c.size_bytes())
                .sum(),
            no_more_sources: st.no_more_sources,
            canceled: st.canceled,
        }
    }
}
