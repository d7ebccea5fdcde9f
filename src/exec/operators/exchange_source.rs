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
//! Exchange source for receiving distributed upstream data.
//!
//! Responsibilities:
//! - Discovers remote producers through the local split queue and registers
//!   them with the shared fetch client (lane 0 only).
//! - Accumulates fetched data chunks up to a byte budget, decodes them into
//!   one engine batch per flush, and drives the race-free termination
//!   protocol shared by every lane of the stage.
//!
//! Key exported interfaces:
//! - Types: `ExchangeSourceFactory`, `ExchangeSourceOperator`,
//!   `ExchangeSourceStats`.

use std::sync::Arc;

use crate::exec::node::exchange_source::ExchangeSourceNode;
use crate::exec::pipeline::dependency::DependencyHandle;
use crate::exec::pipeline::operator::{BlockedState, ProduceResult, SourceOperator};
use crate::exec::pipeline::operator_factory::OperatorFactory;
use crate::formats::{BatchCodec, BatchCodecFactory, codec_factory_for};
use crate::ironflow_logging::debug;
use crate::runtime::fetch_client::{DataChunk, FetchClient, PollResult};
use crate::runtime::split_queue::{SplitPoll, SplitQueueRef};

/// Factory for exchange source operators; one operator per scheduler lane,
/// all bound to the same shared fetch client.
pub struct ExchangeSourceFactory {
    name: String,
    node: ExchangeSourceNode,
    client: Arc<FetchClient>,
    split_queue: SplitQueueRef,
    codec_factory: Arc<dyn BatchCodecFactory>,
}

impl ExchangeSourceFactory {
    pub fn new(
        node: ExchangeSourceNode,
        client: Arc<FetchClient>,
        split_queue: SplitQueueRef,
    ) -> Result<Self, String> {
        let name = node.profile_name();
        let codec_factory = codec_factory_for(&node.codec)?;
        Ok(Self {
            name,
            node,
            client,
            split_queue,
            codec_factory,
        })
    }

    /// Build one lane's operator. Lane 0 is responsible for split
    /// discovery; every other lane is a pure consumer.
    pub fn create_operator(&self, driver_id: i32) -> ExchangeSourceOperator {
        self.client.register_consumer();
        ExchangeSourceOperator {
            name: self.name.clone(),
            driver_id,
            preferred_output_batch_bytes: self.node.preferred_output_batch_bytes,
            process_splits: driver_id == 0,
            no_more_splits: false,
            client: Some(Arc::clone(&self.client)),
            split_queue: Arc::clone(&self.split_queue),
            codec: self.codec_factory.create(),
            buffer: Vec::new(),
            buffered_bytes: 0,
            pending: None,
            at_end: false,
            closed: false,
            stats: ExchangeSourceStats::default(),
        }
    }
}

impl OperatorFactory for ExchangeSourceFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _dop: i32, driver_id: i32) -> Box<dyn SourceOperator> {
        Box::new(self.create_operator(driver_id))
    }

    fn is_source(&self) -> bool {
        true
    }
}

/// Per-operator counters; the fetch client's counters are merged in exactly
/// once at close time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeSourceStats {
    pub batches_produced: u64,
    pub rows_produced: u64,
    pub bytes_fetched: u128,
    pub chunks_fetched: u128,
    pub queue_wait_ns: u128,
}

/// Pull-driven exchange source bound to one scheduler lane.
pub struct ExchangeSourceOperator {
    name: String,
    driver_id: i32,
    preferred_output_batch_bytes: usize,
    /// True for the lane responsible for pulling splits from the task and
    /// registering them with the fetch client.
    process_splits: bool,
    no_more_splits: bool,
    client: Option<Arc<FetchClient>>,
    split_queue: SplitQueueRef,
    codec: Box<dyn BatchCodec>,
    /// Not-yet-decoded chunks, in fetch-client delivery order. Total size
    /// stays below the budget between polls; crossing it triggers a flush.
    buffer: Vec<DataChunk>,
    buffered_bytes: usize,
    /// At most one outstanding suspension token, consumed by `is_blocked`.
    pending: Option<DependencyHandle>,
    at_end: bool,
    closed: bool,
    stats: ExchangeSourceStats,
}

impl ExchangeSourceOperator {
    pub fn driver_id(&self) -> i32 {
        self.driver_id
    }

    pub fn stats(&self) -> &ExchangeSourceStats {
        &self.stats
    }

    /// Pull splits from the task until there are none left or the queue
    /// returns a suspension token. Registers each discovered remote source
    /// with the fetch client. Returns `Some(token)` when the queue is not
    /// ready yet; returns `None` once all splits are fetched or when this
    /// lane is not responsible for split discovery.
    fn poll_splits(&mut self) -> Result<Option<DependencyHandle>, String> {
        if !self.process_splits || self.no_more_splits {
            return Ok(None);
        }
        let client = self.client_handle()?;
        loop {
            match self.split_queue.get_split_or_pending()? {
                SplitPoll::Split(split) => {
                    debug!(
                        "remote source discovered: name={} driver_id={} split={}",
                        self.name, self.driver_id, split
                    );
                    client.register_source(split.source_id())?;
                }
                SplitPoll::Pending(dep) => return Ok(Some(dep)),
                SplitPoll::NoMoreSplits => {
                    self.no_more_splits = true;
                    client.no_more_sources();
                    debug!(
                        "split discovery complete: name={} driver_id={}",
                        self.name, self.driver_id
                    );
                    return Ok(None);
                }
            }
        }
    }

    fn split_coordination_done(&self) -> bool {
        // Pure consumer lanes never touch the split queue; for them
        // discovery is complete by definition.
        !self.process_splits || self.no_more_splits
    }

    fn client_handle(&self) -> Result<Arc<FetchClient>, String> {
        self.client
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| format!("exchange source already closed: name={}", self.name))
    }

    fn flush(&mut self) -> Result<ProduceResult, String> {
        let chunks = self.buffer.len();
        let bytes = self.buffered_bytes;
        let batch = self.codec.deserialize(&self.buffer)?;
        self.buffer.clear();
        self.buffered_bytes = 0;
        self.stats.batches_produced += 1;
        self.stats.rows_produced += batch.len() as u64;
        debug!(
            "exchange source flush: name={} driver_id={} chunks={} bytes={} rows={}",
            self.name,
            self.driver_id,
            chunks,
            bytes,
            batch.len()
        );
        Ok(ProduceResult::Batch(batch))
    }

    fn close_inner(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.buffer.clear();
        self.buffered_bytes = 0;
        self.pending = None;
        if let Some(client) = self.client.take() {
            let client_stats = client.stats();
            self.stats.bytes_fetched = client_stats.bytes_fetched;
            self.stats.chunks_fetched = client_stats.chunks_fetched;
            self.stats.queue_wait_ns = client_stats.queue_wait_ns;
            client.release();
            debug!(
                "exchange source closed: name={} driver_id={} batches={} rows={} bytes_fetched={} chunks_fetched={} queue_wait_ns={}",
                self.name,
                self.driver_id,
                self.stats.batches_produced,
                self.stats.rows_produced,
                self.stats.bytes_fetched,
                self.stats.chunks_fetched,
                self.stats.queue_wait_ns
            );
        }
    }
}

impl SourceOperator for ExchangeSourceOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn produce(&mut self) -> Result<ProduceResult, String> {
        if self.at_end {
            return Ok(ProduceResult::Finished);
        }

        if let Some(dep) = self.poll_splits()? {
            self.pending = Some(dep);
            return Ok(ProduceResult::Pending);
        }

        let client = self.client_handle()?;
        loop {
            if !self.buffer.is_empty() && self.buffered_bytes >= self.preferred_output_batch_bytes
            {
                break;
            }
            match client.poll()? {
                PollResult::Chunks(chunks) => {
                    for chunk in &chunks {
                        self.buffered_bytes += chunk.size_bytes();
                    }
                    self.buffer.extend(chunks);
                }
                PollResult::Empty(dep) => {
                    if self.buffer.is_empty() {
                        self.pending = Some(dep);
                        return Ok(ProduceResult::Pending);
                    }
                    // Nothing pollable right now: flush what accumulated
                    // rather than hold rows back mid-stream.
                    break;
                }
                PollResult::Exhausted => {
                    if self.buffer.is_empty() {
                        if !self.split_coordination_done() {
                            return Err(format!(
                                "exchange exhausted before split discovery completed: name={}",
                                self.name
                            ));
                        }
                        self.at_end = true;
                        debug!(
                            "exchange source finished: name={} driver_id={} batches={} rows={}",
                            self.name,
                            self.driver_id,
                            self.stats.batches_produced,
                            self.stats.rows_produced
                        );
                        return Ok(ProduceResult::Finished);
                    }
                    // Flush the remainder; the next call observes the
                    // exhausted client with an empty buffer and finishes.
                    break;
                }
            }
        }

        self.flush()
    }

    fn is_blocked(&mut self) -> BlockedState {
        match self.pending.take() {
            Some(dep) => BlockedState::Blocked(dep),
            None => BlockedState::NotBlocked,
        }
    }

    fn is_finished(&self) -> bool {
        self.at_end
    }

    fn close(&mut self) -> Result<(), String> {
        self.close_inner();
        Ok(())
    }
}

impl Drop for ExchangeSourceOperator {
    fn drop(&mut self) {
        self.close_inner();
    }
}
