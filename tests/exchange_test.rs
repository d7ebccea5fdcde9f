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
//! Integration tests for the exchange source operator protocol.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ironflow::exec::node::exchange_source::ExchangeSourceNode;
use ironflow::exec::operators::{ExchangeSourceFactory, ExchangeSourceOperator};
use ironflow::exec::pipeline::operator::{BlockedState, ProduceResult, SourceOperator};
use ironflow::exec::pipeline::operator_factory::OperatorFactory;
use ironflow::runtime::fetch_client::FetchClient;
use ironflow::runtime::split_queue::{
    DynamicSplitQueue, RemoteSplit, SplitPoll, SplitQueue, SplitQueueRef,
};

mod common;

use common::chunk_with_rows;

struct Fixture {
    client: Arc<FetchClient>,
    queue: Arc<DynamicSplitQueue>,
    factory: ExchangeSourceFactory,
}

fn fixture(budget: usize) -> Fixture {
    let client = FetchClient::new("test-stage");
    let queue = DynamicSplitQueue::new("test-stage");
    let node = ExchangeSourceNode::new(7).with_preferred_output_batch_bytes(budget);
    let factory = ExchangeSourceFactory::new(
        node,
        Arc::clone(&client),
        Arc::clone(&queue) as SplitQueueRef,
    )
    .expect("factory");
    Fixture {
        client,
        queue,
        factory,
    }
}

fn expect_batch(result: ProduceResult) -> ironflow::exec::batch::Batch {
    match result {
        ProduceResult::Batch(batch) => batch,
        other => panic!("expected batch, got {other:?}"),
    }
}

fn expect_pending(op: &mut ExchangeSourceOperator) {
    match op.produce().expect("produce") {
        ProduceResult::Pending => {}
        other => panic!("expected pending, got {other:?}"),
    }
}

#[test]
fn accumulates_chunks_up_to_budget_into_one_batch() {
    // Budget below the combined size of three equal chunks, above one.
    let probe = chunk_with_rows(1000);
    let budget = probe.size_bytes() * 5 / 2;
    let fx = fixture(budget);
    let mut op = fx.factory.create_operator(0);

    fx.queue.add_split(RemoteSplit::new("task-a"));
    fx.queue.no_more_splits();
    // First call registers the source and parks on the empty client.
    expect_pending(&mut op);

    for _ in 0..3 {
        fx.client
            .push_chunk("task-a", chunk_with_rows(1000))
            .expect("push");
    }
    fx.client.finish_source("task-a").expect("finish");

    let batch = expect_batch(op.produce().expect("produce"));
    assert_eq!(batch.len(), 3000);

    assert!(matches!(
        op.produce().expect("produce"),
        ProduceResult::Finished
    ));
    assert!(op.is_finished());
}

#[test]
fn oversized_chunk_flushes_alone() {
    let probe = chunk_with_rows(2000);
    // One chunk is twice the budget.
    let budget = probe.size_bytes() / 2;
    let fx = fixture(budget);
    let mut op = fx.factory.create_operator(0);

    fx.queue.add_split(RemoteSplit::new("task-a"));
    fx.queue.no_more_splits();
    expect_pending(&mut op);

    fx.client
        .push_chunk("task-a", chunk_with_rows(2000))
        .expect("push");

    let batch = expect_batch(op.produce().expect("produce"));
    assert_eq!(batch.len(), 2000);
}

#[test]
fn split_queue_future_parks_the_lane_until_discovery_resumes() {
    let fx = fixture(1 << 20);
    let mut op = fx.factory.create_operator(0);

    // No split yet: produce must hand back the queue's own token.
    expect_pending(&mut op);
    let dep = match op.is_blocked() {
        BlockedState::Blocked(dep) => dep,
        BlockedState::NotBlocked => panic!("expected blocked"),
    };
    assert!(!dep.is_ready());
    // The token is consumed exactly once.
    assert!(matches!(op.is_blocked(), BlockedState::NotBlocked));

    fx.queue.add_split(RemoteSplit::new("task-a"));
    assert!(dep.is_ready());

    // Resuming proceeds to registration.
    expect_pending(&mut op);
    assert_eq!(fx.client.snapshot().registered_sources, 1);
}

#[test]
fn exhaustion_flushes_remainder_before_finishing() {
    let fx = fixture(1 << 30);
    let mut op = fx.factory.create_operator(0);

    fx.queue.add_split(RemoteSplit::new("task-a"));
    fx.queue.no_more_splits();
    expect_pending(&mut op);

    fx.client
        .push_chunk("task-a", chunk_with_rows(10))
        .expect("push");
    fx.client
        .push_chunk("task-a", chunk_with_rows(20))
        .expect("push");
    fx.client.finish_source("task-a").expect("finish");

    // Far below budget, but the client is exhausted: flush the remainder.
    let batch = expect_batch(op.produce().expect("produce"));
    assert_eq!(batch.len(), 30);
    assert!(!op.is_finished());

    assert!(matches!(
        op.produce().expect("produce"),
        ProduceResult::Finished
    ));
    assert!(op.is_finished());
}

#[test]
fn finished_state_is_monotonic() {
    let fx = fixture(1024);
    let mut op = fx.factory.create_operator(0);

    fx.queue.no_more_splits();
    assert!(matches!(
        op.produce().expect("produce"),
        ProduceResult::Finished
    ));
    for _ in 0..3 {
        assert!(op.is_finished());
        assert!(matches!(
            op.produce().expect("produce"),
            ProduceResult::Finished
        ));
    }
}

#[test]
fn empty_client_parks_and_resumes_on_data() {
    let fx = fixture(1024);
    let mut op = fx.factory.create_operator(0);

    fx.queue.add_split(RemoteSplit::new("task-a"));
    fx.queue.no_more_splits();
    expect_pending(&mut op);

    let dep = match op.is_blocked() {
        BlockedState::Blocked(dep) => dep,
        BlockedState::NotBlocked => panic!("expected blocked"),
    };
    assert!(!dep.is_ready());

    fx.client
        .push_chunk("task-a", chunk_with_rows(100))
        .expect("push");
    assert!(dep.is_ready());

    let batch = expect_batch(op.produce().expect("produce"));
    assert_eq!(batch.len(), 100);
}

struct CountingSplitQueue {
    inner: Arc<DynamicSplitQueue>,
    polls: AtomicUsize,
}

impl SplitQueue for CountingSplitQueue {
    fn get_split_or_pending(&self) -> Result<SplitPoll, String> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_split_or_pending()
    }
}

#[test]
fn non_responsible_lane_never_touches_the_split_queue() {
    let client = FetchClient::new("test-stage");
    let inner = DynamicSplitQueue::new("test-stage");
    let counting = Arc::new(CountingSplitQueue {
        inner: Arc::clone(&inner),
        polls: AtomicUsize::new(0),
    });
    let node = ExchangeSourceNode::new(7).with_preferred_output_batch_bytes(1024);
    let factory = ExchangeSourceFactory::new(
        node,
        Arc::clone(&client),
        Arc::clone(&counting) as SplitQueueRef,
    )
    .expect("factory");

    let mut consumer = factory.create_operator(1);
    expect_pending(&mut consumer);
    assert_eq!(counting.polls.load(Ordering::SeqCst), 0);

    // The responsible lane drives discovery for everyone.
    let mut responsible = factory.create_operator(0);
    inner.add_split(RemoteSplit::new("task-a"));
    inner.no_more_splits();
    expect_pending(&mut responsible);
    assert!(counting.polls.load(Ordering::SeqCst) > 0);

    // The pure consumer terminates off the shared client alone.
    client.finish_source("task-a").expect("finish");
    assert!(matches!(
        consumer.produce().expect("produce"),
        ProduceResult::Finished
    ));
    assert!(matches!(
        responsible.produce().expect("produce"),
        ProduceResult::Finished
    ));
}

#[test]
fn two_lanes_split_the_stream_without_losing_rows() {
    let fx = fixture(1);
    let mut lane0 = fx.factory.create_operator(0);
    let mut lane1 = fx.factory.create_operator(1);

    fx.queue.add_split(RemoteSplit::new("task-a"));
    fx.queue.add_split(RemoteSplit::new("task-b"));
    fx.queue.no_more_splits();
    expect_pending(&mut lane0);

    fx.client
        .push_chunk("task-a", chunk_with_rows(40))
        .expect("push");
    fx.client
        .push_chunk("task-b", chunk_with_rows(60))
        .expect("push");
    fx.client.finish_source("task-a").expect("finish");
    fx.client.finish_source("task-b").expect("finish");

    let mut rows = 0usize;
    for op in [&mut lane0, &mut lane1] {
        loop {
            match op.produce().expect("produce") {
                ProduceResult::Batch(batch) => rows += batch.len(),
                ProduceResult::Pending => panic!("no parking expected with queued data"),
                ProduceResult::Finished => break,
            }
        }
    }
    assert_eq!(rows, 100);
    assert!(lane0.is_finished());
    assert!(lane1.is_finished());
}

#[test]
fn close_twice_leaves_stats_identical() {
    let fx = fixture(1024);
    let mut op = fx.factory.create_operator(0);

    fx.queue.add_split(RemoteSplit::new("task-a"));
    fx.queue.no_more_splits();
    expect_pending(&mut op);
    fx.client
        .push_chunk("task-a", chunk_with_rows(100))
        .expect("push");
    fx.client.finish_source("task-a").expect("finish");
    expect_batch(op.produce().expect("produce"));

    op.close().expect("close");
    let first = op.stats().clone();
    assert_eq!(first.batches_produced, 1);
    assert_eq!(first.rows_produced, 100);
    assert_eq!(first.chunks_fetched, 1);
    assert!(first.bytes_fetched > 0);

    op.close().expect("second close");
    assert_eq!(*op.stats(), first);
}

#[test]
fn corrupt_chunk_fails_the_task_with_its_byte_size() {
    let fx = fixture(1024);
    let mut op = fx.factory.create_operator(0);

    fx.queue.add_split(RemoteSplit::new("task-a"));
    fx.queue.no_more_splits();
    expect_pending(&mut op);

    let corrupt = ironflow::runtime::fetch_client::DataChunk::from_vec(vec![0xff; 12]);
    fx.client.push_chunk("task-a", corrupt).expect("push");
    fx.client.finish_source("task-a").expect("finish");

    let err = op.produce().expect_err("decode failure is fatal");
    assert!(err.contains("12 bytes"), "error should name the size: {err}");

    // Teardown stays legal after a fatal failure.
    op.close().expect("close");
}

#[test]
fn transport_failure_names_the_remote_source() {
    let fx = fixture(1024);
    let mut op = fx.factory.create_operator(0);

    fx.queue.add_split(RemoteSplit::new("task-a"));
    fx.queue.no_more_splits();
    expect_pending(&mut op);

    fx.client.fail_source("task-a", "connection refused");
    let err = op.produce().expect_err("transport failure is fatal");
    assert!(err.contains("task-a"), "{err}");
    assert!(err.contains("connection refused"), "{err}");
}

#[test]
fn cancellation_completes_the_outstanding_token() {
    let fx = fixture(1024);
    let mut op = fx.factory.create_operator(0);

    fx.queue.add_split(RemoteSplit::new("task-a"));
    fx.queue.no_more_splits();
    expect_pending(&mut op);
    let dep = match op.is_blocked() {
        BlockedState::Blocked(dep) => dep,
        BlockedState::NotBlocked => panic!("expected blocked"),
    };

    fx.client.cancel();
    assert!(dep.is_ready());
    assert!(op.produce().is_err());
    op.close().expect("close after cancel");
}

#[test]
fn factory_creates_boxed_source_operators() {
    let fx = fixture(1024);
    assert!(fx.factory.is_source());
    let mut op = fx.factory.create(2, 1);
    assert_eq!(op.name(), "EXCHANGE_SOURCE (id=7)");
    assert!(!op.is_finished());
    op.close().expect("close");
}
