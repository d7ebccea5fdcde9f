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
//! Split queue for discovering remote producers.
//!
//! Responsibilities:
//! - Hands remote-source splits to the one responsible exchange lane, with
//!   not-ready-yet signaled through a suspension token instead of blocking.
//! - Producer side is driven by the enclosing task as discovery progresses.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::exec::pipeline::dependency::{Dependency, DependencyHandle};
use crate::ironflow_logging::debug;

/// A unit of work assignment naming one remote producer task.
/// Immutable once created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteSplit {
    source_id: String,
}

impl RemoteSplit {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

impl fmt::Display for RemoteSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Remote: {}", self.source_id)
    }
}

/// Outcome of one split-queue poll.
pub enum SplitPoll {
    Split(RemoteSplit),
    /// Queue currently empty but not closed; the token completes when a
    /// split arrives, the queue closes, or the task is canceled.
    Pending(DependencyHandle),
    NoMoreSplits,
}

/// Queue contract consumed by the responsible exchange lane.
pub trait SplitQueue: Send + Sync {
    fn get_split_or_pending(&self) -> Result<SplitPoll, String>;
}

/// Shared reference to a split queue implementation.
pub type SplitQueueRef = Arc<dyn SplitQueue>;

#[derive(Default)]
struct QueueState {
    splits: VecDeque<RemoteSplit>,
    no_more: bool,
    canceled: bool,
    failure: Option<String>,
    wait: Option<DependencyHandle>,
}

/// Dynamically fed split queue owned by the local task.
pub struct DynamicSplitQueue {
    label: String,
    mu: Mutex<QueueState>,
}

impl DynamicSplitQueue {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            mu: Mutex::new(QueueState::default()),
        })
    }

    pub fn add_split(&self, split: RemoteSplit) {
        let waiter = {
            let mut st = self.mu.lock().expect("split queue lock");
            if st.canceled || st.no_more {
                debug!(
                    "split dropped: label={} split={} canceled={} no_more={}",
                    self.label, split, st.canceled, st.no_more
                );
                return;
            }
            st.splits.push_back(split);
            st.wait.take()
        };
        if let Some(dep) = waiter {
            dep.set_ready();
        }
    }

    /// Close the queue: no further splits will arrive. Idempotent.
    pub fn no_more_splits(&self) {
        let waiter = {
            let mut st = self.mu.lock().expect("split queue lock");
            if st.no_more {
                return;
            }
            st.no_more = true;
            debug!(
                "split queue closed: label={} pending_splits={}",
                self.label,
                st.splits.len()
            );
            st.wait.take()
        };
        if let Some(dep) = waiter {
            dep.set_ready();
        }
    }

    /// Report an unrecoverable fault; surfaces from every subsequent poll.
    pub fn fail(&self, message: &str) {
        let waiter = {
            let mut st = self.mu.lock().expect("split queue lock");
            if st.failure.is_none() {
                st.failure = Some(format!(
                    "split queue failed: label={} error={}",
                    self.label, message
                ));
            }
            st.wait.take()
        };
        if let Some(dep) = waiter {
            dep.set_ready();
        }
    }

    /// Cancel the queue, completing any outstanding token.
    pub fn cancel(&self) {
        let waiter = {
            let mut st = self.mu.lock().expect("split queue lock");
            if st.canceled {
                return;
            }
            st.canceled = true;
            st.splits.clear();
            st.wait.take()
        };
        if let Some(dep) = waiter {
            dep.set_ready();
        }
    }
}

impl SplitQueue for DynamicSplitQueue {
    fn get_split_or_pending(&self) -> Result<SplitPoll, String> {
        let mut st = self.mu.lock().expect("split queue lock");
        if st.canceled {
            return Err(format!("split queue canceled: label={}", self.label));
        }
        if let Some(failure) = st.failure.as_ref() {
            return Err(failure.clone());
        }
        if let Some(split) = st.splits.pop_front() {
            return Ok(SplitPoll::Split(split));
        }
        if st.no_more {
            return Ok(SplitPoll::NoMoreSplits);
        }
        let reuse = st.wait.as_ref().is_some_and(|dep| !dep.is_ready());
        if !reuse {
            st.wait = Some(Dependency::new(format!("split_queue:{}", self.label)));
        }
        Ok(SplitPoll::Pending(Arc::clone(
            st.wait.as_ref().expect("wait set"),
        )))
    }
}
