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
//! Source operator contract and blocking semantics.
//!
//! Responsibilities:
//! - Defines the produce/blocked/finished/close lifecycle implemented by
//!   data-source operators.
//! - Used by scheduler lanes to drive cooperative operator execution steps.

use crate::exec::batch::Batch;
use crate::exec::pipeline::dependency::DependencyHandle;

/// Outcome of one `produce` call.
#[derive(Debug)]
pub enum ProduceResult {
    /// One finished engine batch.
    Batch(Batch),
    /// No batch yet; the caller must consult `is_blocked` and park the lane
    /// on the returned token.
    Pending,
    /// Permanent completion; every later call returns this again.
    Finished,
}

/// Blocking state reported after a `produce` call returned `Pending`.
#[derive(Debug)]
pub enum BlockedState {
    /// The lane must park until the token completes.
    Blocked(DependencyHandle),
    NotBlocked,
}

/// Pull-driven data source driven by one scheduler-owned lane at a time.
///
/// The operator performs no internal threading; suspension is expressed
/// solely through the token returned by [`SourceOperator::is_blocked`],
/// never by busy-polling.
pub trait SourceOperator: Send {
    fn name(&self) -> &str;

    /// Produce one batch, report that none is available yet, or signal
    /// permanent completion.
    fn produce(&mut self) -> Result<ProduceResult, String>;

    /// Hand out the suspension token stored by the last `produce` call.
    /// The token is consumed: a second call returns `NotBlocked`.
    fn is_blocked(&mut self) -> BlockedState;

    /// True once the operator has permanently completed. Monotonic, and
    /// never disagrees with the terminal behavior of `produce`.
    fn is_finished(&self) -> bool;

    /// Idempotent teardown; safe on normal and cancelled shutdown alike.
    fn close(&mut self) -> Result<(), String>;

    fn cancel(&mut self) {
        // Default: nothing to cancel.
    }
}
