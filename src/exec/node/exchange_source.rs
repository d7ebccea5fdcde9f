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
use crate::common::config;

/// Plan-time configuration for one exchange source.
#[derive(Clone, Debug)]
pub struct ExchangeSourceNode {
    pub node_id: i32,
    /// Soft byte budget for one accumulated output batch.
    pub preferred_output_batch_bytes: usize,
    /// Name of the codec decoding remote data chunks.
    pub codec: String,
}

impl ExchangeSourceNode {
    pub fn new(node_id: i32) -> Self {
        Self {
            node_id,
            preferred_output_batch_bytes: config::preferred_output_batch_bytes(),
            codec: config::exchange_codec(),
        }
    }

    pub fn with_preferred_output_batch_bytes(mut self, bytes: usize) -> Self {
        self.preferred_output_batch_bytes = bytes;
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    pub fn profile_name(&self) -> String {
        format!("EXCHANGE_SOURCE (id={})", self.node_id)
    }
}
