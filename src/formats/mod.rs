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
//! Pluggable binary codecs between data chunks and engine batches.

use std::sync::Arc;

use crate::exec::batch::Batch;
use crate::runtime::fetch_client::DataChunk;

pub mod ipc;

/// Codec between serialized data chunks and decoded engine batches.
/// A decode failure is fatal to the task; it is never skipped or retried.
pub trait BatchCodec: Send {
    fn name(&self) -> &str;

    /// Decode the full contents of an accumulation run as one logical batch.
    fn deserialize(&self, chunks: &[DataChunk]) -> Result<Batch, String>;

    /// Encode batches into one data chunk, the producer-side inverse.
    fn serialize(&self, batches: &[Batch]) -> Result<DataChunk, String>;
}

/// Selects one codec implementation per operator construction.
pub trait BatchCodecFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self) -> Box<dyn BatchCodec>;
}

/// Resolve the factory for a configured codec name.
pub fn codec_factory_for(name: &str) -> Result<Arc<dyn BatchCodecFactory>, String> {
    match name {
        "arrow_ipc" => Ok(Arc::new(ipc::ArrowIpcCodecFactory)),
        other => Err(format!("unknown exchange codec: {other}")),
    }
}
