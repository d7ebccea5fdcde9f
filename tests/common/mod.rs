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
//! Shared helpers for exchange integration tests.

use std::sync::Arc;

use arrow::array::{Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};

use ironflow::exec::batch::Batch;
use ironflow::formats::BatchCodec;
use ironflow::formats::ipc::ArrowIpcCodec;
use ironflow::runtime::fetch_client::DataChunk;

pub fn int_batch(values: Vec<i64>) -> Batch {
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
    let array = Arc::new(Int64Array::from(values));
    Batch::new(RecordBatch::try_new(schema, vec![array]).expect("record batch"))
}

/// Encode `rows` sequential values into one data chunk.
pub fn chunk_with_rows(rows: usize) -> DataChunk {
    let values: Vec<i64> = (0..rows as i64).collect();
    ArrowIpcCodec
        .serialize(&[int_batch(values)])
        .expect("serialize")
}
