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
use std::io::Cursor;

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;

use super::{BatchCodec, BatchCodecFactory};
use crate::exec::batch::Batch;
use crate::runtime::fetch_client::DataChunk;

/// Arrow IPC stream codec: each data chunk carries one IPC stream holding
/// one or more record batches of one schema.
pub struct ArrowIpcCodec;

pub struct ArrowIpcCodecFactory;

impl BatchCodecFactory for ArrowIpcCodecFactory {
    fn name(&self) -> &str {
        "arrow_ipc"
    }

    fn create(&self) -> Box<dyn BatchCodec> {
        Box::new(ArrowIpcCodec)
    }
}

impl BatchCodec for ArrowIpcCodec {
    fn name(&self) -> &str {
        "arrow_ipc"
    }

    fn deserialize(&self, chunks: &[DataChunk]) -> Result<Batch, String> {
        if chunks.is_empty() {
            return Err("deserialize called with no chunks".to_string());
        }

        let mut batches: Vec<RecordBatch> = Vec::new();
        let mut expected_schema: Option<SchemaRef> = None;
        for chunk in chunks {
            if chunk.size_bytes() == 0 {
                continue;
            }
            let mut cursor = Cursor::new(chunk.bytes().as_ref());
            let reader = StreamReader::try_new(&mut cursor, None).map_err(|e| {
                format!(
                    "failed to open IPC stream in data chunk of {} bytes: {e}",
                    chunk.size_bytes()
                )
            })?;
            for batch_result in reader {
                let batch = batch_result.map_err(|e| {
                    format!(
                        "failed to decode data chunk of {} bytes: {e}",
                        chunk.size_bytes()
                    )
                })?;
                if let Some(s) = expected_schema.as_ref() {
                    if batch.schema().as_ref() != s.as_ref() {
                        return Err(format!(
                            "schema mismatch in data chunk of {} bytes: expected={:?} actual={:?}",
                            chunk.size_bytes(),
                            s,
                            batch.schema()
                        ));
                    }
                } else {
                    expected_schema = Some(batch.schema());
                }
                batches.push(batch);
            }
        }

        let schema = expected_schema
            .ok_or_else(|| "no decodable batches in accumulated chunks".to_string())?;
        let merged = concat_batches(&schema, batches.iter())
            .map_err(|e| format!("failed to merge decoded batches: {e}"))?;
        Ok(Batch::new(merged))
    }

    fn serialize(&self, batches: &[Batch]) -> Result<DataChunk, String> {
        if batches.is_empty() {
            return Ok(DataChunk::from_vec(Vec::new()));
        }

        let schema = batches[0].schema();
        for (i, b) in batches.iter().enumerate().skip(1) {
            if b.schema().as_ref() != schema.as_ref() {
                return Err(format!(
                    "serialize schema mismatch at batch index {}: expected={:?} actual={:?}",
                    i,
                    schema,
                    b.schema()
                ));
            }
        }

        let mut buffer = Vec::new();
        let mut writer = StreamWriter::try_new(&mut buffer, &schema)
            .map_err(|e| format!("failed to create IPC writer: {e}"))?;
        for batch in batches {
            writer
                .write(&batch.batch)
                .map_err(|e| format!("failed to write batch: {e}"))?;
        }
        writer
            .finish()
            .map_err(|e| format!("failed to finish IPC stream: {e}"))?;

        Ok(DataChunk::from_vec(buffer))
    }
}
