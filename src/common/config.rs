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
use crate::ironflow_config::config as ironflow_app_config;

pub(crate) fn preferred_output_batch_bytes() -> usize {
    ironflow_app_config()
        .ok()
        .map(|c| c.runtime.preferred_output_batch_bytes)
        .unwrap_or(2 * 1024 * 1024)
}

pub(crate) fn exchange_codec() -> String {
    ironflow_app_config()
        .ok()
        .map(|c| c.runtime.exchange_codec.clone())
        .unwrap_or_else(|| "arrow_ipc".to_string())
}
