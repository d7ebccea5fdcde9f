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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<IronflowConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

fn default_preferred_output_batch_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_exchange_codec() -> String {
    "arrow_ipc".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static IronflowConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = path.as_ref().to_path_buf();
    let cfg = IronflowConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

pub fn init_from_env_or_default() -> Result<&'static IronflowConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = IronflowConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

pub fn config() -> Result<&'static IronflowConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("IRONFLOW_CONFIG") {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let candidates = [PathBuf::from("ironflow.toml")];
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "missing config file: set $IRONFLOW_CONFIG or create ./ironflow.toml"
    ))
}

#[derive(Clone, Deserialize)]
pub struct IronflowConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "ironflow=debug"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl IronflowConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: IronflowConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn effective_log_filter(&self) -> String {
        self.log_filter
            .clone()
            .unwrap_or_else(|| self.log_level.clone())
    }
}

impl Default for IronflowConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            runtime: RuntimeConfig::default(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Target byte size of one engine batch accumulated by an exchange
    /// source before it is decoded. Soft threshold: a single larger chunk
    /// is flushed on its own.
    #[serde(default = "default_preferred_output_batch_bytes")]
    pub preferred_output_batch_bytes: usize,

    /// Codec used to decode remote data chunks into engine batches.
    #[serde(default = "default_exchange_codec")]
    pub exchange_codec: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            preferred_output_batch_bytes: default_preferred_output_batch_bytes(),
            exchange_codec: default_exchange_codec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IronflowConfig;

    #[test]
    fn defaults_apply_to_empty_toml() {
        let cfg: IronflowConfig = toml::from_str("").expect("empty config parses");
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.log_filter.is_none());
        assert_eq!(cfg.runtime.preferred_output_batch_bytes, 2 * 1024 * 1024);
        assert_eq!(cfg.runtime.exchange_codec, "arrow_ipc");
    }

    #[test]
    fn runtime_section_overrides_defaults() {
        let cfg: IronflowConfig = toml::from_str(
            r#"
            log_level = "debug"

            [runtime]
            preferred_output_batch_bytes = 1048576
            exchange_codec = "arrow_ipc"
            "#,
        )
        .expect("config parses");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.runtime.preferred_output_batch_bytes, 1_048_576);
    }

    #[test]
    fn log_filter_takes_precedence() {
        let cfg: IronflowConfig = toml::from_str(
            r#"
            log_level = "info"
            log_filter = "ironflow=trace"
            "#,
        )
        .expect("config parses");
        assert_eq!(cfg.effective_log_filter(), "ironflow=trace");
    }
}
