//! Supervisor configuration and its on-disk persistence
//! (`spec.md` 4.5.9): an atomic rewrite that tolerates directives it
//! doesn't understand, grounded on the teacher's `enterprise/cluster/config.rs`
//! builder pattern.

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuning for one monitored master and the observer watching it.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub master_name: String,
    pub quorum: usize,
    pub down_after: Duration,
    pub failover_timeout: Duration,
    pub parallel_syncs: usize,
    pub config_epoch: u64,
}

impl SupervisorConfig {
    pub fn new(master_name: impl Into<String>, quorum: usize) -> Self {
        SupervisorConfig {
            master_name: master_name.into(),
            quorum,
            down_after: Duration::from_millis(30_000),
            failover_timeout: Duration::from_millis(180_000),
            parallel_syncs: 1,
            config_epoch: 0,
        }
    }

    pub fn down_after(mut self, d: Duration) -> Self {
        self.down_after = d;
        self
    }

    pub fn failover_timeout(mut self, d: Duration) -> Self {
        self.failover_timeout = d;
        self
    }

    pub fn parallel_syncs(mut self, n: usize) -> Self {
        self.parallel_syncs = n;
        self
    }
}

/// Rewrites a supervisor's config file atomically, preserving any
/// directive it didn't itself write (`spec.md` 4.5.9's "config
/// persistence tolerates unknown directives" requirement) so a file
/// hand-edited with directives this build doesn't know about survives
/// round-tripping.
#[derive(Debug, Default)]
pub struct ConfigRewriter {
    known: BTreeMap<String, String>,
    passthrough: Vec<String>,
}

impl ConfigRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an existing file, splitting recognized `key value` lines
    /// from everything else (comments, unknown directives, blank
    /// lines), which are kept verbatim for passthrough.
    pub fn load(path: &Path, recognized_keys: &[&str]) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::PersistFailed(e.to_string()))?;
        let mut rewriter = ConfigRewriter::new();
        for line in text.lines() {
            let trimmed = line.trim();
            let key = trimmed.split_whitespace().next().unwrap_or("");
            if recognized_keys.contains(&key) {
                let value = trimmed[key.len()..].trim().to_string();
                rewriter.known.insert(key.to_string(), value);
            } else {
                rewriter.passthrough.push(line.to_string());
            }
        }
        Ok(rewriter)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.known.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.known.get(key).map(|s| s.as_str())
    }

    /// Rewrite the file atomically: write to a sibling temp file, then
    /// rename over the target, so a crash mid-write never leaves a
    /// truncated config on disk.
    pub fn persist(&self, path: &Path) -> CoreResult<()> {
        let mut contents = String::new();
        for line in &self.passthrough {
            contents.push_str(line);
            contents.push('\n');
        }
        for (key, value) in &self.known {
            contents.push_str(key);
            contents.push(' ');
            contents.push_str(value);
            contents.push('\n');
        }

        let tmp_path = temp_path_for(path);
        let result = (|| -> CoreResult<()> {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp_path)
                .map_err(|e| CoreError::PersistFailed(e.to_string()))?;
            file.write_all(contents.as_bytes())
                .map_err(|e| CoreError::PersistFailed(e.to_string()))?;
            file.sync_all().map_err(|e| CoreError::PersistFailed(e.to_string()))?;
            std::fs::rename(&tmp_path, path).map_err(|e| CoreError::PersistFailed(e.to_string()))?;
            Ok(())
        })();
        if let Err(e) = &result {
            log::warn!("config rewrite for {} failed: {e}", path.display());
        }
        result
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
