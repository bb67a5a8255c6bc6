//! Persistent open-port statistics
//!
//! Every port seen open increments a counter in a small JSON document,
//! `{"ports": {"80": {"count": 3}}}`, kept under the user's config directory.

use crate::scanner::engine::StatsRecorder;
use crate::{Result, ScanError};
use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Serializes load-modify-store cycles within the process
static STATS_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PortEntry {
    count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StatsFile {
    #[serde(default)]
    ports: BTreeMap<String, PortEntry>,
}

/// Stats manager
#[derive(Debug, Clone)]
pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    /// Store at `<config dir>/portsweep/stats/stats.json`
    pub fn new() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ScanError::StatsError("config directory not found".to_string()))?
            .join("portsweep")
            .join("stats");
        Self::with_path(dir.join("stats.json"))
    }

    /// Store at an explicit path; parent directories and an empty file are created
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| stats_io("creating", parent, e))?;
        }
        let store = Self { path };
        if !store.path.exists() {
            store.save(&StatsFile::default())?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StatsFile> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| stats_io("reading", &self.path, e))?;
        if content.trim().is_empty() {
            return Ok(StatsFile::default());
        }
        serde_json::from_str(&content).map_err(|e| {
            ScanError::StatsError(format!("corrupt stats file {}: {}", self.path.display(), e))
        })
    }

    /// Write to a sibling temp file, then rename over the original
    fn save(&self, stats: &StatsFile) -> Result<()> {
        let json = serde_json::to_string_pretty(stats)
            .map_err(|e| ScanError::StatsError(format!("encoding stats: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| stats_io("writing", &tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| stats_io("replacing", &self.path, e))
    }

    /// Bump the counter of every port; a port seen for the first time counts 1
    pub fn record_open_ports(&self, ports: &[u16]) -> Result<()> {
        if ports.is_empty() {
            return Ok(());
        }
        let _guard = STATS_LOCK
            .lock()
            .map_err(|_| ScanError::StatsError("stats lock poisoned".to_string()))?;

        let mut stats = self.load()?;
        for port in ports {
            stats.ports.entry(port.to_string()).or_default().count += 1;
        }
        self.save(&stats)?;
        log::debug!("recorded {} open port(s) in {}", ports.len(), self.path.display());
        Ok(())
    }

    /// Count for every recorded port. Keys that are not ports are skipped.
    pub fn load_counts(&self) -> Result<BTreeMap<u16, u64>> {
        let stats = self.load()?;
        let mut counts = BTreeMap::new();
        for (key, entry) in stats.ports {
            match key.parse::<u16>() {
                Ok(port) => {
                    counts.insert(port, entry.count);
                }
                Err(_) => log::warn!("skipping stats key {:?}", key),
            }
        }
        Ok(counts)
    }

    /// Every port, most frequently open first, ties by port number
    pub fn all(&self) -> Result<Vec<(u16, u64)>> {
        let mut ranked: Vec<(u16, u64)> = self.load_counts()?.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(ranked)
    }

    pub fn top(&self, n: usize) -> Result<Vec<(u16, u64)>> {
        let mut ranked = self.all()?;
        ranked.truncate(n);
        Ok(ranked)
    }
}

impl StatsRecorder for StatsStore {
    fn record_open_ports(&self, ports: &[u16]) -> Result<()> {
        StatsStore::record_open_ports(self, ports)
    }
}

fn stats_io(action: &str, path: &Path, err: std::io::Error) -> ScanError {
    ScanError::StatsError(format!("{} {}: {}", action, path.display(), err))
}

/// Print a ranking as the `--stats` views show it
pub fn print_ranking(title: &str, ranked: &[(u16, u64)]) {
    if ranked.is_empty() {
        println!("{}", "No port statistics recorded yet.".yellow());
        return;
    }
    println!("{}", title.bright_cyan().bold());
    println!("{:>8}  {}", "PORT".bright_white().bold(), "TIMES OPEN".bright_white().bold());
    for (port, count) in ranked {
        println!("{:>8}  {}", port.to_string().bright_green(), count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, StatsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::with_path(dir.path().join("stats").join("stats.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_creates_empty_file() {
        let (_dir, store) = store();
        let content = fs::read_to_string(store.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, serde_json::json!({ "ports": {} }));
        assert!(store.load_counts().unwrap().is_empty());
    }

    #[test]
    fn test_first_sighting_counts_one() {
        let (_dir, store) = store();
        store.record_open_ports(&[22, 80]).unwrap();
        store.record_open_ports(&[80]).unwrap();
        let counts = store.load_counts().unwrap();
        assert_eq!(counts[&22], 1);
        assert_eq!(counts[&80], 2);
    }

    #[test]
    fn test_ranking_order() {
        let (_dir, store) = store();
        store.record_open_ports(&[443, 22, 80]).unwrap();
        store.record_open_ports(&[443, 80]).unwrap();
        store.record_open_ports(&[443]).unwrap();
        assert_eq!(store.all().unwrap(), vec![(443, 3), (80, 2), (22, 1)]);
        assert_eq!(store.top(2).unwrap(), vec![(443, 3), (80, 2)]);
    }

    #[test]
    fn test_corrupt_file_is_stats_error() {
        let (_dir, store) = store();
        fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.record_open_ports(&[80]), Err(ScanError::StatsError(_))));
    }
}
