use anyhow::{anyhow, Result};
use pingwatch_model::{StoreSnapshot, TargetVariables};
use pingwatch_monitor::{MemoryStore, PublishError, VariableStore};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Memory store that mirrors every change into a JSON snapshot file for
/// external readers.
#[derive(Debug)]
pub struct SnapshotStore {
    memory: MemoryStore,
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
    // Set when the last file write failed, so the next publish retries it
    // even if the values did not change.
    pending: AtomicBool,
}

impl SnapshotStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            memory: MemoryStore::new(),
            path,
            write_lock: Mutex::new(()),
            pending: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.memory.snapshot()
    }

    fn flush(&self, path: &Path, id: &str) -> Result<(), PublishError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match write_json(path, &self.memory.snapshot()) {
            Ok(()) => {
                self.pending.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                self.pending.store(true, Ordering::SeqCst);
                Err(PublishError::Write {
                    id: id.to_string(),
                    message: format!("{err:#}"),
                })
            }
        }
    }
}

impl VariableStore for SnapshotStore {
    fn write_group(&self, variables: TargetVariables) -> Result<bool, PublishError> {
        let id = variables.id.clone();
        let changed = self.memory.write_group(variables)?;
        if let Some(path) = &self.path {
            if changed || self.pending.load(Ordering::SeqCst) {
                self.flush(path, &id)?;
            }
        }
        Ok(changed)
    }

    fn read(&self, id: &str) -> Option<TargetVariables> {
        self.memory.read(id)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .map_err(|err| anyhow!("failed to create output directory {:?}: {}", parent, err))?;
    }

    let tmp_path = temp_path(path);
    let mut file = fs::File::create(&tmp_path)
        .map_err(|err| anyhow!("failed to create temp file {:?}: {}", tmp_path, err))?;
    file.write_all(data)
        .map_err(|err| anyhow!("failed to write temp file {:?}: {}", tmp_path, err))?;
    file.sync_all()
        .map_err(|err| anyhow!("failed to sync temp file {:?}: {}", tmp_path, err))?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(anyhow!("failed to replace snapshot {:?}: {}", path, err));
    }

    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("snapshot");
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    parent.join(format!(".{}.part-{}-{}", file_name, pid, stamp))
}
