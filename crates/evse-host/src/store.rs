use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use evse_core::{EvseError, EvseResult, Slot, SLOT_COUNT};
use evse_hal::ConfigStore;
use log::{debug, info};
use spin::Mutex;

const RECORD_LEN: usize = 4;
const FILE_NAME: &str = "slot_defaults.bin";

// Record: max current (u16 LE), active, clear-on-disconnect
fn encode(defaults: &[Slot]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(defaults.len() * RECORD_LEN);
    for slot in defaults {
        buf.extend_from_slice(&slot.max_current_ma.to_le_bytes());
        buf.push(slot.active as u8);
        buf.push(slot.clear_on_disconnect as u8);
    }
    buf
}

fn decode(raw: &[u8]) -> anyhow::Result<[Slot; SLOT_COUNT]> {
    if raw.len() != SLOT_COUNT * RECORD_LEN {
        bail!("expected {} bytes, found {}", SLOT_COUNT * RECORD_LEN, raw.len());
    }
    let mut slots = [Slot::inactive(); SLOT_COUNT];
    for (slot, rec) in slots.iter_mut().zip(raw.chunks_exact(RECORD_LEN)) {
        *slot = Slot::new(u16::from_le_bytes([rec[0], rec[1]]), rec[2] != 0, rec[3] != 0);
    }
    Ok(slots)
}

/// Slot defaults in a single file, replaced atomically on every write.
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating state directory {}", root.display()))?;
        Ok(Self { root })
    }

    fn path(&self) -> PathBuf {
        self.root.join(FILE_NAME)
    }

    /// Stored defaults, or `None` on first boot.
    pub fn load(&self) -> anyhow::Result<Option<[Slot; SLOT_COUNT]>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let slots = decode(&raw).with_context(|| format!("decoding {}", path.display()))?;
        info!("Store: restored slot defaults from {}", path.display());
        Ok(Some(slots))
    }

    fn write(&self, data: &[u8]) -> std::io::Result<()> {
        let path = self.path();
        let tmp_path = path.with_extension("tmp");

        // 1. Write .tmp
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(data)?;
            // 2. FSYNC
            file.sync_all()?;
        }

        // 3. Rename (atomic)
        fs::rename(&tmp_path, &path)?;

        // 4. Sync parent dir
        if let Ok(dir) = File::open(&self.root) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

impl ConfigStore for FileSystemStore {
    fn persist_slot_defaults(&mut self, defaults: &[Slot]) -> EvseResult<()> {
        self.write(&encode(defaults)).map_err(|_| EvseError::HalError)?;
        debug!("Store: slot defaults written to {}", self.path().display());
        Ok(())
    }
}

/// In-memory store that remembers every write. Clones share the record.
#[derive(Clone, Default)]
pub struct MemoryStore {
    writes: Arc<Mutex<Vec<Vec<Slot>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn last(&self) -> Option<Vec<Slot>> {
        self.writes.lock().last().cloned()
    }
}

impl ConfigStore for MemoryStore {
    fn persist_slot_defaults(&mut self, defaults: &[Slot]) -> EvseResult<()> {
        self.writes.lock().push(defaults.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_truncated_file() {
        assert!(decode(&[0u8; 7]).is_err());
    }
}
