//! Component C3: append-only audit log.
//!
//! Writes one JSON line per `AuditEntry`, rotating into a new file per UTC
//! day or once the current file crosses `max_bytes`. No direct teacher
//! file to ground on — the append-only-file-plus-rotation shape is common
//! ambient infrastructure, so this follows the teacher's
//! `Mutex<Connection>`-guarded single-writer pattern from
//! `aegis-memory::manager` rather than inventing a new idiom.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::entry::AuditEntry;
use crate::error::{AuditError, Result};

const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024; // 10 MB per file

struct OpenFile {
    date: NaiveDate,
    seq: u32,
    handle: File,
    bytes_written: u64,
}

/// Append-only audit trail writer. Every `AuditEntry` is redacted, then
/// appended as one JSON line, then logged through `tracing` so operators
/// see it in the process log as well as the durable file.
pub struct AuditLog {
    dir: PathBuf,
    max_bytes: u64,
    current: Mutex<Option<OpenFile>>,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_bytes: DEFAULT_MAX_BYTES,
            current: Mutex::new(None),
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Redact, serialize, and append one entry. Never panics on a
    /// malformed entry — callers get the error back so a bad audit write
    /// doesn't silently drop the record.
    pub fn log(&self, entry: AuditEntry) -> Result<()> {
        let entry = entry.redact();
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let today = Utc::now().date_naive();

        let next_seq = match guard.as_ref() {
            None => None,
            Some(f) if f.date != today => Some(0),
            Some(f) if f.bytes_written + line.len() as u64 > self.max_bytes => Some(f.seq + 1),
            Some(_) => None,
        };

        if let Some(seq) = next_seq {
            *guard = Some(self.open_for(today, seq)?);
        } else if guard.is_none() {
            *guard = Some(self.open_for(today, 0)?);
        }

        let open = guard.as_mut().expect("just opened");
        open.handle.write_all(&line)?;
        open.handle.flush()?;
        open.bytes_written += line.len() as u64;

        info!(
            action = %entry.action,
            decision = %entry.decision,
            channel = %entry.channel,
            "audit_entry_written"
        );

        Ok(())
    }

    fn open_for(&self, date: NaiveDate, seq: u32) -> Result<OpenFile> {
        let path = self.dir.join(format!("audit-{date}-{seq:03}.jsonl"));
        let handle = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes_written = handle.metadata()?.len();
        Ok(OpenFile {
            date,
            seq,
            handle,
            bytes_written,
        })
    }

    /// Iterate every entry across every rotated file, in chronological
    /// (filename-sorted) order.
    pub fn read_all(&self) -> Result<Vec<AuditEntry>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "jsonl").unwrap_or(false))
            .collect();
        paths.sort();

        let mut entries = Vec::new();
        for path in paths {
            entries.extend(read_file(&path)?);
        }
        Ok(entries)
    }
}

fn read_file(path: &Path) -> Result<Vec<AuditEntry>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = serde_json::from_str(&line).map_err(|_| {
            AuditError::Corrupt(format!("{}:{}", path.display(), idx + 1))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("aegis-audit-test-{}", unique()));
        dir
    }

    fn unique() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        format!(
            "{}-{:?}",
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos(),
            std::thread::current().id()
        )
    }

    #[test]
    fn log_then_read_all_round_trips() {
        let dir = scratch_dir();
        let log = AuditLog::new(&dir).unwrap();
        log.log(AuditEntry::new("tool:shell", "agent", "ls -la", "allow", "gateway"))
            .unwrap();
        log.log(AuditEntry::new("tool:file", "agent", "/tmp/x", "deny", "gateway"))
            .unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "tool:shell");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn secret_in_detail_is_redacted_on_write() {
        let dir = scratch_dir();
        let log = AuditLog::new(&dir).unwrap();
        log.log(
            AuditEntry::new("tool:vault", "agent", "api_key", "allow", "gateway")
                .with_detail("sk-abcdefghijklmnopqrstuvwxyz123456"),
        )
        .unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries[0].detail, "[REDACTED]");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn secret_substring_is_redacted_without_losing_surrounding_text() {
        let dir = scratch_dir();
        let log = AuditLog::new(&dir).unwrap();
        log.log(
            AuditEntry::new("tool:vault", "agent", "api_key", "allow", "gateway")
                .with_detail("key sk-abcdefghijklmnopqrstuvwxyz123456 in prod"),
        )
        .unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries[0].detail, "key [REDACTED] in prod");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rotation_starts_a_new_file_past_size_ceiling() {
        let dir = scratch_dir();
        let log = AuditLog::new(&dir).unwrap().with_max_bytes(10);
        log.log(AuditEntry::new("a", "agent", "r", "allow", "gateway")).unwrap();
        log.log(AuditEntry::new("b", "agent", "r", "allow", "gateway")).unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
