//! Hash-linked append-only log of storage-side operations (C7).

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use qvault_core::types::Timestamp;
use qvault_crypto::hash::sha256_hex;

use crate::error::AuditError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub operation: String,
    pub subject: String,
    pub actor_key_id: String,
    pub prev_hash: String,
    pub entry_hash: String,
}

fn genesis_prev_hash() -> String {
    hex::encode([0u8; 32])
}

/// Length-prefixes each field before hashing so that, e.g., an operation of
/// `"a"` + subject `"bc"` never hashes identically to operation `"ab"` +
/// subject `"c"`.
fn compute_entry_hash(seq: u64, ts: Timestamp, op: &str, subject: &str, actor: &str, prev_hash: &str) -> String {
    let mut buf = Vec::new();
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&ts.to_be_bytes());
    for field in [op, subject, actor, prev_hash] {
        let bytes = field.as_bytes();
        buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(bytes);
    }
    sha256_hex(&buf)
}

impl AuditEntry {
    fn recompute_hash(&self) -> String {
        compute_entry_hash(
            self.seq,
            self.timestamp,
            &self.operation,
            &self.subject,
            &self.actor_key_id,
            &self.prev_hash,
        )
    }
}

struct Inner {
    file: File,
    entries: Vec<AuditEntry>,
    latest_hash: String,
}

/// The chain. One writer mutex serialises appends; reads take the same lock
/// briefly to clone out a snapshot, so they never block behind a disk
/// fsync for longer than copying a `Vec`.
pub struct Chain {
    inner: Mutex<Inner>,
    sequence: AtomicU64,
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub valid: bool,
    pub first_bad_seq: Option<u64>,
}

impl Chain {
    /// Opens (creating if absent) the append-only log at `path`, replaying
    /// it into memory. A trailing line that fails to parse is treated as a
    /// torn write from a crash mid-append and silently dropped; any other
    /// parse failure, or a broken hash link, is `Fatal` — matching §5's
    /// "a bad link aborts startup with a clear error".
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let read_file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let reader = BufReader::new(&read_file);

        let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
        let mut entries = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    let is_last = i == lines.len() - 1;
                    if is_last {
                        tracing::warn!(line = i, "dropping unparseable trailing audit line (torn write)");
                        break;
                    }
                    return Err(AuditError::Corrupt {
                        line: i,
                        detail: e.to_string(),
                    });
                }
            }
        }

        let result = verify_entries(&entries);
        if !result.valid {
            return Err(AuditError::ChainBroken {
                first_bad_seq: result.first_bad_seq.unwrap_or(0),
            });
        }

        let latest_hash = entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(genesis_prev_hash);
        let sequence = entries.len() as u64;

        let write_file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                file: write_file,
                entries,
                latest_hash,
            }),
            sequence: AtomicU64::new(sequence),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a new entry. The line is written and fsynced before the
    /// in-memory sequence/latest-hash advance, so a crash between the two
    /// leaves the file as the sole source of truth on restart.
    pub fn append(&self, operation: &str, subject: &str, actor_key_id: &str, now: Timestamp) -> Result<AuditEntry, AuditError> {
        let mut inner = self.inner.lock().expect("audit chain mutex poisoned");
        let seq = inner.entries.len() as u64;
        let entry_hash = compute_entry_hash(seq, now, operation, subject, actor_key_id, &inner.latest_hash);
        let entry = AuditEntry {
            seq,
            timestamp: now,
            operation: operation.to_string(),
            subject: subject.to_string(),
            actor_key_id: actor_key_id.to_string(),
            prev_hash: inner.latest_hash.clone(),
            entry_hash: entry_hash.clone(),
        };

        let line = serde_json::to_string(&entry).map_err(|e| AuditError::Serialization(e.to_string()))?;
        inner.file.write_all(line.as_bytes())?;
        inner.file.write_all(b"\n")?;
        inner.file.sync_all()?;

        inner.latest_hash = entry_hash;
        inner.entries.push(entry.clone());
        self.sequence.store(inner.entries.len() as u64, Ordering::SeqCst);

        tracing::info!(seq = entry.seq, op = operation, subject, actor_key_id, "audit entry appended");
        Ok(entry)
    }

    pub fn get_entries(&self, limit: usize, offset: usize, op_filter: Option<&str>) -> Vec<AuditEntry> {
        let inner = self.inner.lock().expect("audit chain mutex poisoned");
        inner
            .entries
            .iter()
            .filter(|e| op_filter.map(|f| e.operation == f).unwrap_or(true))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn get_latest_hash(&self) -> String {
        self.inner.lock().expect("audit chain mutex poisoned").latest_hash.clone()
    }

    pub fn verify(&self) -> VerifyResult {
        let inner = self.inner.lock().expect("audit chain mutex poisoned");
        verify_entries(&inner.entries)
    }

    /// Canonical JSON dump of the full chain for off-site archival.
    pub fn export(&self) -> Result<Vec<u8>, AuditError> {
        let inner = self.inner.lock().expect("audit chain mutex poisoned");
        serde_json::to_vec_pretty(&inner.entries).map_err(|e| AuditError::Serialization(e.to_string()))
    }
}

fn verify_entries(entries: &[AuditEntry]) -> VerifyResult {
    let mut prev_hash = genesis_prev_hash();
    for (i, entry) in entries.iter().enumerate() {
        if entry.seq != i as u64 {
            return VerifyResult {
                valid: false,
                first_bad_seq: Some(entry.seq),
            };
        }
        if entry.prev_hash != prev_hash {
            return VerifyResult {
                valid: false,
                first_bad_seq: Some(entry.seq),
            };
        }
        if entry.recompute_hash() != entry.entry_hash {
            return VerifyResult {
                valid: false,
                first_bad_seq: Some(entry.seq),
            };
        }
        prev_hash = entry.entry_hash.clone();
    }
    VerifyResult {
        valid: true,
        first_bad_seq: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_chain() -> (TempDir, Chain) {
        let dir = TempDir::new().unwrap();
        let chain = Chain::open(dir.path().join("audit.jsonl")).unwrap();
        (dir, chain)
    }

    #[test]
    fn genesis_prev_hash_is_all_zero() {
        let (_dir, chain) = temp_chain();
        let entry = chain.append("put", "data/ab/deadbeef", "abcd1234", 1_700_000_000).unwrap();
        assert_eq!(entry.prev_hash, genesis_prev_hash());
    }

    #[test]
    fn appended_entries_link_and_verify() {
        let (_dir, chain) = temp_chain();
        for i in 0..100 {
            chain
                .append("put", &format!("blob-{i}"), "actor-1", 1_700_000_000 + i)
                .unwrap();
        }
        assert_eq!(chain.get_sequence(), 100);
        let result = chain.verify();
        assert!(result.valid);
        assert_eq!(result.first_bad_seq, None);
    }

    #[test]
    fn tampering_an_entry_is_detected() {
        let (dir, chain) = temp_chain();
        for i in 0..10 {
            chain
                .append("put", &format!("blob-{i}"), "actor-1", 1_700_000_000 + i)
                .unwrap();
        }
        drop(chain);

        let path = dir.path().join("audit.jsonl");
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = contents.lines().map(|s| s.to_string()).collect();
        let mut entry: AuditEntry = serde_json::from_str(&lines[3]).unwrap();
        entry.subject = "tampered".to_string();
        lines[3] = serde_json::to_string(&entry).unwrap();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let err = Chain::open(&path).unwrap_err();
        assert!(matches!(err, AuditError::ChainBroken { first_bad_seq: 3 }));
    }

    #[test]
    fn trailing_partial_write_is_dropped_not_fatal() {
        let (dir, chain) = temp_chain();
        chain.append("put", "blob-0", "actor-1", 1_700_000_000).unwrap();
        drop(chain);

        let path = dir.path().join("audit.jsonl");
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"seq\":1,\"timestamp\":170").unwrap(); // torn write, no newline

        let reopened = Chain::open(&path).unwrap();
        assert_eq!(reopened.get_sequence(), 1);
    }

    #[test]
    fn export_round_trips_as_json() {
        let (_dir, chain) = temp_chain();
        chain.append("put", "blob-0", "actor-1", 1_700_000_000).unwrap();
        let bytes = chain.export().unwrap();
        let parsed: Vec<AuditEntry> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
