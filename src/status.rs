use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, TarjimError};

/// Job progress snapshot, single-writer (the orchestrator), readable by any
/// external monitoring process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// 0-100
    pub progress: u32,
    pub current_file: String,
    pub total_files: usize,
    pub files_done: usize,
    /// Human-readable phase label
    pub task: String,
}

impl JobStatus {
    pub fn phase(progress: u32, task: impl Into<String>) -> Self {
        Self {
            progress,
            task: task.into(),
            ..Default::default()
        }
    }
}

/// Crash-resilient status file. Every write goes through a sibling temp file
/// and an atomic rename so readers never observe a torn write.
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, status: &JobStatus) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| TarjimError::Status("Status path has no parent".to_string()))?;
        std::fs::create_dir_all(parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| TarjimError::Status(format!("Failed to create temp file: {}", e)))?;
        serde_json::to_writer(&mut temp, status)?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|e| TarjimError::Status(format!("Failed to persist status: {}", e)))?;

        debug!(
            "Status: {}% {} ({}/{})",
            status.progress, status.task, status.files_done, status.total_files
        );
        Ok(())
    }

    pub fn read(&self) -> Result<JobStatus> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseRecord {
    owner: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
    heartbeat_at: DateTime<Utc>,
}

/// Single-flight lease for the batch job. Claiming creates the lease file
/// with an exclusive create-new open, so two near-simultaneous claims cannot
/// both succeed. A live lease always rejects a second claim; only a lease
/// whose heartbeat has expired may be broken.
#[derive(Debug, Clone)]
pub struct JobLease {
    path: PathBuf,
    ttl: Duration,
}

impl JobLease {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

    pub fn new<P: Into<PathBuf>>(path: P, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn claim(&self) -> Result<LeaseGuard> {
        let owner = Uuid::new_v4().to_string();

        match self.try_create(&owner) {
            Ok(()) => Ok(LeaseGuard {
                path: self.path.clone(),
                owner,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if self.holder_expired() {
                    warn!("Breaking expired job lease at {}", self.path.display());
                    let _ = std::fs::remove_file(&self.path);
                    self.try_create(&owner).map_err(|_| {
                        TarjimError::Conflict("lease was reclaimed concurrently".to_string())
                    })?;
                    Ok(LeaseGuard {
                        path: self.path.clone(),
                        owner,
                    })
                } else {
                    Err(TarjimError::Conflict(format!(
                        "live lease at {}",
                        self.path.display()
                    )))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn try_create(&self, owner: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let record = LeaseRecord {
            owner: owner.to_string(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
            heartbeat_at: Utc::now(),
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        file.write_all(serde_json::to_string(&record)?.as_bytes())?;
        file.flush()
    }

    /// True when the lease file holds a record whose heartbeat is older than
    /// the TTL. An unreadable record is treated as live, not expired, so a
    /// partially-written lease is never stolen.
    fn holder_expired(&self) -> bool {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return false;
        };
        let Ok(record) = serde_json::from_str::<LeaseRecord>(&content) else {
            return false;
        };

        let age = Utc::now().signed_duration_since(record.heartbeat_at);
        age.to_std()
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }
}

/// Held lease. Dropping releases the lease file, but only while this guard
/// is still the recorded owner.
#[derive(Debug)]
pub struct LeaseGuard {
    path: PathBuf,
    owner: String,
}

impl LeaseGuard {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Refresh the heartbeat so a long batch is not mistaken for a crashed
    /// holder. Called between work items.
    pub fn heartbeat(&self) -> Result<()> {
        let content = std::fs::read_to_string(&self.path)?;
        let mut record: LeaseRecord = serde_json::from_str(&content)?;
        if record.owner != self.owner {
            return Err(TarjimError::Conflict(
                "lease is no longer held by this job".to_string(),
            ));
        }

        record.heartbeat_at = Utc::now();
        let parent = self
            .path
            .parent()
            .ok_or_else(|| TarjimError::Status("Lease path has no parent".to_string()))?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| TarjimError::Status(format!("Failed to create temp file: {}", e)))?;
        serde_json::to_writer(&mut temp, &record)?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|e| TarjimError::Status(format!("Failed to persist lease: {}", e)))?;
        Ok(())
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let still_owner = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str::<LeaseRecord>(&content).ok())
            .map(|record| record.owner == self.owner)
            .unwrap_or(false);

        if still_owner {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to release job lease: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path().join("status.json"));

        let status = JobStatus {
            progress: 40,
            current_file: "movie.mkv".to_string(),
            total_files: 5,
            files_done: 2,
            task: "(3/5) movie.mkv".to_string(),
        };
        store.write(&status).unwrap();
        assert_eq!(store.read().unwrap(), status);
    }

    #[test]
    fn status_write_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path().join("status.json"));

        store.write(&JobStatus::phase(0, "starting")).unwrap();
        store.write(&JobStatus::phase(100, "done")).unwrap();
        assert_eq!(store.read().unwrap().progress, 100);
    }

    #[test]
    fn status_file_is_plain_json_for_external_readers() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path().join("status.json"));
        store
            .write(&JobStatus {
                progress: 10,
                current_file: "a.mkv".to_string(),
                total_files: 2,
                files_done: 0,
                task: "(1/2) a.mkv".to_string(),
            })
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["progress"], 10);
        assert_eq!(raw["current_file"], "a.mkv");
        assert_eq!(raw["total_files"], 2);
        assert_eq!(raw["files_done"], 0);
        assert_eq!(raw["task"], "(1/2) a.mkv");
    }

    #[test]
    fn second_claim_is_rejected_while_lease_is_live() {
        let dir = tempfile::tempdir().unwrap();
        let lease = JobLease::new(dir.path().join("job.lease"), JobLease::DEFAULT_TTL);

        let guard = lease.claim().unwrap();
        let second = lease.claim();
        assert!(matches!(second, Err(TarjimError::Conflict(_))));
        drop(guard);
    }

    #[test]
    fn dropping_the_guard_releases_the_lease() {
        let dir = tempfile::tempdir().unwrap();
        let lease = JobLease::new(dir.path().join("job.lease"), JobLease::DEFAULT_TTL);

        let guard = lease.claim().unwrap();
        drop(guard);
        assert!(lease.claim().is_ok());
    }

    #[test]
    fn expired_lease_can_be_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.lease");

        let stale = LeaseRecord {
            owner: "dead-owner".to_string(),
            pid: 1,
            acquired_at: Utc::now() - chrono::Duration::hours(2),
            heartbeat_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lease = JobLease::new(&path, Duration::from_secs(60));
        let guard = lease.claim().unwrap();
        assert_ne!(guard.owner(), "dead-owner");
    }

    #[test]
    fn unreadable_lease_is_treated_as_live() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.lease");
        std::fs::write(&path, "not json").unwrap();

        let lease = JobLease::new(&path, Duration::from_secs(60));
        assert!(matches!(lease.claim(), Err(TarjimError::Conflict(_))));
    }

    #[test]
    fn heartbeat_refreshes_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.lease");
        let lease = JobLease::new(&path, Duration::from_secs(60));

        let guard = lease.claim().unwrap();
        let before: LeaseRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        guard.heartbeat().unwrap();
        let after: LeaseRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(after.heartbeat_at > before.heartbeat_at);
        assert_eq!(after.owner, before.owner);
    }
}
