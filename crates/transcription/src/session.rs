use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TranscribeResult;
use crate::pool::WorkerLease;
use crate::worker::Worker;

/// Per-request isolation: its own id, scratch directory and worker lease.
///
/// Closing or dropping the session releases the lease and removes the
/// scratch directory.
pub struct Session {
    id: String,
    scratch: Option<TempDir>,
    lease: Option<WorkerLease>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Session {
    /// Creates `session-<id>-*` under `scratch_root`, creating the root if needed.
    pub fn open(scratch_root: &Path) -> TranscribeResult<Self> {
        let id = Uuid::new_v4().simple().to_string();
        std::fs::create_dir_all(scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("session-{}-", id))
            .tempdir_in(scratch_root)?;

        info!(session_id = %id, scratch = %scratch.path().display(), "Session opened");
        Ok(Self {
            id,
            scratch: Some(scratch),
            lease: None,
            started_at: Utc::now(),
            started: Instant::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|dir| dir.path())
    }

    pub fn scratch_path(&self) -> Option<PathBuf> {
        self.scratch_dir().map(Path::to_path_buf)
    }

    /// Takes ownership of a lease; any previously attached lease is released.
    pub fn attach_lease(&mut self, lease: WorkerLease) {
        debug!(session_id = %self.id, lease = %lease.id(), mode = %lease.mode(), "Lease attached");
        if let Some(previous) = self.lease.replace(lease) {
            previous.release();
        }
    }

    pub fn lease(&self) -> Option<&WorkerLease> {
        self.lease.as_ref()
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        self.lease.as_ref().map(|l| l.workers()).unwrap_or(&[])
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Releases the lease, then removes the scratch directory.
    pub fn close(mut self) -> TranscribeResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> TranscribeResult<()> {
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().to_path_buf();
            scratch.close()?;
            info!(
                session_id = %self.id,
                scratch = %path.display(),
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "Session closed"
            );
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(session_id = %self.id, "Session cleanup failed: {}", e);
        }
    }
}
