// Copyright 2026 Holdfast Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Quota accounting for the whole data root.
//!
//! One [`QuotaManager`] is shared by every repository under the data root,
//! including subrepositories. The byte counter is initialized by a
//! filesystem walk at startup and afterwards maintained by the write and
//! delete paths. Concurrent writers may each over-commit by at most one
//! in-flight blob; that drift is accepted.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use walkdir::WalkDir;

use crate::error::RepoError;

/// Tracks the total number of bytes stored under the data root and refuses
/// writes that would push it past the configured maximum.
pub struct QuotaManager {
    max_repo_size: i64,
    repo_size: AtomicI64,
}

impl QuotaManager {
    /// Creates a manager for `root`, tallying current disk usage before
    /// returning. The walk can take a while on large repositories.
    pub fn new(root: &Path, max_size: i64) -> Result<Self, RepoError> {
        let initial = tally_size(root)?;
        Ok(Self {
            max_repo_size: max_size,
            repo_size: AtomicI64::new(initial),
        })
    }

    /// Bytes currently accounted for.
    pub fn space_used(&self) -> i64 {
        self.repo_size.load(Ordering::Relaxed)
    }

    /// Space still available, or `None` if there is no limit.
    pub fn space_remaining(&self) -> Option<i64> {
        if self.max_repo_size == 0 {
            return None;
        }
        Some(self.max_repo_size - self.space_used())
    }

    /// The configured maximum size in bytes, 0 meaning unlimited.
    pub fn max_size(&self) -> i64 {
        self.max_repo_size
    }

    /// Checks a client-declared content length against the remaining space.
    ///
    /// The declared length cannot be trusted, so every write is gated again
    /// chunk by chunk; this check only lets us refuse an honest oversized
    /// upload before streaming it.
    pub fn check_declared_size(&self, content_length: i64) -> Result<(), RepoError> {
        if self.max_repo_size == 0 {
            return Ok(());
        }
        if self.space_used() + content_length > self.max_repo_size {
            return Err(RepoError::QuotaExceeded {
                limit: self.max_repo_size,
            });
        }
        Ok(())
    }

    /// Gates one chunk about to be written. Fails without side effects if
    /// the chunk does not fit in the remaining space.
    pub fn check_chunk(&self, len: usize) -> Result<(), RepoError> {
        if let Some(remaining) = self.space_remaining() {
            if len as i64 > remaining {
                return Err(RepoError::QuotaExceeded {
                    limit: self.max_repo_size,
                });
            }
        }
        Ok(())
    }

    /// Adjusts the accounted size by `delta`. Negative deltas roll back
    /// failed writes and account for deletes.
    pub fn add_usage(&self, delta: i64) {
        self.repo_size.fetch_add(delta, Ordering::Relaxed);
    }
}

/// Sums the sizes of all regular files under `root`.
fn tally_size(root: &Path) -> Result<i64, RepoError> {
    let mut size: i64 = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            size += entry.metadata().map_err(io::Error::from)?.len() as i64;
        }
    }
    Ok(size)
}
