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

//! Error types for the repository storage engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by repository storage operations.
///
/// Each variant corresponds to one class of HTTP response; the mapping to
/// status codes lives in the API layer.
#[derive(Error, Debug)]
pub enum RepoError {
    /// A path component or object name failed validation.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// The requested file does not exist.
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// The target file already exists; objects are immutable once written.
    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),

    /// The operation is refused by repository policy (append-only or
    /// write-only mode).
    #[error("operation forbidden by repository policy")]
    Forbidden,

    /// The request body could not be read, or its content hash does not
    /// match the object ID it was uploaded under.
    #[error("bad request body: {0}")]
    BadBody(String),

    /// Writing would exceed the configured maximum repository size.
    #[error("repository has reached maximum size ({limit} bytes)")]
    QuotaExceeded {
        /// Configured maximum size in bytes.
        limit: i64,
    },

    /// The filesystem itself is out of space (ENOSPC or EDQUOT).
    #[error("no space left on device")]
    DiskFull,

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Classifies an I/O error raised on a write path. Disk-full conditions
    /// get their own variant so the client can be told to stop retrying.
    pub fn from_write_io(err: std::io::Error) -> Self {
        if is_disk_full(&err) {
            RepoError::DiskFull
        } else {
            RepoError::Io(err)
        }
    }
}

/// Returns true if `err` is ENOSPC or EDQUOT.
#[cfg(unix)]
pub fn is_disk_full(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOSPC) | Some(libc::EDQUOT))
}

#[cfg(not(unix))]
pub fn is_disk_full(_err: &std::io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_full_classification() {
        let enospc = std::io::Error::from_raw_os_error(libc::ENOSPC);
        assert!(matches!(
            RepoError::from_write_io(enospc),
            RepoError::DiskFull
        ));

        let enoent = std::io::Error::from_raw_os_error(libc::ENOENT);
        assert!(matches!(RepoError::from_write_io(enoent), RepoError::Io(_)));
    }
}
