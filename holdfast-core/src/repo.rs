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

//! The filesystem object store for a single backup repository.
//!
//! A repository is a directory holding an optional `config` file and one
//! subdirectory per object type. Data blobs are sharded into 256
//! two-hex-digit subdirectories by the first byte of their ID; all other
//! types are flat. Objects are immutable: they are created exclusively,
//! never modified, and deleted only where policy allows.
//!
//! Writes stream into a uniquely named temp file in the target directory
//! and are committed by hard-linking the temp file to its final name. The
//! link fails with "already exists" if a concurrent writer got there first,
//! so the loser can roll back its own temp file and quota contribution
//! without ever touching the winner's blob.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::RepoError;
use crate::quota::QuotaManager;

/// Default mode for repository directories.
pub const DEFAULT_DIR_MODE: u32 = 0o700;

/// Default mode for repository files.
pub const DEFAULT_FILE_MODE: u32 = 0o600;

/// Directory mode when group access is enabled.
pub const GROUP_DIR_MODE: u32 = 0o770;

/// File mode when group access is enabled.
pub const GROUP_FILE_MODE: u32 = 0o660;

/// Suffix inserted between an object ID and the random part of its temp
/// file name.
const TEMP_SUFFIX: &str = ".holdfast-temp";

/// The object kinds a repository stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Data,
    Index,
    Keys,
    Locks,
    Snapshots,
}

impl ObjectType {
    /// All object types, in directory-creation order.
    pub const ALL: [ObjectType; 5] = [
        ObjectType::Data,
        ObjectType::Index,
        ObjectType::Keys,
        ObjectType::Locks,
        ObjectType::Snapshots,
    ];

    /// Parses a URL segment into an object type.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "data" => Some(ObjectType::Data),
            "index" => Some(ObjectType::Index),
            "keys" => Some(ObjectType::Keys),
            "locks" => Some(ObjectType::Locks),
            "snapshots" => Some(ObjectType::Snapshots),
            _ => None,
        }
    }

    /// The directory name of this type.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Data => "data",
            ObjectType::Index => "index",
            ObjectType::Keys => "keys",
            ObjectType::Locks => "locks",
            ObjectType::Snapshots => "snapshots",
        }
    }

    /// Only data blobs are sharded into two-hex-digit subdirectories.
    pub fn is_hashed(self) -> bool {
        matches!(self, ObjectType::Data)
    }
}

/// Validates an object ID: 64 lowercase hex digits.
pub fn is_valid_object_id(id: &str) -> bool {
    id.len() == 64 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Per-repository behavior, assembled by the frontend for each request.
#[derive(Clone)]
pub struct RepoOptions {
    /// Refuse deletion of everything except lock files.
    pub append_only: bool,
    /// Refuse reads and listings of data blobs.
    pub write_only: bool,
    /// Skip SHA-256 verification of uploaded data blobs.
    pub no_verify_upload: bool,
    /// Unix mode bits for created directories.
    pub dir_mode: u32,
    /// Unix mode bits for created files.
    pub file_mode: u32,
    /// Shared quota accounting, present when a maximum size is configured.
    pub quota: Option<Arc<QuotaManager>>,
}

impl Default for RepoOptions {
    fn default() -> Self {
        Self {
            append_only: false,
            write_only: false,
            no_verify_upload: false,
            dir_mode: DEFAULT_DIR_MODE,
            file_mode: DEFAULT_FILE_MODE,
            quota: None,
        }
    }
}

/// One entry in a blob listing.
#[derive(Debug, Clone, Serialize)]
pub struct BlobInfo {
    /// Hex object ID.
    pub name: String,
    /// Size of the stored blob in bytes.
    pub size: i64,
}

/// The object store rooted at one repository directory.
pub struct Repo {
    root: PathBuf,
    opts: RepoOptions,
}

impl Repo {
    /// Creates a handle for the repository at `root`. The directory itself
    /// is only created by [`Repo::create`].
    pub fn new(root: PathBuf, opts: RepoOptions) -> Self {
        Self { root, opts }
    }

    /// The repository root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The options this handle was built with.
    pub fn options(&self) -> &RepoOptions {
        &self.opts
    }

    fn config_path(&self) -> PathBuf {
        self.root.join("config")
    }

    fn type_dir(&self, ty: ObjectType) -> PathBuf {
        self.root.join(ty.as_str())
    }

    /// The directory a blob of `ty`/`id` lives in.
    fn object_dir(&self, ty: ObjectType, id: &str) -> PathBuf {
        if ty.is_hashed() {
            self.type_dir(ty).join(&id[..2])
        } else {
            self.type_dir(ty)
        }
    }

    /// The full path of an object. `id` must be a valid object ID.
    pub fn object_path(&self, ty: ObjectType, id: &str) -> PathBuf {
        self.object_dir(ty, id).join(id)
    }

    fn check_read_allowed(&self, ty: ObjectType) -> Result<(), RepoError> {
        if self.opts.write_only && ty.is_hashed() {
            return Err(RepoError::Forbidden);
        }
        Ok(())
    }

    /// Creates the repository layout: the root, one directory per object
    /// type, and the 256 shard directories under `data/`. Existing
    /// directories are not an error, so concurrent creation is safe.
    pub async fn create(&self) -> Result<(), RepoError> {
        let root = self.root.clone();
        let dir_mode = self.opts.dir_mode;
        run_blocking(move || {
            mkdir_all(&root, dir_mode)?;
            for ty in ObjectType::ALL {
                mkdir(&root.join(ty.as_str()), dir_mode)?;
            }
            let data = root.join(ObjectType::Data.as_str());
            for i in 0..256 {
                mkdir(&data.join(format!("{:02x}", i)), dir_mode)?;
            }
            Ok(())
        })
        .await
    }

    /// Stats the config file, returning its path and size. Used for both
    /// HEAD (size only) and GET (path handed to the file server).
    pub async fn config_file(&self) -> Result<(PathBuf, u64), RepoError> {
        let path = self.config_path();
        let md = fs::metadata(&path)
            .await
            .map_err(|e| stat_err(&path, e))?;
        Ok((path, md.len()))
    }

    /// Begins an exclusive write of the config file. Fails with
    /// `AlreadyExists` if a config is present: configs, like objects, are
    /// never overwritten.
    pub async fn start_config_write(&self) -> Result<ConfigWrite, RepoError> {
        let path = self.config_path();
        let file = match open_excl(&path, self.opts.file_mode).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(RepoError::AlreadyExists(path));
            }
            Err(e) => return Err(RepoError::Io(e)),
        };
        Ok(ConfigWrite {
            file: Some(file),
            path,
        })
    }

    /// Deletes the config file, subject to the append-only policy.
    pub async fn delete_config(&self) -> Result<(), RepoError> {
        if self.opts.append_only {
            return Err(RepoError::Forbidden);
        }
        let path = self.config_path();
        fs::remove_file(&path)
            .await
            .map_err(|e| stat_err(&path, e))
    }

    /// Stats a blob, returning its path and size. Refused for data blobs
    /// in write-only mode; HEAD counts as a read.
    pub async fn blob_file(&self, ty: ObjectType, id: &str) -> Result<(PathBuf, u64), RepoError> {
        self.check_read_allowed(ty)?;
        if !is_valid_object_id(id) {
            return Err(RepoError::InvalidPath(id.to_string()));
        }
        let path = self.object_path(ty, id);
        let md = fs::metadata(&path)
            .await
            .map_err(|e| stat_err(&path, e))?;
        Ok((path, md.len()))
    }

    /// Lists all blobs of one type in arbitrary order, recursing one level
    /// into the shard directories for data blobs.
    pub async fn list_blobs(&self, ty: ObjectType) -> Result<Vec<BlobInfo>, RepoError> {
        self.check_read_allowed(ty)?;
        let dir = self.type_dir(ty);
        let mut entries = fs::read_dir(&dir).await.map_err(|e| stat_err(&dir, e))?;

        let mut blobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if ty.is_hashed() {
                let sub = entry.path();
                let mut subentries =
                    fs::read_dir(&sub).await.map_err(|e| stat_err(&sub, e))?;
                while let Some(f) = subentries.next_entry().await? {
                    let md = f.metadata().await?;
                    blobs.push(BlobInfo {
                        name: f.file_name().to_string_lossy().into_owned(),
                        size: md.len() as i64,
                    });
                }
            } else {
                let md = entry.metadata().await?;
                blobs.push(BlobInfo {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: md.len() as i64,
                });
            }
        }
        Ok(blobs)
    }

    /// Begins saving a blob.
    ///
    /// Fails with `AlreadyExists` if the object is already present, and
    /// creates the target directory on demand so a missing repository
    /// layout does not break uploads of non-sharded types.
    pub async fn start_blob_write(
        &self,
        ty: ObjectType,
        id: &str,
    ) -> Result<BlobWrite, RepoError> {
        if !is_valid_object_id(id) {
            return Err(RepoError::InvalidPath(id.to_string()));
        }
        let dir = self.object_dir(ty, id);
        let target = dir.join(id);

        match fs::metadata(&target).await {
            Ok(_) => return Err(RepoError::AlreadyExists(target)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(RepoError::Io(e)),
        }

        let (file, temp_path) = match open_temp(&dir, id, self.opts.file_mode).await {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // the target directory is missing, create it and retry
                let dir_clone = dir.clone();
                let dir_mode = self.opts.dir_mode;
                run_blocking(move || mkdir_all(&dir_clone, dir_mode)).await?;
                open_temp(&dir, id, self.opts.file_mode)
                    .await
                    .map_err(RepoError::from_write_io)?
            }
            Err(e) => return Err(RepoError::from_write_io(e)),
        };

        let verify = !self.opts.no_verify_upload && ty.is_hashed();
        Ok(BlobWrite {
            file: Some(file),
            temp_path,
            target_path: target,
            written: 0,
            hasher: verify.then(|| Sha256::new()),
            expected_id: verify.then(|| id.to_string()),
            quota: self.opts.quota.clone(),
        })
    }

    /// Deletes a blob. In append-only mode only lock files may go.
    ///
    /// `need_size` asks for the blob to be stat'ed first so the caller can
    /// report the freed bytes; it is implied when quota is active. Returns
    /// the size that was freed (0 when unknown).
    pub async fn delete_blob(
        &self,
        ty: ObjectType,
        id: &str,
        need_size: bool,
    ) -> Result<i64, RepoError> {
        if self.opts.append_only && ty != ObjectType::Locks {
            return Err(RepoError::Forbidden);
        }
        if !is_valid_object_id(id) {
            return Err(RepoError::InvalidPath(id.to_string()));
        }
        let path = self.object_path(ty, id);

        let mut size = 0i64;
        if need_size || self.opts.quota.is_some() {
            if let Ok(md) = fs::metadata(&path).await {
                size = md.len() as i64;
            }
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| stat_err(&path, e))?;

        if let Some(quota) = &self.opts.quota {
            quota.add_usage(-size);
        }
        Ok(size)
    }
}

/// An in-progress exclusive write of the repository config.
///
/// The config is written straight to its final path, so every failure path
/// must remove the partial file; dropping an unfinished write (a client
/// that disconnected mid-upload) cleans up the same way.
pub struct ConfigWrite {
    file: Option<File>,
    path: PathBuf,
}

impl ConfigWrite {
    /// Appends one chunk of the request body.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), RepoError> {
        match self.file.as_mut() {
            Some(file) => file
                .write_all(chunk)
                .await
                .map_err(RepoError::from_write_io),
            None => Err(RepoError::Io(finished_err())),
        }
    }

    /// Flushes the config to stable storage.
    pub async fn commit(mut self) -> Result<(), RepoError> {
        let file = match self.file.take() {
            Some(f) => f,
            None => return Err(RepoError::Io(finished_err())),
        };
        if let Err(e) = file.sync_all().await {
            let _ = fs::remove_file(&self.path).await;
            return Err(RepoError::from_write_io(e));
        }
        Ok(())
    }

    /// Removes the partial config after a failed write.
    pub async fn abort(mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
            let _ = fs::remove_file(&self.path).await;
        }
    }
}

impl Drop for ConfigWrite {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// An in-progress exclusive write of a blob.
///
/// Every byte accepted by [`BlobWrite::write_chunk`] is immediately added
/// to the quota counter; [`BlobWrite::abort`] and the failure paths of
/// [`BlobWrite::commit`] subtract exactly those bytes again, so the
/// counter never drifts across aborted uploads. Dropping an unfinished
/// write (a client that disconnected mid-upload) rolls back the same way.
pub struct BlobWrite {
    file: Option<File>,
    temp_path: PathBuf,
    target_path: PathBuf,
    written: i64,
    hasher: Option<Sha256>,
    expected_id: Option<String>,
    quota: Option<Arc<QuotaManager>>,
}

impl BlobWrite {
    /// Appends one chunk of the request body, gated by the quota.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), RepoError> {
        if let Some(quota) = &self.quota {
            quota.check_chunk(chunk.len())?;
        }
        match self.file.as_mut() {
            Some(file) => file
                .write_all(chunk)
                .await
                .map_err(RepoError::from_write_io)?,
            None => return Err(RepoError::Io(finished_err())),
        }
        self.written += chunk.len() as i64;
        if let Some(quota) = &self.quota {
            quota.add_usage(chunk.len() as i64);
        }
        if let Some(hasher) = &mut self.hasher {
            hasher.update(chunk);
        }
        Ok(())
    }

    /// Bytes accepted so far.
    pub fn written(&self) -> i64 {
        self.written
    }

    /// Verifies, syncs and publishes the blob, returning the byte count.
    pub async fn commit(mut self) -> Result<i64, RepoError> {
        if let (Some(hasher), Some(expected)) = (self.hasher.take(), self.expected_id.take()) {
            let digest = hex::encode(hasher.finalize());
            if digest != expected {
                self.rollback().await;
                return Err(RepoError::BadBody(
                    "file content does not match hash".to_string(),
                ));
            }
        }

        let file = match self.file.take() {
            Some(f) => f,
            None => return Err(RepoError::Io(finished_err())),
        };
        if let Err(e) = file.sync_all().await {
            drop(file);
            self.rollback().await;
            return Err(RepoError::from_write_io(e));
        }
        drop(file);

        // Link rather than rename: rename would silently replace a blob a
        // concurrent writer just committed, while link fails with EEXIST
        // and lets this writer roll itself back.
        if let Err(e) = fs::hard_link(&self.temp_path, &self.target_path).await {
            self.rollback().await;
            if e.kind() == io::ErrorKind::AlreadyExists {
                return Err(RepoError::AlreadyExists(self.target_path.clone()));
            }
            return Err(RepoError::from_write_io(e));
        }
        let _ = fs::remove_file(&self.temp_path).await;

        // A failed directory sync must not delete the published blob; a
        // retrying client may already rely on it being visible.
        if let Some(parent) = self.target_path.parent() {
            sync_dir(parent).await?;
        }
        Ok(self.written)
    }

    /// Rolls back a failed write: removes the temp file and returns the
    /// written bytes to the quota. Never touches the target path.
    pub async fn abort(mut self) {
        self.rollback().await;
    }

    async fn rollback(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
        }
        let _ = fs::remove_file(&self.temp_path).await;
        if let Some(quota) = &self.quota {
            quota.add_usage(-self.written);
        }
        self.written = 0;
    }
}

impl Drop for BlobWrite {
    fn drop(&mut self) {
        // only reached when neither commit nor abort ran to completion
        if let Some(file) = self.file.take() {
            drop(file);
            let _ = std::fs::remove_file(&self.temp_path);
            if let Some(quota) = &self.quota {
                quota.add_usage(-self.written);
            }
        }
    }
}

fn finished_err() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "write already finished")
}

/// Opens a uniquely named temp file next to the target, retrying on name
/// collisions.
async fn open_temp(dir: &Path, id: &str, mode: u32) -> io::Result<(File, PathBuf)> {
    for _ in 0..10 {
        let name = format!(
            "{}{}{}",
            id,
            TEMP_SUFFIX,
            rand::thread_rng().gen::<u64>()
        );
        let path = dir.join(name);
        match open_excl(&path, mode).await {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "could not create a unique temp file",
    ))
}

/// Opens a file for writing with O_CREAT|O_EXCL and the given mode.
async fn open_excl(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path).await
}

/// Syncs a directory so a just-linked entry survives a crash. Not possible
/// on Windows, where this is a no-op.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), RepoError> {
    let handle = File::open(dir).await?;
    handle.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<(), RepoError> {
    Ok(())
}

/// Creates one directory with the given mode, tolerating existence.
fn mkdir(path: &Path, mode: u32) -> Result<(), RepoError> {
    let mut builder = std::fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    match builder.create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(RepoError::Io(e)),
    }
}

/// Creates a directory and any missing parents with the given mode.
fn mkdir_all(path: &Path, mode: u32) -> Result<(), RepoError> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path).map_err(RepoError::Io)
}

/// Maps ENOENT from a stat-like call onto `NotFound` for the given path.
fn stat_err(path: &Path, err: io::Error) -> RepoError {
    if err.kind() == io::ErrorKind::NotFound {
        RepoError::NotFound(path.to_path_buf())
    } else {
        RepoError::Io(err)
    }
}

/// Runs a blocking filesystem operation off the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T, RepoError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RepoError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(join_err) => Err(RepoError::Io(io::Error::new(
            io::ErrorKind::Other,
            join_err,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_validation() {
        let id = "a".repeat(64);
        assert!(is_valid_object_id(&id));
        assert!(!is_valid_object_id(&"A".repeat(64)));
        assert!(!is_valid_object_id(&"a".repeat(63)));
        assert!(!is_valid_object_id(&"g".repeat(64)));
        assert!(!is_valid_object_id(""));
    }

    #[test]
    fn data_blobs_are_sharded() {
        let id = format!("ab{}", "0".repeat(62));
        let repo = Repo::new(PathBuf::from("/repo"), RepoOptions::default());
        assert_eq!(
            repo.object_path(ObjectType::Data, &id),
            PathBuf::from(format!("/repo/data/ab/{}", id))
        );
        assert_eq!(
            repo.object_path(ObjectType::Keys, &id),
            PathBuf::from(format!("/repo/keys/{}", id))
        );
    }

    #[test]
    fn object_type_names_round_trip() {
        for ty in ObjectType::ALL {
            assert_eq!(ObjectType::from_name(ty.as_str()), Some(ty));
        }
        assert_eq!(ObjectType::from_name("config"), None);
        assert_eq!(ObjectType::from_name("tmp"), None);
    }
}
