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

//! htpasswd-backed credential store with throttled live reload.
//!
//! Entries use the classic htpasswd format, one `user:hash` per line, with
//! `{SHA}` (base64 SHA-1) or bcrypt (`$2a$`/`$2b$`/`$2y$`) hashes. The file
//! is re-checked for changes on demand during validation, at most once per
//! [`CHECK_INTERVAL`], so there is no background task to manage. A SIGHUP
//! handler in the server binary calls [`HtpasswdFile::reload`] to force it.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, Instant, SystemTime};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use sha1::{Digest, Sha1};
use tracing::warn;

/// How often the htpasswd file is re-checked for changes, at most.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[\p{L}\d@._-]+$").unwrap_or_else(|e| panic!("username regex: {}", e))
    })
}

struct State {
    users: HashMap<String, String>,
    mtime: Option<SystemTime>,
    size: u64,
    last_check: Instant,
}

/// A credential store backed by an htpasswd file on disk.
pub struct HtpasswdFile {
    path: PathBuf,
    state: RwLock<State>,
}

impl HtpasswdFile {
    /// Opens and parses the htpasswd file. Fails if the file is missing or
    /// malformed; a server must not start with a broken user database.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let meta = fs::metadata(&path)?;
        let users = parse(&fs::read_to_string(&path)?)?;
        Ok(Self {
            path,
            state: RwLock::new(State {
                users,
                mtime: meta.modified().ok(),
                size: meta.len(),
                last_check: Instant::now(),
            }),
        })
    }

    /// The file this store reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks `password` against the stored hash for `user`.
    ///
    /// Unknown users and unknown hash formats always fail. Performs the
    /// throttled change check first, so edits to the file become visible
    /// without a restart. bcrypt verification is CPU-heavy; callers in
    /// async context should run this on a blocking thread.
    pub fn validate(&self, user: &str, password: &str) -> bool {
        self.reload_check();

        let stored = {
            let state = match self.state.read() {
                Ok(s) => s,
                Err(_) => return false,
            };
            match state.users.get(user) {
                Some(hash) => hash.clone(),
                None => return false,
            }
        };

        if verify_password(&stored, password) {
            return true;
        }
        warn!(user, "htpasswd: password mismatch or unsupported hash");
        false
    }

    /// Unconditionally re-reads the file. On a parse error the previous
    /// user map stays in effect.
    pub fn reload(&self) -> io::Result<()> {
        let meta = fs::metadata(&self.path)?;
        let users = parse(&fs::read_to_string(&self.path)?)?;
        if let Ok(mut state) = self.state.write() {
            state.users = users;
            state.mtime = meta.modified().ok();
            state.size = meta.len();
        }
        Ok(())
    }

    /// Reloads the file if it changed, checking at most once per
    /// [`CHECK_INTERVAL`].
    fn reload_check(&self) {
        {
            let mut state = match self.state.write() {
                Ok(s) => s,
                Err(_) => return,
            };
            if state.last_check.elapsed() < CHECK_INTERVAL {
                return;
            }
            state.last_check = Instant::now();

            let meta = match fs::metadata(&self.path) {
                Ok(m) => m,
                Err(e) => {
                    warn!("htpasswd: cannot stat {}: {}", self.path.display(), e);
                    return;
                }
            };
            if meta.modified().ok() == state.mtime && meta.len() == state.size {
                return;
            }
        }
        match self.reload() {
            Ok(()) => tracing::info!("htpasswd: reloaded {}", self.path.display()),
            Err(e) => warn!("htpasswd: reload of {} failed: {}", self.path.display(), e),
        }
    }
}

/// Parses htpasswd contents into a user map.
///
/// `#` lines are comments, leading whitespace is ignored, and usernames
/// with characters outside letters, digits, `@`, `.`, `_` and `-` are
/// skipped with a warning.
fn parse(contents: &str) -> io::Result<HashMap<String, String>> {
    let mut users = HashMap::new();
    for line in contents.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (user, hash) = line.split_once(':').ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "htpasswd: malformed line")
        })?;
        if !username_regex().is_match(user) {
            warn!(user, "htpasswd: ignoring invalid username");
            continue;
        }
        users.insert(user.to_string(), hash.to_string());
    }
    Ok(users)
}

/// Dispatches on the hash prefix and verifies `password` against it.
fn verify_password(stored: &str, password: &str) -> bool {
    if let Some(encoded) = stored.strip_prefix("{SHA}") {
        let digest = Sha1::digest(password.as_bytes());
        return BASE64.encode(digest) == encoded;
    }
    if stored.starts_with("$2a$") || stored.starts_with("$2b$") || stored.starts_with("$2y$") {
        return bcrypt::verify(password, stored).unwrap_or(false);
    }
    false
}
