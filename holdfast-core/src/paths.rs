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

//! Path validation and safe joining under a base directory.
//!
//! Repository paths are assembled from URL segments supplied by clients, so
//! every segment is sanitized against a virtual root before it touches the
//! filesystem. The result of [`join_paths`] is always the base directory
//! itself or a path strictly below it.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::error::RepoError;

/// Checks whether `name` may be used as part of a repository path.
///
/// Rejects NUL bytes and, on platforms whose separator is not `/`, the
/// native separator character.
pub fn is_valid_name(name: &str) -> bool {
    if name.contains('\0') {
        return false;
    }
    if MAIN_SEPARATOR != '/' && name.contains(MAIN_SEPARATOR) {
        return false;
    }
    true
}

/// Joins `names` under `base` after sanitizing each one.
///
/// Every name is treated as a URL-style path rooted at `/`: `.` segments
/// disappear, `..` segments resolve against that virtual root and can never
/// climb above it, and duplicate slashes collapse. The cleaned components
/// are then appended below `base`.
pub fn join_paths<S: AsRef<str>>(base: &Path, names: &[S]) -> Result<PathBuf, RepoError> {
    let mut joined = base.to_path_buf();
    for name in names {
        let name = name.as_ref();
        if !is_valid_name(name) {
            return Err(RepoError::InvalidPath(name.to_string()));
        }
        for part in clean_rooted(name) {
            joined.push(part);
        }
    }
    // Unreachable by construction; kept as the contract of this function.
    if !joined.starts_with(base) {
        return Err(RepoError::InvalidPath(joined.to_string_lossy().into_owned()));
    }
    Ok(joined)
}

/// Lexically cleans a URL-style path against a virtual root, returning the
/// components that survive.
fn clean_rooted(name: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = Vec::new();
    for seg in name.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nul_bytes() {
        assert!(!is_valid_name("foo\0bar"));
        assert!(is_valid_name("foo bar"));
        assert!(is_valid_name("repo1"));
    }

    #[test]
    fn join_resolves_parent_segments_per_name() {
        let base = Path::new("/srv/server");
        let got = join_paths(base, &["foo", "..", "bar"]).unwrap();
        assert_eq!(got, PathBuf::from("/srv/server/foo/bar"));
    }

    #[test]
    fn join_cannot_escape_base() {
        let base = Path::new("/srv/server");
        let got = join_paths(
            base,
            &["repo", "data", "..", "data", "..", "..", ".."],
        )
        .unwrap();
        assert_eq!(got, PathBuf::from("/srv/server/repo/data/data"));

        for names in [
            vec![".."],
            vec!["../.."],
            vec!["../../etc/passwd"],
            vec!["a/../../.."],
        ] {
            let joined = join_paths(base, &names).unwrap();
            assert!(joined.starts_with(base), "escaped: {:?}", joined);
        }
    }

    #[test]
    fn join_collapses_redundant_separators() {
        let base = Path::new("/srv/server");
        let got = join_paths(base, &["a//b", "./c"]).unwrap();
        assert_eq!(got, PathBuf::from("/srv/server/a/b/c"));
    }

    #[test]
    fn join_refuses_invalid_names() {
        let base = Path::new("/srv/server");
        assert!(matches!(
            join_paths(base, &["foo\0"]),
            Err(RepoError::InvalidPath(_))
        ));
    }
}
