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

//! URL path splitting and repository route parsing.
//!
//! An incoming path like `/a/b/data/<id>` is first split into the folder
//! path of the (possibly nested) repository and the remainder the object
//! store understands. The remainder is then matched strictly against the
//! small set of repository routes.

use holdfast_core::repo::{is_valid_object_id, ObjectType};
use holdfast_core::paths::is_valid_name;

/// Maximum number of folder components in a repository path.
pub const MAX_REPO_DEPTH: usize = 2;

/// Splits a URL path into the subrepository folder path and a remainder.
///
/// The walk over the interior segments stops at the first segment naming an
/// object type or the config file, and is bounded by `max_depth` folder
/// components. This function only splits; it does not validate the
/// components (see [`folder_path_valid`]).
///
/// `/foo/bar/locks/0123` at depth 2 becomes `["foo", "bar"]` and
/// `/locks/0123`.
pub fn split_url_path(url_path: &str, max_depth: usize) -> (Vec<&str>, &str) {
    if !url_path.starts_with('/') {
        return (Vec::new(), url_path);
    }

    let parts: Vec<&str> = url_path.splitn(max_depth + 2, '/').collect();
    // parts[0] is the empty segment before the leading slash and the last
    // part is the unsplit tail; only the interior can be folder components.
    let mut folder_path = Vec::new();
    for name in &parts[1..parts.len() - 1] {
        if ObjectType::from_name(name).is_some() || *name == "config" {
            break;
        }
        folder_path.push(*name);
    }

    if folder_path.is_empty() {
        return (folder_path, url_path);
    }

    let prefix_len =
        1 + folder_path.iter().map(|s| s.len()).sum::<usize>() + folder_path.len() - 1;
    (folder_path, &url_path[prefix_len..])
}

/// Checks the folder components produced by [`split_url_path`]: each must
/// be non-empty, not `.` or `..`, and free of invalid filename bytes.
pub fn folder_path_valid(folder_path: &[&str]) -> bool {
    folder_path
        .iter()
        .all(|name| !name.is_empty() && *name != "." && *name != ".." && is_valid_name(name))
}

/// The routes a repository handler serves, parsed from the remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoRoute {
    /// `/` — the repository itself (creation).
    Repo,
    /// `/config` — the repository config file.
    Config,
    /// `/<type>/` — a listing of one object type.
    List(ObjectType),
    /// `/<type>/<id>` — a single object.
    Blob(ObjectType, String),
}

/// Strictly matches a remainder against the repository routes. Anything
/// else, including malformed object IDs, is unroutable.
pub fn parse_repo_route(remainder: &str) -> Option<RepoRoute> {
    if remainder == "/" {
        return Some(RepoRoute::Repo);
    }
    if remainder == "/config" {
        return Some(RepoRoute::Config);
    }

    let rest = remainder.strip_prefix('/')?;
    let (type_name, object_id) = rest.split_once('/')?;
    let object_type = ObjectType::from_name(type_name)?;
    if object_id.is_empty() {
        return Some(RepoRoute::List(object_type));
    }
    if !is_valid_object_id(object_id) {
        return None;
    }
    Some(RepoRoute::Blob(object_type, object_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_examples() {
        // (url_path, max_depth, folder_path, remainder)
        let cases: &[(&str, usize, &[&str], &str)] = &[
            ("/", 0, &[], "/"),
            ("/", 2, &[], "/"),
            ("/foo/bar/locks/0123", 0, &[], "/foo/bar/locks/0123"),
            ("/foo/bar/locks/0123", 1, &["foo"], "/bar/locks/0123"),
            ("/foo/bar/locks/0123", 2, &["foo", "bar"], "/locks/0123"),
            ("/foo/bar/locks/0123", 3, &["foo", "bar"], "/locks/0123"),
            ("/foo/bar/zzz/locks/0123", 2, &["foo", "bar"], "/zzz/locks/0123"),
            ("/foo/bar/zzz/locks/0123", 3, &["foo", "bar", "zzz"], "/locks/0123"),
            ("/foo/bar/locks/", 2, &["foo", "bar"], "/locks/"),
            ("/foo/locks/", 2, &["foo"], "/locks/"),
            ("/foo/data/", 2, &["foo"], "/data/"),
            ("/foo/index/", 2, &["foo"], "/index/"),
            ("/foo/keys/", 2, &["foo"], "/keys/"),
            ("/foo/snapshots/", 2, &["foo"], "/snapshots/"),
            ("/foo/config", 2, &["foo"], "/config"),
            ("/foo/", 2, &["foo"], "/"),
            ("/foo/bar/", 2, &["foo", "bar"], "/"),
            ("/foo/bar", 2, &["foo"], "/bar"),
            ("/locks/", 2, &[], "/locks/"),
            // splitting does not validate components
            ("/././locks/", 2, &[".", "."], "/locks/"),
            ("/../../locks/", 2, &["..", ".."], "/locks/"),
            ("///locks/", 2, &["", ""], "/locks/"),
            ("////locks/", 2, &["", ""], "//locks/"),
            // robustness against broken input
            ("foo", 2, &[], "foo"),
            ("foo/bar", 2, &[], "foo/bar"),
            ("", 2, &[], ""),
        ];

        for (url_path, max_depth, want_folder, want_remainder) in cases {
            let (folder, remainder) = split_url_path(url_path, *max_depth);
            assert_eq!(&folder, want_folder, "folder path for {:?}", url_path);
            assert_eq!(&remainder, want_remainder, "remainder for {:?}", url_path);
        }
    }

    #[test]
    fn split_round_trips() {
        for url_path in [
            "/",
            "/config",
            "/foo/config",
            "/foo/bar/locks/0123",
            "/foo/bar/zzz/locks/0123",
            "/a/b/data/",
        ] {
            let (folder, remainder) = split_url_path(url_path, MAX_REPO_DEPTH);
            let rebuilt = if folder.is_empty() {
                remainder.to_string()
            } else {
                format!("/{}{}", folder.join("/"), remainder)
            };
            assert_eq!(rebuilt, *url_path);
        }
    }

    #[test]
    fn folder_path_validation() {
        assert!(folder_path_valid(&["foo", "bar"]));
        assert!(folder_path_valid(&[]));
        assert!(!folder_path_valid(&[""]));
        assert!(!folder_path_valid(&["."]));
        assert!(!folder_path_valid(&["foo", ".."]));
        assert!(!folder_path_valid(&["fo\0o"]));
    }

    #[test]
    fn route_parsing() {
        let id = "0123456789abcdef".repeat(4);

        assert_eq!(parse_repo_route("/"), Some(RepoRoute::Repo));
        assert_eq!(parse_repo_route("/config"), Some(RepoRoute::Config));
        assert_eq!(
            parse_repo_route("/data/"),
            Some(RepoRoute::List(ObjectType::Data))
        );
        assert_eq!(
            parse_repo_route(&format!("/locks/{}", id)),
            Some(RepoRoute::Blob(ObjectType::Locks, id.clone()))
        );

        // no route: bad type, bad id, missing slash, nested extras
        assert_eq!(parse_repo_route("/tmp/"), None);
        assert_eq!(parse_repo_route("/data"), None);
        assert_eq!(parse_repo_route("/data/0123"), None);
        assert_eq!(parse_repo_route(&format!("/data/{}", "X".repeat(64))), None);
        assert_eq!(parse_repo_route(&format!("/data/ab/{}", id)), None);
        assert_eq!(parse_repo_route(""), None);
        assert_eq!(parse_repo_route("config"), None);
    }
}
