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

//! Prometheus metrics: request middleware and per-blob counters.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

use holdfast_core::repo::ObjectType;

use crate::routing::{split_url_path, MAX_REPO_DEPTH};

/// Middleware recording request count and latency via the `metrics` crate.
///
/// - `http_requests_total` (counter), labeled by method and status.
/// - `http_request_duration_seconds` (histogram), labeled by method.
///
/// Paths are normalized to route shapes so repository names and object IDs
/// do not blow up label cardinality.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let raw_path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();
    let path = normalize_path(&raw_path);

    metrics::counter!(
        "http_requests_total",
        "method" => method.clone(),
        "status" => status,
        "path" => path.clone()
    )
    .increment(1);
    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(duration);

    response
}

/// Normalizes request paths to their route shape.
///
/// - `/` and `/metrics` stay as-is
/// - `/repo/sub/data/<id>` → `/{repo}/data/{id}`
/// - `/repo/config` → `/{repo}/config`
fn normalize_path(path: &str) -> String {
    if path == "/" || path == "/metrics" {
        return path.to_string();
    }

    let (folder_path, remainder) = split_url_path(path, MAX_REPO_DEPTH);
    let repo = if folder_path.is_empty() { "" } else { "/{repo}" };

    let rest = remainder.strip_prefix('/').unwrap_or(remainder);
    let shaped = match rest.split_once('/') {
        None if rest.is_empty() => "/".to_string(),
        None => format!("/{}", rest),
        Some((ty, "")) => format!("/{}/", ty),
        Some((ty, _)) => format!("/{}/{{id}}", ty),
    };
    format!("{}{}", repo, shaped)
}

/// Emits the blob counters for one repository, labeled by repository path
/// and object type. A disabled sink is inert so handlers can call it
/// unconditionally.
#[derive(Clone)]
pub struct BlobMetrics {
    enabled: bool,
    repo: String,
}

impl BlobMetrics {
    /// A sink for the repository identified by `folder_path`.
    pub fn new(enabled: bool, folder_path: &[&str]) -> Self {
        Self {
            enabled,
            repo: folder_path.join("/"),
        }
    }

    /// A sink that records nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            repo: String::new(),
        }
    }

    /// Whether this sink records anything. Deletes only stat the victim
    /// file for its size when somebody will see the number.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn read(&self, object_type: ObjectType, bytes: u64) {
        self.record("read", object_type, bytes);
    }

    pub fn write(&self, object_type: ObjectType, bytes: u64) {
        self.record("write", object_type, bytes);
    }

    pub fn delete(&self, object_type: ObjectType, bytes: u64) {
        self.record("delete", object_type, bytes);
    }

    fn record(&self, op: &'static str, object_type: ObjectType, bytes: u64) {
        if !self.enabled {
            return;
        }
        let ty = object_type.as_str();
        metrics::counter!(
            format!("holdfast_blob_{}_total", op),
            "repo" => self.repo.clone(),
            "type" => ty
        )
        .increment(1);
        metrics::counter!(
            format!("holdfast_blob_{}_bytes_total", op),
            "repo" => self.repo.clone(),
            "type" => ty
        )
        .increment(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_shapes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/metrics"), "/metrics");
        assert_eq!(normalize_path("/config"), "/config");
        assert_eq!(normalize_path("/repo1/config"), "/{repo}/config");
        assert_eq!(normalize_path("/data/"), "/data/");
        assert_eq!(
            normalize_path(&format!("/a/b/data/{}", "0".repeat(64))),
            "/{repo}/data/{id}"
        );
        assert_eq!(normalize_path("/a/locks/"), "/{repo}/locks/");
        assert_eq!(normalize_path("/a/b/"), "/{repo}/");
    }
}
