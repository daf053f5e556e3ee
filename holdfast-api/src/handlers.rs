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

//! HTTP handlers for a single repository.
//!
//! A [`RepoHandler`] is built per request by the frontend, wrapping the
//! repository store for the addressed folder path together with the metric
//! sink labeled for it. Handlers stream request bodies chunk by chunk so
//! that an aborted upload is noticed immediately, rolled back, and never
//! committed.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

use holdfast_core::repo::{ObjectType, Repo};
use holdfast_core::RepoError;

use crate::errors::error_response;
use crate::metrics::BlobMetrics;

/// Content type of a V1 listing: a JSON array of object names.
pub const MIME_V1: &str = "application/vnd.x.restic.rest.v1";

/// Content type of a V2 listing: a JSON array of `{name, size}` records.
pub const MIME_V2: &str = "application/vnd.x.restic.rest.v2";

/// Handles the repository-scoped requests for one addressed repository.
pub struct RepoHandler {
    repo: Repo,
    metrics: BlobMetrics,
    panic_on_error: bool,
}

impl RepoHandler {
    pub fn new(repo: Repo, metrics: BlobMetrics, panic_on_error: bool) -> Self {
        Self {
            repo,
            metrics,
            panic_on_error,
        }
    }

    fn err(&self, err: RepoError) -> Response {
        error_response(err, self.panic_on_error)
    }

    /// POST `/?create=true` — creates the repository directory layout.
    pub async fn create_repo(&self, create_flag: bool) -> Response {
        if !create_flag {
            return status(StatusCode::BAD_REQUEST);
        }
        debug!("creating repository directories in {:?}", self.repo.root());
        match self.repo.create().await {
            Ok(()) => status(StatusCode::OK),
            Err(e) => self.err(e),
        }
    }

    /// HEAD `/config` — reports the config size.
    pub async fn check_config(&self) -> Response {
        debug!("check_config");
        match self.repo.config_file().await {
            Ok((_, size)) => head_response(size),
            Err(e) => self.err(e),
        }
    }

    /// GET `/config` — streams the config file.
    pub async fn get_config(&self, req: Request) -> Response {
        debug!("get_config");
        let (path, _) = match self.repo.config_file().await {
            Ok(v) => v,
            Err(e) => return self.err(e),
        };
        serve_file(&path, req).await
    }

    /// POST `/config` — stores the config exclusively.
    pub async fn save_config(&self, body: Body) -> Response {
        debug!("save_config");
        let mut write = match self.repo.start_config_write().await {
            Ok(w) => w,
            Err(e) => return self.err(e),
        };

        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    write.abort().await;
                    return self.err(RepoError::BadBody(e.to_string()));
                }
            };
            if let Err(e) = write.write_chunk(&chunk).await {
                write.abort().await;
                return self.err(e);
            }
        }

        match write.commit().await {
            Ok(()) => status(StatusCode::OK),
            Err(e) => self.err(e),
        }
    }

    /// DELETE `/config` — removes the config, unless append-only.
    pub async fn delete_config(&self) -> Response {
        debug!("delete_config");
        match self.repo.delete_config().await {
            Ok(()) => status(StatusCode::OK),
            Err(e) => self.err(e),
        }
    }

    /// GET `/<type>/` — lists blobs; the Accept header picks V1 or V2.
    pub async fn list_blobs(&self, object_type: ObjectType, accept: Option<&str>) -> Response {
        debug!("list_blobs type={}", object_type.as_str());
        let blobs = match self.repo.list_blobs(object_type).await {
            Ok(b) => b,
            Err(e) => return self.err(e),
        };

        let (payload, mime) = if accept == Some(MIME_V2) {
            (serde_json::to_vec(&blobs), MIME_V2)
        } else {
            let names: Vec<&str> = blobs.iter().map(|b| b.name.as_str()).collect();
            (serde_json::to_vec(&names), MIME_V1)
        };

        match payload {
            Ok(data) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime)],
                data,
            )
                .into_response(),
            Err(e) => self.err(RepoError::Io(e.into())),
        }
    }

    /// HEAD `/<type>/<id>` — reports the blob size.
    pub async fn check_blob(&self, object_type: ObjectType, object_id: &str) -> Response {
        debug!("check_blob {}/{}", object_type.as_str(), object_id);
        match self.repo.blob_file(object_type, object_id).await {
            Ok((_, size)) => head_response(size),
            Err(e) => self.err(e),
        }
    }

    /// GET `/<type>/<id>` — serves the blob, honoring range requests.
    pub async fn get_blob(
        &self,
        object_type: ObjectType,
        object_id: &str,
        req: Request,
    ) -> Response {
        debug!("get_blob {}/{}", object_type.as_str(), object_id);
        let (path, size) = match self.repo.blob_file(object_type, object_id).await {
            Ok(v) => v,
            Err(e) => return self.err(e),
        };

        let response = serve_file(&path, req).await;
        if response.status().is_success() {
            let sent = response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(size);
            self.metrics.read(object_type, sent);
        }
        response
    }

    /// POST `/<type>/<id>` — stores a blob exclusively, verifying data
    /// blob contents against the ID unless verification is disabled.
    pub async fn save_blob(
        &self,
        object_type: ObjectType,
        object_id: &str,
        content_length: Option<i64>,
        body: Body,
    ) -> Response {
        debug!("save_blob {}/{}", object_type.as_str(), object_id);
        let mut write = match self.repo.start_blob_write(object_type, object_id).await {
            Ok(w) => w,
            Err(e) => return self.err(e),
        };

        // An honest client declaring an oversized upload is refused before
        // any bytes are streamed; dishonest ones hit the per-chunk gate.
        if let (Some(quota), Some(declared)) = (&self.repo.options().quota, content_length) {
            if let Err(e) = quota.check_declared_size(declared) {
                write.abort().await;
                return self.err(e);
            }
        }

        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    write.abort().await;
                    return self.err(RepoError::BadBody(e.to_string()));
                }
            };
            if let Err(e) = write.write_chunk(&chunk).await {
                write.abort().await;
                return self.err(e);
            }
        }

        match write.commit().await {
            Ok(written) => {
                self.metrics.write(object_type, written as u64);
                status(StatusCode::OK)
            }
            Err(e) => self.err(e),
        }
    }

    /// DELETE `/<type>/<id>` — removes a blob, subject to policy.
    pub async fn delete_blob(&self, object_type: ObjectType, object_id: &str) -> Response {
        debug!("delete_blob {}/{}", object_type.as_str(), object_id);
        let need_size = self.metrics.is_enabled();
        match self
            .repo
            .delete_blob(object_type, object_id, need_size)
            .await
        {
            Ok(size) => {
                self.metrics.delete(object_type, size as u64);
                status(StatusCode::OK)
            }
            Err(e) => self.err(e),
        }
    }
}

/// A bare status-code response with its default text.
fn status(code: StatusCode) -> Response {
    (code, code.canonical_reason().unwrap_or("")).into_response()
}

/// A HEAD response advertising the file size.
fn head_response(size: u64) -> Response {
    let mut response = StatusCode::OK.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    response
}

/// Serves a file through tower-http, which supplies range and conditional
/// request handling.
async fn serve_file(path: &std::path::Path, req: Request) -> Response {
    match ServeFile::new(path).oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            // ServeFile's error is infallible; this arm satisfies the type.
            error_response(RepoError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)), false)
        }
    }
}
