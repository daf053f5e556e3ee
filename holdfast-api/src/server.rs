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

//! The frontend: request admission and per-repository dispatch.
//!
//! Every repository request runs the same pipeline: authenticate, split
//! the URL into folder path and remainder, enforce private-repository
//! ownership, join the folder path under the data root, and hand the
//! remainder to a per-request [`RepoHandler`]. The only fixed route is
//! `/metrics`; everything else is the fallback.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use holdfast_core::paths::join_paths;
use holdfast_core::repo::{
    Repo, RepoOptions, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, GROUP_DIR_MODE, GROUP_FILE_MODE,
};
use holdfast_core::QuotaManager;

use crate::auth::HtpasswdFile;
use crate::errors::{method_not_allowed, status_response};
use crate::handlers::RepoHandler;
use crate::metrics::{http_metrics_middleware, BlobMetrics};
use crate::routing::{
    folder_path_valid, parse_repo_route, split_url_path, RepoRoute, MAX_REPO_DEPTH,
};

/// Shared server state, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Root directory all repositories live under.
    pub data_root: PathBuf,
    /// Disables authentication entirely.
    pub no_auth: bool,
    /// Credential store; required unless `no_auth` or proxy auth is used.
    pub htpasswd: Option<Arc<HtpasswdFile>>,
    /// Name of a header carrying the username authenticated by a front
    /// proxy. When set, passwords are not checked here.
    pub proxy_auth_header: Option<String>,
    /// Quota accounting, present when a maximum size is configured.
    pub quota: Option<Arc<QuotaManager>>,
    /// Refuse deletes of everything except lock files.
    pub append_only: bool,
    /// Refuse reads of data blobs.
    pub write_only: bool,
    /// Users may only access the repository named after them.
    pub private_repos: bool,
    /// Skip SHA-256 verification of uploaded data blobs.
    pub no_verify_upload: bool,
    /// Create repositories with group-accessible modes (0770/0660).
    pub group_accessible_repos: bool,
    /// Abort the process on internal errors instead of answering 500.
    pub panic_on_error: bool,
    /// Record and expose Prometheus metrics.
    pub prometheus: bool,
    /// Skip authentication for the `/metrics` endpoint.
    pub prometheus_no_auth: bool,
    /// Renderer for `/metrics`, set when the recorder is installed.
    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// State with all policies off, rooted at `data_root`.
    pub fn new(data_root: PathBuf) -> Self {
        Self {
            data_root,
            no_auth: false,
            htpasswd: None,
            proxy_auth_header: None,
            quota: None,
            append_only: false,
            write_only: false,
            private_repos: false,
            no_verify_upload: false,
            group_accessible_repos: false,
            panic_on_error: false,
            prometheus: false,
            prometheus_no_auth: false,
            prometheus_handle: None,
        }
    }
}

/// Builds the router: the optional `/metrics` route plus the repository
/// fallback, wrapped in tracing and request metrics.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new();
    if state.prometheus {
        router = router.route("/metrics", get(metrics_endpoint));
    }
    router
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
        .with_state(state)
}

/// The per-request pipeline described in the module docs.
async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let username = match check_auth(&state, req.headers()).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let url_path = req.uri().path().to_string();
    let (folder_path, remainder) = split_url_path(&url_path, MAX_REPO_DEPTH);
    if !folder_path_valid(&folder_path) {
        return status_response(StatusCode::NOT_FOUND);
    }

    if state.private_repos && (folder_path.is_empty() || folder_path[0] != username) {
        return status_response(StatusCode::UNAUTHORIZED);
    }

    let fs_path = match join_paths(&state.data_root, &folder_path) {
        Ok(p) => p,
        Err(_) => return status_response(StatusCode::NOT_FOUND),
    };

    let route = match parse_repo_route(remainder) {
        Some(r) => r,
        None => return status_response(StatusCode::NOT_FOUND),
    };

    let (dir_mode, file_mode) = if state.group_accessible_repos {
        (GROUP_DIR_MODE, GROUP_FILE_MODE)
    } else {
        (DEFAULT_DIR_MODE, DEFAULT_FILE_MODE)
    };
    let repo = Repo::new(
        fs_path,
        RepoOptions {
            append_only: state.append_only,
            write_only: state.write_only,
            no_verify_upload: state.no_verify_upload,
            dir_mode,
            file_mode,
            quota: state.quota.clone(),
        },
    );
    let metrics = BlobMetrics::new(state.prometheus, &folder_path);
    let handler = RepoHandler::new(repo, metrics, state.panic_on_error);

    route_request(&handler, route, req).await
}

/// Exhaustive (route, method) dispatch. Method mismatches answer 405 with
/// the `Allow` header for that route.
async fn route_request(handler: &RepoHandler, route: RepoRoute, req: Request) -> Response {
    let method = req.method().as_str().to_string();
    match route {
        RepoRoute::Repo => match method.as_str() {
            "POST" => {
                let create = has_create_flag(req.uri().query());
                handler.create_repo(create).await
            }
            _ => method_not_allowed(&["POST"]),
        },
        RepoRoute::Config => match method.as_str() {
            "HEAD" => handler.check_config().await,
            "GET" => handler.get_config(req).await,
            "POST" => handler.save_config(req.into_body()).await,
            "DELETE" => handler.delete_config().await,
            _ => method_not_allowed(&["HEAD", "GET", "POST", "DELETE"]),
        },
        RepoRoute::List(object_type) => match method.as_str() {
            "GET" => {
                let accept = req
                    .headers()
                    .get(header::ACCEPT)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                handler.list_blobs(object_type, accept.as_deref()).await
            }
            _ => method_not_allowed(&["GET"]),
        },
        RepoRoute::Blob(object_type, object_id) => match method.as_str() {
            "HEAD" => handler.check_blob(object_type, &object_id).await,
            "GET" => handler.get_blob(object_type, &object_id, req).await,
            "POST" => {
                let declared = content_length(&req);
                handler
                    .save_blob(object_type, &object_id, declared, req.into_body())
                    .await
            }
            "DELETE" => handler.delete_blob(object_type, &object_id).await,
            _ => method_not_allowed(&["HEAD", "GET", "POST", "DELETE"]),
        },
    }
}

/// `/metrics`, guarded by the same credentials as the repositories. With
/// private repositories only the user named `metrics` may scrape.
async fn metrics_endpoint(State(state): State<AppState>, req: Request) -> Response {
    if !state.prometheus_no_auth {
        let username = match check_auth(&state, req.headers()).await {
            Ok(u) => u,
            Err(resp) => return resp,
        };
        if state.private_repos && username != "metrics" {
            return status_response(StatusCode::UNAUTHORIZED);
        }
    }
    match &state.prometheus_handle {
        Some(handle) => handle.render().into_response(),
        None => status_response(StatusCode::NOT_FOUND),
    }
}

/// Authenticates the request, returning the username or the 401 to send.
async fn check_auth(state: &AppState, headers: &header::HeaderMap) -> Result<String, Response> {
    if state.no_auth {
        return Ok(String::new());
    }

    if let Some(header_name) = &state.proxy_auth_header {
        return match headers.get(header_name).and_then(|v| v.to_str().ok()) {
            Some(user) if !user.is_empty() => Ok(user.to_string()),
            _ => Err(status_response(StatusCode::UNAUTHORIZED)),
        };
    }

    let Some(store) = &state.htpasswd else {
        return Err(status_response(StatusCode::UNAUTHORIZED));
    };
    let Some((username, password)) = basic_auth_headers(headers) else {
        return Err(status_response(StatusCode::UNAUTHORIZED));
    };

    // bcrypt verification is CPU-bound and the reload check may hit the
    // disk, so keep both off the async workers.
    let store = store.clone();
    let user = username.clone();
    let valid = tokio::task::spawn_blocking(move || store.validate(&user, &password))
        .await
        .unwrap_or(false);

    if valid {
        Ok(username)
    } else {
        Err(status_response(StatusCode::UNAUTHORIZED))
    }
}

/// Extracts HTTP Basic credentials from the Authorization header.
fn basic_auth(req: &Request) -> Option<(String, String)> {
    basic_auth_headers(req.headers())
}

/// Extracts HTTP Basic credentials from a header map.
fn basic_auth_headers(headers: &header::HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// True if the query string carries `create=true`.
fn has_create_flag(query: Option<&str>) -> bool {
    query
        .map(|q| q.split('&').any(|kv| kv == "create=true"))
        .unwrap_or(false)
}

/// Parses the declared Content-Length, if any.
fn content_length(req: &Request) -> Option<i64> {
    req.headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_flag_parsing() {
        assert!(has_create_flag(Some("create=true")));
        assert!(has_create_flag(Some("x=1&create=true")));
        assert!(!has_create_flag(Some("create=false")));
        assert!(!has_create_flag(Some("create=")));
        assert!(!has_create_flag(None));
    }

    #[test]
    fn basic_auth_parsing() {
        let req = Request::builder()
            .header(header::AUTHORIZATION, "Basic YWxpY2U6c2VjcmV0")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(
            basic_auth(&req),
            Some(("alice".to_string(), "secret".to_string()))
        );

        let req = Request::builder()
            .header(header::AUTHORIZATION, "Bearer token")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(basic_auth(&req), None);

        let req = Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(basic_auth(&req), None);
    }
}
