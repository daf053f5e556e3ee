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

//! Mapping of storage errors onto HTTP responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use holdfast_core::RepoError;

/// Maps a [`RepoError`] to its HTTP status code.
///
/// Both quota exhaustion and a full filesystem answer 507: from the
/// client's point of view the repository cannot take more data either way.
pub fn status_for(err: &RepoError) -> StatusCode {
    match err {
        RepoError::InvalidPath(_) => StatusCode::NOT_FOUND,
        RepoError::NotFound(_) => StatusCode::NOT_FOUND,
        RepoError::AlreadyExists(_) => StatusCode::FORBIDDEN,
        RepoError::Forbidden => StatusCode::FORBIDDEN,
        RepoError::BadBody(_) => StatusCode::BAD_REQUEST,
        RepoError::QuotaExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
        RepoError::DiskFull => StatusCode::INSUFFICIENT_STORAGE,
        RepoError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Builds the client-facing response for a storage error.
///
/// Clients only ever see the default status text; details are logged.
/// With `panic_on_error` set, internal errors abort the process instead of
/// turning into a 500, so tests catch them as failures.
pub fn error_response(err: RepoError, panic_on_error: bool) -> Response {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("internal server error: {}", err);
        if panic_on_error {
            panic!("internal server error: {}", err);
        }
    } else {
        tracing::debug!("request failed: {}", err);
    }
    status_response(status)
}

/// A response carrying only a status code and its default description.
pub fn status_response(status: StatusCode) -> Response {
    let text = status.canonical_reason().unwrap_or("");
    (status, text).into_response()
}

/// A 405 carrying the `Allow` header required alongside it.
pub fn method_not_allowed(allowed: &[&str]) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, allowed.join(", "))],
        StatusCode::METHOD_NOT_ALLOWED
            .canonical_reason()
            .unwrap_or(""),
    )
        .into_response()
}
