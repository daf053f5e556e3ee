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

//! Holdfast HTTP layer.
//!
//! This crate turns the storage engine of `holdfast-core` into the backup
//! repository REST protocol: URL splitting for nested repositories,
//! htpasswd authentication with live reload, strict per-route method
//! dispatch, V1/V2 listings, and Prometheus metrics.

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod routing;
pub mod server;

pub use auth::HtpasswdFile;
pub use handlers::{MIME_V1, MIME_V2};
pub use routing::{split_url_path, RepoRoute, MAX_REPO_DEPTH};
pub use server::{create_router, AppState};
