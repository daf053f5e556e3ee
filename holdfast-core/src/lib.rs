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

//! Holdfast storage engine.
//!
//! This crate implements the filesystem side of the backup repository
//! protocol: safe path assembly under the data root, quota accounting for
//! the whole tree, and the per-repository object store with its exclusive
//! create, verify, and delete semantics. The HTTP layer lives in
//! `holdfast-api`.

pub mod error;
pub mod paths;
pub mod quota;
pub mod repo;

pub use error::RepoError;
pub use paths::{is_valid_name, join_paths};
pub use quota::QuotaManager;
pub use repo::{
    is_valid_object_id, BlobInfo, BlobWrite, ConfigWrite, ObjectType, Repo, RepoOptions,
};
