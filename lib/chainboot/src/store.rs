// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Control-plane store seams and the filesystem-backed implementation.
//!
//! The pipeline reads Assignment and Profile records (and arbitrary
//! referenced objects) through these traits on every request; nothing is
//! cached in process. [`FsStore`] serves them from a directory tree of
//! YAML records:
//!
//! ```text
//! <root>/assignments/<namespace>/<name>.yaml
//! <root>/profiles/<namespace>/<name>.yaml
//! <root>/objects/<group>/<version>/<resource>/<namespace>/<name>.yaml
//! ```

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::assignment::Assignment;
use crate::params::{Buildarch, IpxeSelectors};
use crate::profile::{ObjectKey, Profile};
use crate::records::{AssignmentRecord, ProfileRecord, RecordError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("assignment cannot be found")]
    AssignmentNotFound,

    #[error("profile cannot be found")]
    ProfileNotFound,

    #[error("object {0} cannot be found")]
    ObjectNotFound(String),

    #[error("reading record {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decoding record {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("converting record {path:?}")]
    Convert {
        path: PathBuf,
        #[source]
        source: RecordError,
    },
}

/// Lookup of Assignment records by boot selectors.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn find_by_selectors(
        &self,
        selectors: &IpxeSelectors,
    ) -> Result<Assignment, StoreError>;

    async fn find_default_by_buildarch(
        &self,
        buildarch: Buildarch,
    ) -> Result<Assignment, StoreError>;
}

/// Lookup of Profile records by name and reverse lookup by exposed
/// content id.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Profile, StoreError>;

    /// Profiles exposing the given content id. Uniqueness of exposed ids
    /// across profiles is enforced upstream, so this returns zero or one
    /// entries in practice.
    async fn list_by_content_id(
        &self,
        content_id: Uuid,
    ) -> Result<Vec<Profile>, StoreError>;
}

/// Retrieval of arbitrary referenced objects, used by the object-ref
/// resolver.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &ObjectKey)
        -> Result<serde_json::Value, StoreError>;
}

/// Read-through store over a directory tree of YAML records.
#[derive(Clone, Debug)]
pub struct FsStore {
    root: PathBuf,
    assignment_namespace: String,
    profile_namespace: String,
}

impl FsStore {
    pub fn new(
        root: impl Into<PathBuf>,
        assignment_namespace: impl Into<String>,
        profile_namespace: impl Into<String>,
    ) -> Self {
        FsStore {
            root: root.into(),
            assignment_namespace: assignment_namespace.into(),
            profile_namespace: profile_namespace.into(),
        }
    }

    async fn read_assignments(&self) -> Result<Vec<Assignment>, StoreError> {
        let dir =
            self.root.join("assignments").join(&self.assignment_namespace);
        let mut out = Vec::new();
        for path in list_records(&dir).await? {
            let record: AssignmentRecord = read_record(&path).await?;
            let assignment =
                record.into_assignment().map_err(|source| {
                    StoreError::Convert { path: path.clone(), source }
                })?;
            out.push(assignment);
        }
        Ok(out)
    }

    async fn read_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let dir = self.root.join("profiles").join(&self.profile_namespace);
        let mut out = Vec::new();
        for path in list_records(&dir).await? {
            let record: ProfileRecord = read_record(&path).await?;
            let profile = record.into_profile().map_err(|source| {
                StoreError::Convert { path: path.clone(), source }
            })?;
            out.push(profile);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl AssignmentStore for FsStore {
    async fn find_by_selectors(
        &self,
        selectors: &IpxeSelectors,
    ) -> Result<Assignment, StoreError> {
        self.read_assignments()
            .await?
            .into_iter()
            .find(|a| a.matches(selectors))
            .ok_or(StoreError::AssignmentNotFound)
    }

    async fn find_default_by_buildarch(
        &self,
        buildarch: Buildarch,
    ) -> Result<Assignment, StoreError> {
        self.read_assignments()
            .await?
            .into_iter()
            .find(|a| a.matches_default(buildarch))
            .ok_or(StoreError::AssignmentNotFound)
    }
}

#[async_trait::async_trait]
impl ProfileStore for FsStore {
    async fn get(&self, name: &str) -> Result<Profile, StoreError> {
        let name = record_name(name).ok_or(StoreError::ProfileNotFound)?;
        let path = self
            .root
            .join("profiles")
            .join(&self.profile_namespace)
            .join(format!("{name}.yaml"));
        let bytes = read_bytes(&path)
            .await?
            .ok_or(StoreError::ProfileNotFound)?;
        let record: ProfileRecord = decode_record(&path, &bytes)?;
        record
            .into_profile()
            .map_err(|source| StoreError::Convert { path, source })
    }

    async fn list_by_content_id(
        &self,
        content_id: Uuid,
    ) -> Result<Vec<Profile>, StoreError> {
        Ok(self
            .read_profiles()
            .await?
            .into_iter()
            .filter(|p| p.content_id_to_name.contains_key(&content_id))
            .collect())
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsStore {
    async fn get(
        &self,
        key: &ObjectKey,
    ) -> Result<serde_json::Value, StoreError> {
        let mut path = self.root.join("objects");
        for part in
            [&key.group, &key.version, &key.resource, &key.namespace]
        {
            let part = record_name(part)
                .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))?;
            path.push(part);
        }
        let name = record_name(&key.name)
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))?;
        path.push(format!("{name}.yaml"));

        let bytes = read_bytes(&path)
            .await?
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))?;
        decode_record(&path, &bytes)
    }
}

/// Reject names that would escape the record tree.
fn record_name(name: &str) -> Option<&str> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
    {
        None
    } else {
        Some(name)
    }
}

async fn list_records(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        // A missing namespace directory simply holds no records.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Vec::new())
        }
        Err(source) => {
            return Err(StoreError::Io { path: dir.to_path_buf(), source })
        }
    };

    let mut out = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "yaml" || e == "yml")
                {
                    out.push(path);
                }
            }
            Ok(None) => break,
            Err(source) => {
                return Err(StoreError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        }
    }
    // Directory iteration order is filesystem-dependent; sort for a stable
    // first-match rule.
    out.sort();
    Ok(out)
}

async fn read_record<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<T, StoreError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| {
        StoreError::Io { path: path.to_path_buf(), source }
    })?;
    decode_record(path, &bytes)
}

/// Read a record file, mapping a missing file to `None`.
async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => {
            Err(StoreError::Io { path: path.to_path_buf(), source })
        }
    }
}

fn decode_record<T: serde::de::DeserializeOwned>(
    path: &Path,
    bytes: &[u8],
) -> Result<T, StoreError> {
    serde_yaml::from_slice(bytes).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
