// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Declarative control-plane record schema and conversion into the
//! in-memory model.
//!
//! Records are YAML documents authored by operators (or by tooling on
//! their behalf). Conversion compiles every JSONPath expression and
//! enforces the per-record invariants, so malformed configuration fails at
//! profile ingestion rather than in the middle of a boot request.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json_path::JsonPath;
use uuid::Uuid;

use crate::assignment::{Assignment, SubjectSelectors};
use crate::params::Buildarch;
use crate::profile::{
    BasicAuthObjectRef, Content, ContentSource, MtlsObjectRef, ObjectKey,
    ObjectRef, Profile, TransformerConfig, WebhookConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("parsing JSONPath {path:?} on content {content:?}")]
    JsonPath {
        content: String,
        path: String,
        #[source]
        source: serde_json_path::ParseError,
    },

    #[error(
        "content {0:?} must specify exactly one of inline, objectRef or \
         webhook"
    )]
    AmbiguousSource(String),

    #[error(
        "exposed content {0:?} has no id in status.exposedAdditionalContent"
    )]
    MissingExposedId(String),

    #[error("duplicate content name {0:?}")]
    DuplicateContentName(String),

    #[error("duplicate exposed content id {0}")]
    DuplicateExposedId(Uuid),

    #[error("webhook transformer on content {0:?} has no webhook config")]
    MissingTransformerWebhook(String),

    #[error("default assignment {0:?} must not select subject UUIDs")]
    DefaultWithUuids(String),
}

// --- Assignment records ---

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignmentRecord {
    pub name: String,
    pub spec: AssignmentSpec,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignmentSpec {
    pub profile_name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub subject_selectors: SubjectSelectorsSpec,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubjectSelectorsSpec {
    #[serde(default)]
    pub uuid_list: Vec<Uuid>,
    #[serde(default)]
    pub buildarch_list: Vec<Buildarch>,
}

impl AssignmentRecord {
    pub fn into_assignment(self) -> Result<Assignment, RecordError> {
        if self.spec.is_default && !self.spec.subject_selectors.uuid_list.is_empty()
        {
            return Err(RecordError::DefaultWithUuids(self.name));
        }
        Ok(Assignment {
            name: self.name,
            profile_name: self.spec.profile_name,
            subject_selectors: SubjectSelectors {
                uuids: self.spec.subject_selectors.uuid_list,
                buildarchs: self.spec.subject_selectors.buildarch_list,
            },
            is_default: self.spec.is_default,
        })
    }
}

// --- Profile records ---

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileRecord {
    pub name: String,
    pub spec: ProfileSpec,
    #[serde(default)]
    pub status: ProfileStatus,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileSpec {
    pub ipxe_template: String,
    #[serde(default)]
    pub additional_content: Vec<ContentRecord>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileStatus {
    /// Content name → exposed content id, assigned by the control plane
    /// when an exposed content entry is admitted.
    #[serde(default)]
    pub exposed_additional_content: HashMap<String, Uuid>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContentRecord {
    pub name: String,
    #[serde(default)]
    pub exposed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_ref: Option<ObjectRefRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookRecord>,
    #[serde(default)]
    pub post_transformers: Vec<TransformerRecord>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectKeyRecord {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub namespace: String,
    pub name: String,
}

impl From<ObjectKeyRecord> for ObjectKey {
    fn from(r: ObjectKeyRecord) -> ObjectKey {
        ObjectKey {
            group: r.group,
            version: r.version,
            resource: r.resource,
            namespace: r.namespace,
            name: r.name,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRefRecord {
    #[serde(flatten)]
    pub key: ObjectKeyRecord,
    pub json_path: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WebhookRecord {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtls_object_ref: Option<MtlsObjectRefRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth_object_ref: Option<BasicAuthObjectRefRecord>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MtlsObjectRefRecord {
    #[serde(flatten)]
    pub key: ObjectKeyRecord,
    pub client_key_path: String,
    pub client_cert_path: String,
    pub ca_bundle_path: String,
    #[serde(default)]
    pub tls_insecure_skip_verify: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthObjectRefRecord {
    #[serde(flatten)]
    pub key: ObjectKeyRecord,
    pub username_path: String,
    pub password_path: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransformerRecord {
    pub kind: TransformerKindRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookRecord>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransformerKindRecord {
    Butane,
    Webhook,
}

impl ProfileRecord {
    pub fn into_profile(self) -> Result<Profile, RecordError> {
        let mut additional_content = HashMap::new();
        let mut content_id_to_name = HashMap::new();

        for record in self.spec.additional_content {
            let name = record.name.clone();
            let mut content = convert_content(record)?;

            if content.exposed {
                let id = self
                    .status
                    .exposed_additional_content
                    .get(&name)
                    .copied()
                    .ok_or_else(|| {
                        RecordError::MissingExposedId(name.clone())
                    })?;
                content = content.exposed(id);
                if content_id_to_name.insert(id, name.clone()).is_some() {
                    return Err(RecordError::DuplicateExposedId(id));
                }
            }

            if additional_content.insert(name.clone(), content).is_some() {
                return Err(RecordError::DuplicateContentName(name));
            }
        }

        Ok(Profile {
            name: self.name,
            ipxe_template: self.spec.ipxe_template,
            additional_content,
            content_id_to_name,
        })
    }
}

fn convert_content(record: ContentRecord) -> Result<Content, RecordError> {
    let name = record.name;
    let mut post_transformers = Vec::with_capacity(record.post_transformers.len());
    for t in record.post_transformers {
        post_transformers.push(match t.kind {
            TransformerKindRecord::Butane => TransformerConfig::Butane,
            TransformerKindRecord::Webhook => {
                let webhook = t.webhook.ok_or_else(|| {
                    RecordError::MissingTransformerWebhook(name.clone())
                })?;
                TransformerConfig::Webhook(convert_webhook(&name, webhook)?)
            }
        });
    }

    let source = match (record.inline, record.object_ref, record.webhook) {
        (Some(inline), None, None) => ContentSource::Inline(inline),
        (None, Some(object_ref), None) => {
            ContentSource::ObjectRef(ObjectRef {
                json_path: compile_path(&name, &object_ref.json_path)?,
                key: object_ref.key.into(),
            })
        }
        (None, None, Some(webhook)) => {
            ContentSource::Webhook(convert_webhook(&name, webhook)?)
        }
        _ => return Err(RecordError::AmbiguousSource(name)),
    };

    Ok(Content {
        name,
        exposed: record.exposed,
        exposed_id: None,
        source,
        post_transformers,
    })
}

fn convert_webhook(
    content: &str,
    record: WebhookRecord,
) -> Result<WebhookConfig, RecordError> {
    let mtls = record
        .mtls_object_ref
        .map(|r| {
            Ok::<_, RecordError>(MtlsObjectRef {
                client_key_path: compile_path(content, &r.client_key_path)?,
                client_cert_path: compile_path(content, &r.client_cert_path)?,
                ca_bundle_path: compile_path(content, &r.ca_bundle_path)?,
                tls_insecure_skip_verify: r.tls_insecure_skip_verify,
                key: r.key.into(),
            })
        })
        .transpose()?;

    let basic_auth = record
        .basic_auth_object_ref
        .map(|r| {
            Ok::<_, RecordError>(BasicAuthObjectRef {
                username_path: compile_path(content, &r.username_path)?,
                password_path: compile_path(content, &r.password_path)?,
                key: r.key.into(),
            })
        })
        .transpose()?;

    Ok(WebhookConfig { url: record.url, mtls, basic_auth })
}

fn compile_path(content: &str, path: &str) -> Result<JsonPath, RecordError> {
    JsonPath::parse(path).map_err(|source| RecordError::JsonPath {
        content: content.to_string(),
        path: path.to_string(),
        source,
    })
}
