// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The in-memory profile model.
//!
//! A profile bundles an iPXE template with named additional content. Each
//! content entry names a resolver (inline literal, control-plane object
//! reference, or webhook call) and an ordered list of post-transformers.
//! JSONPath expressions are compiled when a profile record is converted
//! into this model (see [`crate::records`]); nothing here touches the
//! network or the store.

use std::collections::HashMap;

use serde_json_path::JsonPath;
use uuid::Uuid;

/// A profile as used by the request pipeline.
#[derive(Clone, Debug)]
pub struct Profile {
    pub name: String,
    pub ipxe_template: String,
    /// Content name → content.
    pub additional_content: HashMap<String, Content>,
    /// Exposed content id → content name.
    pub content_id_to_name: HashMap<Uuid, String>,
}

/// One named piece of additional content on a profile.
#[derive(Clone, Debug)]
pub struct Content {
    pub name: String,
    /// Exposed content is substituted with a `/content/{id}` URL during
    /// iPXE rendering and resolved lazily when that URL is fetched.
    pub exposed: bool,
    pub exposed_id: Option<Uuid>,
    pub source: ContentSource,
    pub post_transformers: Vec<TransformerConfig>,
}

impl Content {
    pub fn inline(
        name: impl Into<String>,
        value: impl Into<String>,
        post_transformers: Vec<TransformerConfig>,
    ) -> Self {
        Content {
            name: name.into(),
            exposed: false,
            exposed_id: None,
            source: ContentSource::Inline(value.into()),
            post_transformers,
        }
    }

    pub fn object_ref(
        name: impl Into<String>,
        object_ref: ObjectRef,
        post_transformers: Vec<TransformerConfig>,
    ) -> Self {
        Content {
            name: name.into(),
            exposed: false,
            exposed_id: None,
            source: ContentSource::ObjectRef(object_ref),
            post_transformers,
        }
    }

    pub fn webhook(
        name: impl Into<String>,
        config: WebhookConfig,
        post_transformers: Vec<TransformerConfig>,
    ) -> Self {
        Content {
            name: name.into(),
            exposed: false,
            exposed_id: None,
            source: ContentSource::Webhook(config),
            post_transformers,
        }
    }

    /// Mark this content as exposed under the given stable id.
    pub fn exposed(mut self, id: Uuid) -> Self {
        self.exposed = true;
        self.exposed_id = Some(id);
        self
    }

    pub fn resolver_kind(&self) -> ResolverKind {
        self.source.kind()
    }
}

/// The resolver payload carried by a content entry. Exactly one payload
/// exists per content by construction.
#[derive(Clone, Debug)]
pub enum ContentSource {
    Inline(String),
    ObjectRef(ObjectRef),
    Webhook(WebhookConfig),
}

impl ContentSource {
    pub fn kind(&self) -> ResolverKind {
        match self {
            ContentSource::Inline(_) => ResolverKind::Inline,
            ContentSource::ObjectRef(_) => ResolverKind::ObjectRef,
            ContentSource::Webhook(_) => ResolverKind::Webhook,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolverKind {
    Inline,
    ObjectRef,
    Webhook,
}

/// Coordinates of a record in the control-plane object store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectKey {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.group, self.version, self.resource, self.namespace, self.name
        )
    }
}

/// An object reference with a single extraction path.
#[derive(Clone, Debug)]
pub struct ObjectRef {
    pub key: ObjectKey,
    pub json_path: JsonPath,
}

/// Configuration for an outbound webhook call, shared by the webhook
/// resolver and the webhook transformer.
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    /// Host, port and path without a scheme; calls are always HTTPS.
    pub url: String,
    pub mtls: Option<MtlsObjectRef>,
    pub basic_auth: Option<BasicAuthObjectRef>,
}

/// Client TLS material, extracted from one control-plane object.
#[derive(Clone, Debug)]
pub struct MtlsObjectRef {
    pub key: ObjectKey,
    pub client_key_path: JsonPath,
    pub client_cert_path: JsonPath,
    pub ca_bundle_path: JsonPath,
    pub tls_insecure_skip_verify: bool,
}

/// Basic-auth credentials, extracted from one control-plane object.
#[derive(Clone, Debug)]
pub struct BasicAuthObjectRef {
    pub key: ObjectKey,
    pub username_path: JsonPath,
    pub password_path: JsonPath,
}

/// An entry in a content's post-transformer pipeline. Order matters: the
/// output of transformer `i` feeds transformer `i + 1`.
#[derive(Clone, Debug)]
pub enum TransformerConfig {
    /// Translate a Butane document into Ignition JSON.
    Butane,
    /// Post the working bytes to a webhook and adopt its response.
    Webhook(WebhookConfig),
}

impl TransformerConfig {
    pub fn kind(&self) -> TransformerKind {
        match self {
            TransformerConfig::Butane => TransformerKind::Butane,
            TransformerConfig::Webhook(_) => TransformerKind::Webhook,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformerKind {
    Butane,
    Webhook,
}
