// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolvers turn a content descriptor into raw bytes.
//!
//! Three variants exist: the inline resolver returns the literal carried
//! by the content, the object-ref resolver reads a control-plane object
//! and extracts bytes through a compiled JSONPath, and the webhook
//! resolver fetches bytes from an external HTTPS endpoint. The object-ref
//! resolver additionally exposes [`ObjectRefResolver::resolve_paths`],
//! which the webhook resolver and webhook transformer use to pull
//! credentials out of referenced objects.
//!
//! Resolvers never mutate the content they receive and never retry.

use std::sync::Arc;

use serde_json_path::JsonPath;

use crate::params::IpxeSelectors;
use crate::profile::{Content, ContentSource, ObjectKey};
use crate::store::{ObjectStore, StoreError};
use crate::webhook;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The content or its credential references are malformed in a way
    /// profile ingestion cannot catch (schema drift in referenced
    /// objects, mismatched payloads).
    #[error("resolver configuration: {0}")]
    Config(String),

    /// A compiled JSONPath matched nothing in the referenced object.
    #[error("JSONPath {path} matched nothing in object {object}")]
    PathMiss { object: String, path: String },

    #[error("loading referenced object")]
    Store(#[from] StoreError),

    #[error("calling webhook {url:?}")]
    Backend {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("building webhook TLS client")]
    Tls(#[source] reqwest::Error),
}

/// A content resolver. Implementations are immutable after construction
/// and shared across requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(
        &self,
        content: &Content,
        selectors: &IpxeSelectors,
    ) -> Result<Vec<u8>, ResolveError>;
}

// --- Inline resolver ---

/// Returns the inline literal carried by the content. Never performs I/O.
#[derive(Debug, Default)]
pub struct InlineResolver;

#[async_trait::async_trait]
impl Resolver for InlineResolver {
    async fn resolve(
        &self,
        content: &Content,
        _selectors: &IpxeSelectors,
    ) -> Result<Vec<u8>, ResolveError> {
        match &content.source {
            ContentSource::Inline(value) => Ok(value.clone().into_bytes()),
            _ => Err(ResolveError::Config(format!(
                "content {:?} has no inline payload",
                content.name
            ))),
        }
    }
}

// --- Object-ref resolver ---

/// Resolves content by reading one control-plane object and extracting
/// bytes through the content's JSONPath.
pub struct ObjectRefResolver {
    objects: Arc<dyn ObjectStore>,
}

impl ObjectRefResolver {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        ObjectRefResolver { objects }
    }

    /// Perform a single object read and apply several compiled paths to
    /// the result, in order. Every path must capture something.
    pub async fn resolve_paths(
        &self,
        paths: &[&JsonPath],
        key: &ObjectKey,
    ) -> Result<Vec<Vec<u8>>, ResolveError> {
        let object = self.objects.get(key).await?;

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let nodes = path.query(&object).all();
            if nodes.is_empty() {
                return Err(ResolveError::PathMiss {
                    object: key.to_string(),
                    path: format!("{path:?}"),
                });
            }
            let mut captured = Vec::new();
            for (i, node) in nodes.iter().enumerate() {
                if i > 0 {
                    captured.push(b' ');
                }
                captured.extend(node_bytes(node)?);
            }
            out.push(captured);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl Resolver for ObjectRefResolver {
    async fn resolve(
        &self,
        content: &Content,
        _selectors: &IpxeSelectors,
    ) -> Result<Vec<u8>, ResolveError> {
        let ContentSource::ObjectRef(object_ref) = &content.source else {
            return Err(ResolveError::Config(format!(
                "content {:?} has no object reference",
                content.name
            )));
        };

        let mut out = self
            .resolve_paths(&[&object_ref.json_path], &object_ref.key)
            .await?;
        Ok(out.swap_remove(0))
    }
}

/// Scalar captures are emitted raw; structured captures are emitted as
/// compact JSON.
fn node_bytes(node: &serde_json::Value) -> Result<Vec<u8>, ResolveError> {
    match node {
        serde_json::Value::String(s) => Ok(s.clone().into_bytes()),
        other => serde_json::to_vec(other).map_err(|e| {
            ResolveError::Config(format!("serializing JSONPath capture: {e}"))
        }),
    }
}

// --- Webhook resolver ---

/// Fetches content bytes from an external HTTPS endpoint, optionally
/// authenticating with referenced mTLS material and basic-auth
/// credentials.
///
/// The response body is returned whatever the status code: a non-2xx
/// response is the serving side's chosen representation of the content
/// and is propagated verbatim.
pub struct WebhookResolver {
    objects: Arc<ObjectRefResolver>,
    force_tls_verify: bool,
}

impl WebhookResolver {
    pub fn new(objects: Arc<ObjectRefResolver>, force_tls_verify: bool) -> Self {
        WebhookResolver { objects, force_tls_verify }
    }
}

#[async_trait::async_trait]
impl Resolver for WebhookResolver {
    async fn resolve(
        &self,
        content: &Content,
        selectors: &IpxeSelectors,
    ) -> Result<Vec<u8>, ResolveError> {
        let ContentSource::Webhook(config) = &content.source else {
            return Err(ResolveError::Config(format!(
                "content {:?} has no webhook configuration",
                content.name
            )));
        };

        let client = webhook::client(
            &self.objects,
            config.mtls.as_ref(),
            self.force_tls_verify,
        )
        .await?;

        let mut request = client.get(webhook::url(&config.url)).query(&[
            ("buildarch", selectors.buildarch.to_string()),
            ("uuid", selectors.uuid.to_string()),
        ]);
        if let Some((username, password)) =
            webhook::basic_auth(&self.objects, config.basic_auth.as_ref())
                .await?
        {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await.map_err(|source| {
            ResolveError::Backend { url: config.url.clone(), source }
        })?;
        let body = response.bytes().await.map_err(|source| {
            ResolveError::Backend { url: config.url.clone(), source }
        })?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::Buildarch;
    use crate::profile::ObjectRef;
    use crate::store::MockObjectStore;
    use uuid::Uuid;

    fn selectors() -> IpxeSelectors {
        IpxeSelectors { uuid: Uuid::new_v4(), buildarch: Buildarch::Arm64 }
    }

    fn object_key(name: &str) -> ObjectKey {
        ObjectKey {
            group: "boot.example.com".to_string(),
            version: "v1".to_string(),
            resource: "kernelparams".to_string(),
            namespace: "default".to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn inline_returns_the_literal() {
        let content = Content::inline("greet", "hi", Vec::new());
        let resolved = InlineResolver
            .resolve(&content, &selectors())
            .await
            .unwrap();
        assert_eq!(resolved, b"hi");
    }

    #[tokio::test]
    async fn inline_rejects_other_payloads() {
        let content = Content::object_ref(
            "cmdline",
            ObjectRef {
                key: object_key("worker"),
                json_path: JsonPath::parse("$.spec.cmdline").unwrap(),
            },
            Vec::new(),
        );
        let err = InlineResolver.resolve(&content, &selectors()).await;
        assert!(matches!(err, Err(ResolveError::Config(_))));
    }

    #[tokio::test]
    async fn object_ref_extracts_through_json_path() {
        let mut store = MockObjectStore::new();
        store.expect_get().times(1).returning(|_| {
            Ok(serde_json::json!({
                "spec": { "cmdline": "console=ttyS0 quiet" }
            }))
        });

        let resolver = ObjectRefResolver::new(Arc::new(store));
        let content = Content::object_ref(
            "cmdline",
            ObjectRef {
                key: object_key("worker"),
                json_path: JsonPath::parse("$.spec.cmdline").unwrap(),
            },
            Vec::new(),
        );
        let resolved =
            resolver.resolve(&content, &selectors()).await.unwrap();
        assert_eq!(resolved, b"console=ttyS0 quiet");
    }

    #[tokio::test]
    async fn object_ref_path_miss() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .returning(|_| Ok(serde_json::json!({ "spec": {} })));

        let resolver = ObjectRefResolver::new(Arc::new(store));
        let content = Content::object_ref(
            "cmdline",
            ObjectRef {
                key: object_key("worker"),
                json_path: JsonPath::parse("$.spec.cmdline").unwrap(),
            },
            Vec::new(),
        );
        let err = resolver.resolve(&content, &selectors()).await;
        assert!(matches!(err, Err(ResolveError::PathMiss { .. })));
    }

    #[tokio::test]
    async fn object_ref_propagates_store_misses() {
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|key| {
            Err(StoreError::ObjectNotFound(key.to_string()))
        });

        let resolver = ObjectRefResolver::new(Arc::new(store));
        let content = Content::object_ref(
            "cmdline",
            ObjectRef {
                key: object_key("gone"),
                json_path: JsonPath::parse("$.spec.cmdline").unwrap(),
            },
            Vec::new(),
        );
        let err = resolver.resolve(&content, &selectors()).await;
        assert!(matches!(
            err,
            Err(ResolveError::Store(StoreError::ObjectNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn resolve_paths_performs_a_single_read() {
        let mut store = MockObjectStore::new();
        store.expect_get().times(1).returning(|_| {
            Ok(serde_json::json!({
                "data": { "username": "svc-boot", "password": "hunter2" }
            }))
        });

        let resolver = ObjectRefResolver::new(Arc::new(store));
        let username = JsonPath::parse("$.data.username").unwrap();
        let password = JsonPath::parse("$.data.password").unwrap();
        let buffers = resolver
            .resolve_paths(&[&username, &password], &object_key("creds"))
            .await
            .unwrap();
        assert_eq!(buffers, vec![b"svc-boot".to_vec(), b"hunter2".to_vec()]);
    }

    #[tokio::test]
    async fn structured_captures_are_compact_json() {
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|_| {
            Ok(serde_json::json!({ "spec": { "args": ["a", "b"] } }))
        });

        let resolver = ObjectRefResolver::new(Arc::new(store));
        let path = JsonPath::parse("$.spec.args").unwrap();
        let buffers = resolver
            .resolve_paths(&[&path], &object_key("worker"))
            .await
            .unwrap();
        assert_eq!(buffers[0], br#"["a","b"]"#.to_vec());
    }

    #[tokio::test]
    async fn webhook_rejects_other_payloads() {
        let store = MockObjectStore::new();
        let objects = Arc::new(ObjectRefResolver::new(Arc::new(store)));
        let resolver = WebhookResolver::new(objects, false);
        let content = Content::inline("greet", "hi", Vec::new());
        let err = resolver.resolve(&content, &selectors()).await;
        assert!(matches!(err, Err(ResolveError::Config(_))));
    }
}
