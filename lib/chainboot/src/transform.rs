// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transformers rewrite resolved bytes.
//!
//! Two kinds exist: the Butane transformer translates a Butane YAML
//! document into Ignition JSON, and the webhook transformer posts the
//! working bytes to an external HTTPS endpoint and adopts its response.
//! Transformers run in the order configured on the content; the output of
//! one is the input of the next.

use std::sync::Arc;

use base64::Engine;

use crate::params::IpxeSelectors;
use crate::profile::TransformerConfig;
use crate::resolve::{ObjectRefResolver, ResolveError};
use crate::webhook;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("transformer configuration: {0}")]
    Config(String),

    #[error("translating Butane content")]
    Butane(#[from] butane_translate::TranslateError),

    #[error("resolving webhook credentials")]
    Credentials(#[from] ResolveError),

    #[error("calling webhook {url:?}")]
    Backend {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A byte transformer. Implementations are immutable after construction
/// and shared across requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        config: &TransformerConfig,
        content: Vec<u8>,
        selectors: &IpxeSelectors,
    ) -> Result<Vec<u8>, TransformError>;
}

// --- Butane transformer ---

/// Translates Butane YAML into Ignition JSON. Deterministic per input;
/// carries no configuration.
#[derive(Debug, Default)]
pub struct ButaneTransformer;

#[async_trait::async_trait]
impl Transformer for ButaneTransformer {
    async fn transform(
        &self,
        _config: &TransformerConfig,
        content: Vec<u8>,
        _selectors: &IpxeSelectors,
    ) -> Result<Vec<u8>, TransformError> {
        Ok(butane_translate::translate(&content)?)
    }
}

// --- Webhook transformer ---

/// Posts the working bytes to an external HTTPS endpoint; the response
/// body replaces them. Credential handling matches the webhook resolver:
/// mTLS material and basic-auth credentials are pulled through the
/// object-ref resolver per call.
///
/// Any completed HTTP response is adopted, non-2xx included; only
/// transport failures are errors.
pub struct WebhookTransformer {
    objects: Arc<ObjectRefResolver>,
    force_tls_verify: bool,
}

impl WebhookTransformer {
    pub fn new(objects: Arc<ObjectRefResolver>, force_tls_verify: bool) -> Self {
        WebhookTransformer { objects, force_tls_verify }
    }
}

/// The JSON document posted to transformer webhooks.
pub(crate) fn webhook_body(
    content: &[u8],
    selectors: &IpxeSelectors,
) -> serde_json::Value {
    serde_json::json!({
        "content": base64::engine::general_purpose::STANDARD.encode(content),
        "attributes": {
            "uuid": selectors.uuid.to_string(),
            "buildarch": selectors.buildarch.to_string(),
        },
    })
}

#[async_trait::async_trait]
impl Transformer for WebhookTransformer {
    async fn transform(
        &self,
        config: &TransformerConfig,
        content: Vec<u8>,
        selectors: &IpxeSelectors,
    ) -> Result<Vec<u8>, TransformError> {
        let TransformerConfig::Webhook(config) = config else {
            return Err(TransformError::Config(
                "webhook transformer has no webhook configuration"
                    .to_string(),
            ));
        };

        let client = webhook::client(
            &self.objects,
            config.mtls.as_ref(),
            self.force_tls_verify,
        )
        .await?;

        let mut request = client
            .post(webhook::url(&config.url))
            .query(&[
                ("uuid", selectors.uuid.to_string()),
                ("buildarch", selectors.buildarch.to_string()),
            ])
            .json(&webhook_body(&content, selectors));
        if let Some((username, password)) =
            webhook::basic_auth(&self.objects, config.basic_auth.as_ref())
                .await?
        {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await.map_err(|source| {
            TransformError::Backend { url: config.url.clone(), source }
        })?;
        let body = response.bytes().await.map_err(|source| {
            TransformError::Backend { url: config.url.clone(), source }
        })?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::Buildarch;
    use crate::store::MockObjectStore;

    fn selectors() -> IpxeSelectors {
        IpxeSelectors {
            uuid: "d3f9e2c0-5a1b-4c7d-9e8f-0a1b2c3d4e5f".parse().unwrap(),
            buildarch: Buildarch::Arm64,
        }
    }

    #[tokio::test]
    async fn butane_translates_to_ignition() {
        let input = b"variant: fcos\nversion: 1.5.0\npasswd:\n  users:\n    - name: core\n".to_vec();
        let output = ButaneTransformer
            .transform(&TransformerConfig::Butane, input, &selectors())
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            r#"{"ignition":{"version":"3.4.0"},"passwd":{"users":[{"name":"core"}]}}"#
        );
    }

    #[tokio::test]
    async fn butane_rejects_ignition_input() {
        let input = br#"{"ignition":{"version":"3.4.0"}}"#.to_vec();
        let err = ButaneTransformer
            .transform(&TransformerConfig::Butane, input, &selectors())
            .await;
        assert!(matches!(err, Err(TransformError::Butane(_))));
    }

    #[tokio::test]
    async fn webhook_transformer_requires_webhook_config() {
        let objects = Arc::new(ObjectRefResolver::new(Arc::new(
            MockObjectStore::new(),
        )));
        let transformer = WebhookTransformer::new(objects, false);
        let err = transformer
            .transform(
                &TransformerConfig::Butane,
                b"payload".to_vec(),
                &selectors(),
            )
            .await;
        assert!(matches!(err, Err(TransformError::Config(_))));
    }

    #[test]
    fn webhook_body_carries_base64_content_and_attributes() {
        let body = webhook_body(b"hello", &selectors());
        assert_eq!(body["content"], "aGVsbG8=");
        assert_eq!(
            body["attributes"]["uuid"],
            "d3f9e2c0-5a1b-4c7d-9e8f-0a1b2c3d4e5f"
        );
        assert_eq!(body["attributes"]["buildarch"], "arm64");
    }
}
