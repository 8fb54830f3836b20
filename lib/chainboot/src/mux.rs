// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The resolve/transform multiplexer.
//!
//! Dispatches each content entry to the resolver registered for its kind,
//! then threads the resolved bytes through the content's transformer
//! chain. The batch variant serves the iPXE controller: with
//! [`BatchOptions::return_exposed_content_url`] set, exposed entries are
//! substituted with a stable `/content/{id}` URL instead of being
//! resolved, deferring their I/O until the booting machine fetches them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::params::IpxeSelectors;
use crate::profile::{Content, ResolverKind, TransformerKind};
use crate::resolve::{ResolveError, Resolver};
use crate::transform::{TransformError, Transformer};

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// A content named a resolver kind nothing was registered for. This
    /// is a wiring bug, not a data error.
    #[error("no resolver registered for kind {0:?}")]
    UnknownResolver(ResolverKind),

    #[error("no transformer registered for kind {0:?}")]
    UnknownTransformer(TransformerKind),

    #[error("exposed content {0:?} carries no content id")]
    MissingExposedId(String),

    #[error("resolving content {name:?}")]
    Resolve {
        name: String,
        #[source]
        source: ResolveError,
    },

    #[error("transforming content {name:?}")]
    Transform {
        name: String,
        #[source]
        source: TransformError,
    },
}

/// Options for [`ResolveTransformMux::resolve_and_transform_batch`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BatchOptions {
    /// Substitute exposed entries with their `/content/{id}` URL instead
    /// of resolving them.
    pub return_exposed_content_url: bool,
}

pub struct ResolveTransformMux {
    base_url: String,
    resolvers: HashMap<ResolverKind, Arc<dyn Resolver>>,
    transformers: HashMap<TransformerKind, Arc<dyn Transformer>>,
}

impl ResolveTransformMux {
    pub fn new(
        base_url: impl Into<String>,
        resolvers: HashMap<ResolverKind, Arc<dyn Resolver>>,
        transformers: HashMap<TransformerKind, Arc<dyn Transformer>>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        ResolveTransformMux { base_url, resolvers, transformers }
    }

    /// Resolve one content and run its transformer chain.
    pub async fn resolve_and_transform(
        &self,
        content: &Content,
        selectors: &IpxeSelectors,
    ) -> Result<Vec<u8>, MuxError> {
        let resolver = self
            .resolvers
            .get(&content.resolver_kind())
            .ok_or(MuxError::UnknownResolver(content.resolver_kind()))?;

        let mut out = resolver
            .resolve(content, selectors)
            .await
            .map_err(|source| MuxError::Resolve {
                name: content.name.clone(),
                source,
            })?;

        for config in &content.post_transformers {
            let transformer = self
                .transformers
                .get(&config.kind())
                .ok_or(MuxError::UnknownTransformer(config.kind()))?;
            out = transformer
                .transform(config, out, selectors)
                .await
                .map_err(|source| MuxError::Transform {
                    name: content.name.clone(),
                    source,
                })?;
        }

        Ok(out)
    }

    /// Resolve a whole content map. Iteration order is unspecified; the
    /// first failure aborts the batch.
    pub async fn resolve_and_transform_batch(
        &self,
        batch: &HashMap<String, Content>,
        selectors: &IpxeSelectors,
        options: BatchOptions,
    ) -> Result<HashMap<String, Vec<u8>>, MuxError> {
        let mut output = HashMap::with_capacity(batch.len());

        for (name, content) in batch {
            if options.return_exposed_content_url && content.exposed {
                let id = content.exposed_id.ok_or_else(|| {
                    MuxError::MissingExposedId(name.clone())
                })?;
                output.insert(
                    name.clone(),
                    format!("{}/content/{id}", self.base_url).into_bytes(),
                );
                continue;
            }

            let resolved =
                self.resolve_and_transform(content, selectors).await?;
            output.insert(name.clone(), resolved);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::Buildarch;
    use crate::profile::TransformerConfig;
    use crate::resolve::MockResolver;
    use crate::transform::MockTransformer;
    use uuid::Uuid;

    fn selectors() -> IpxeSelectors {
        IpxeSelectors { uuid: Uuid::new_v4(), buildarch: Buildarch::Arm64 }
    }

    fn mux_with(
        resolvers: Vec<(ResolverKind, Arc<dyn Resolver>)>,
        transformers: Vec<(TransformerKind, Arc<dyn Transformer>)>,
    ) -> ResolveTransformMux {
        ResolveTransformMux::new(
            "https://boot.example.com",
            resolvers.into_iter().collect(),
            transformers.into_iter().collect(),
        )
    }

    #[tokio::test]
    async fn dispatches_by_resolver_kind() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_, _| Ok(b"resolved".to_vec()));

        let mux = mux_with(
            vec![(ResolverKind::Inline, Arc::new(resolver))],
            vec![],
        );
        let content = Content::inline("greet", "hi", Vec::new());
        let out = mux
            .resolve_and_transform(&content, &selectors())
            .await
            .unwrap();
        assert_eq!(out, b"resolved");
    }

    #[tokio::test]
    async fn unknown_resolver_kind() {
        let mux = mux_with(vec![], vec![]);
        let content = Content::inline("greet", "hi", Vec::new());
        let err = mux.resolve_and_transform(&content, &selectors()).await;
        assert!(matches!(
            err,
            Err(MuxError::UnknownResolver(ResolverKind::Inline))
        ));
    }

    #[tokio::test]
    async fn transformers_run_in_order() {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|_, _| Ok(b"base".to_vec()));

        let mut transformer = MockTransformer::new();
        transformer.expect_transform().times(2).returning(
            |_, content, _| {
                let mut out = content;
                out.push(b'!');
                Ok(out)
            },
        );

        let mux = mux_with(
            vec![(ResolverKind::Inline, Arc::new(resolver))],
            vec![(TransformerKind::Butane, Arc::new(transformer))],
        );
        let content = Content::inline(
            "cfg",
            "ignored",
            vec![TransformerConfig::Butane, TransformerConfig::Butane],
        );
        let out = mux
            .resolve_and_transform(&content, &selectors())
            .await
            .unwrap();
        assert_eq!(out, b"base!!");
    }

    #[tokio::test]
    async fn unknown_transformer_kind() {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|_, _| Ok(b"base".to_vec()));

        let mux = mux_with(
            vec![(ResolverKind::Inline, Arc::new(resolver))],
            vec![],
        );
        let content = Content::inline(
            "cfg",
            "ignored",
            vec![TransformerConfig::Butane],
        );
        let err = mux.resolve_and_transform(&content, &selectors()).await;
        assert!(matches!(
            err,
            Err(MuxError::UnknownTransformer(TransformerKind::Butane))
        ));
    }

    #[tokio::test]
    async fn batch_substitutes_urls_for_exposed_entries() {
        let mut resolver = MockResolver::new();
        // Only the non-exposed entry is resolved.
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_, _| Ok(b"resolved".to_vec()));

        let mux = mux_with(
            vec![(ResolverKind::Inline, Arc::new(resolver))],
            vec![],
        );

        let id: Uuid =
            "11111111-1111-1111-1111-111111111111".parse().unwrap();
        let mut batch = HashMap::new();
        batch.insert(
            "cfg".to_string(),
            Content::inline("cfg", "BODY", Vec::new()).exposed(id),
        );
        batch.insert(
            "greet".to_string(),
            Content::inline("greet", "hi", Vec::new()),
        );

        let out = mux
            .resolve_and_transform_batch(
                &batch,
                &selectors(),
                BatchOptions { return_exposed_content_url: true },
            )
            .await
            .unwrap();

        assert_eq!(
            out["cfg"],
            format!("https://boot.example.com/content/{id}").into_bytes()
        );
        assert_eq!(out["greet"], b"resolved");
    }

    #[tokio::test]
    async fn batch_without_option_resolves_exposed_entries() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_, _| Ok(b"BODY".to_vec()));

        let mux = mux_with(
            vec![(ResolverKind::Inline, Arc::new(resolver))],
            vec![],
        );

        let id = Uuid::new_v4();
        let mut batch = HashMap::new();
        batch.insert(
            "cfg".to_string(),
            Content::inline("cfg", "BODY", Vec::new()).exposed(id),
        );

        let out = mux
            .resolve_and_transform_batch(
                &batch,
                &selectors(),
                BatchOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(out["cfg"], b"BODY");
    }

    #[tokio::test]
    async fn batch_short_circuits_on_first_error() {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|_, _| {
            Err(crate::resolve::ResolveError::Config("boom".to_string()))
        });

        let mux = mux_with(
            vec![(ResolverKind::Inline, Arc::new(resolver))],
            vec![],
        );

        let mut batch = HashMap::new();
        batch.insert(
            "a".to_string(),
            Content::inline("a", "x", Vec::new()),
        );
        batch.insert(
            "b".to_string(),
            Content::inline("b", "y", Vec::new()),
        );

        let err = mux
            .resolve_and_transform_batch(
                &batch,
                &selectors(),
                BatchOptions::default(),
            )
            .await;
        assert!(matches!(err, Err(MuxError::Resolve { .. })));
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_output() {
        let mux = mux_with(vec![], vec![]);
        let out = mux
            .resolve_and_transform_batch(
                &HashMap::new(),
                &selectors(),
                BatchOptions::default(),
            )
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
