// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The exposed-content controller.
//!
//! Serves the `/content/{id}` URLs emitted during iPXE rendering: looks
//! up the profile exposing the id, then resolves and transforms that one
//! content entry in full.

use std::sync::Arc;

use slog::{debug, o, Logger};
use uuid::Uuid;

use crate::mux::{MuxError, ResolveTransformMux};
use crate::params::IpxeSelectors;
use crate::store::{ProfileStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("content id cannot be the nil UUID")]
    NilContentId,

    #[error("no profile exposes content id {0}")]
    NotFound(Uuid),

    #[error("looking up content id {id}")]
    Lookup {
        id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("resolving content id {id}")]
    Resolve {
        id: Uuid,
        #[source]
        source: MuxError,
    },
}

pub struct ContentController {
    profiles: Arc<dyn ProfileStore>,
    mux: Arc<ResolveTransformMux>,
    log: Logger,
}

impl ContentController {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        mux: Arc<ResolveTransformMux>,
        log: &Logger,
    ) -> Self {
        ContentController {
            profiles,
            mux,
            log: log.new(o!("component" => "content-controller")),
        }
    }

    /// Resolve the content exposed under `content_id`.
    ///
    /// The id from the URL is authoritative for identity: it replaces any
    /// client-supplied UUID on the selectors passed to resolvers and
    /// transformers.
    pub async fn get_by_id(
        &self,
        content_id: Uuid,
        selectors: &IpxeSelectors,
    ) -> Result<Vec<u8>, ContentError> {
        if content_id.is_nil() {
            return Err(ContentError::NilContentId);
        }

        debug!(self.log, "serving exposed content";
               "content_id" => %content_id,
               "buildarch" => %selectors.buildarch);

        let profiles = match self.profiles.list_by_content_id(content_id).await
        {
            Ok(profiles) => profiles,
            Err(StoreError::ProfileNotFound) => {
                return Err(ContentError::NotFound(content_id))
            }
            Err(source) => {
                return Err(ContentError::Lookup { id: content_id, source })
            }
        };

        // Exposed ids are unique across profiles (enforced at admission),
        // so the list holds at most one entry.
        let Some(profile) = profiles.into_iter().next() else {
            return Err(ContentError::NotFound(content_id));
        };

        let content = profile
            .content_id_to_name
            .get(&content_id)
            .and_then(|name| profile.additional_content.get(name))
            .ok_or(ContentError::NotFound(content_id))?;

        self.mux
            .resolve_and_transform(
                content,
                &IpxeSelectors {
                    uuid: content_id,
                    buildarch: selectors.buildarch,
                },
            )
            .await
            .map_err(|source| ContentError::Resolve {
                id: content_id,
                source,
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    use crate::params::Buildarch;
    use crate::profile::{Content, Profile, ResolverKind};
    use crate::resolve::{MockResolver, Resolver};
    use crate::store::MockProfileStore;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn selectors() -> IpxeSelectors {
        IpxeSelectors { uuid: Uuid::new_v4(), buildarch: Buildarch::Arm64 }
    }

    fn exposing_profile(id: Uuid) -> Profile {
        let content =
            Content::inline("cfg", "BODY", Vec::new()).exposed(id);
        Profile {
            name: "p".to_string(),
            ipxe_template: String::new(),
            additional_content: [("cfg".to_string(), content)]
                .into_iter()
                .collect(),
            content_id_to_name: [(id, "cfg".to_string())]
                .into_iter()
                .collect(),
        }
    }

    fn controller_with(
        profiles: MockProfileStore,
        resolver: MockResolver,
    ) -> ContentController {
        let resolvers: HashMap<ResolverKind, Arc<dyn Resolver>> =
            [(ResolverKind::Inline, Arc::new(resolver) as Arc<dyn Resolver>)]
                .into_iter()
                .collect();
        let mux = Arc::new(ResolveTransformMux::new(
            "https://boot.example.com",
            resolvers,
            HashMap::new(),
        ));
        ContentController::new(Arc::new(profiles), mux, &test_logger())
    }

    #[tokio::test]
    async fn nil_content_id_fails_before_any_lookup() {
        let mut profiles = MockProfileStore::new();
        profiles.expect_list_by_content_id().never();

        let controller = controller_with(profiles, MockResolver::new());
        let err = controller.get_by_id(Uuid::nil(), &selectors()).await;
        assert!(matches!(err, Err(ContentError::NilContentId)));
    }

    #[tokio::test]
    async fn unknown_content_id_is_not_found() {
        let mut profiles = MockProfileStore::new();
        profiles
            .expect_list_by_content_id()
            .returning(|_| Ok(Vec::new()));

        let controller = controller_with(profiles, MockResolver::new());
        let err = controller
            .get_by_id(Uuid::new_v4(), &selectors())
            .await;
        assert!(matches!(err, Err(ContentError::NotFound(_))));
    }

    #[tokio::test]
    async fn content_id_overrides_client_uuid() {
        let id = Uuid::new_v4();

        let mut profiles = MockProfileStore::new();
        profiles
            .expect_list_by_content_id()
            .returning(move |_| Ok(vec![exposing_profile(id)]));

        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .withf(move |_, sel| sel.uuid == id)
            .times(1)
            .returning(|_, _| Ok(b"BODY".to_vec()));

        let controller = controller_with(profiles, resolver);
        let out = controller.get_by_id(id, &selectors()).await.unwrap();
        assert_eq!(out, b"BODY");
    }

    #[tokio::test]
    async fn transformers_still_run_on_content_requests() {
        // get_by_id resolves in full-render mode even though the entry is
        // exposed; substitution only happens during iPXE rendering.
        let id = Uuid::new_v4();
        let mut profiles = MockProfileStore::new();
        profiles
            .expect_list_by_content_id()
            .returning(move |_| Ok(vec![exposing_profile(id)]));

        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_, _| Ok(b"BODY".to_vec()));

        let controller = controller_with(profiles, resolver);
        let out = controller.get_by_id(id, &selectors()).await.unwrap();
        assert_eq!(out, b"BODY");
    }
}
