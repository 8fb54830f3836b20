// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP server callback functions.
//!
//! Functions in this module parse boot parameters, hand requests to the
//! iPXE and content controllers, and translate the pipeline's typed
//! errors into HTTP status codes. Bodies are iPXE script text, so
//! endpoints respond with raw `text/plain` rather than JSON.

use std::collections::HashMap;
use std::sync::Arc;

use dropshot::{
    endpoint, ApiDescription, ApiDescriptionRegisterError, Body, HttpError,
    HttpResponseOk, Path, Query, RequestContext,
};
use http::Response;
use schemars::JsonSchema;
use serde::Deserialize;
use slog::Logger;
use slog_error_chain::InlineErrorChain;
use uuid::Uuid;

use chainboot::content::{ContentController, ContentError};
use chainboot::ipxe::{IpxeController, IpxeError};
use chainboot::mux::ResolveTransformMux;
use chainboot::params::BootParams;
use chainboot::profile::{ResolverKind, TransformerKind};
use chainboot::resolve::{
    InlineResolver, ObjectRefResolver, Resolver, WebhookResolver,
};
use chainboot::store::FsStore;
use chainboot::transform::{
    ButaneTransformer, Transformer, WebhookTransformer,
};

use crate::config::Config;

/// Objects shared by the API endpoint handlers.
pub struct ApiContext {
    pub ipxe: IpxeController,
    pub content: ContentController,
}

impl ApiContext {
    /// Wire the store, resolvers, transformers, mux and controllers from
    /// the daemon configuration.
    pub fn new(config: &Config, log: &Logger) -> ApiContext {
        let store = Arc::new(FsStore::new(
            &config.store.path,
            config.store.assignment_namespace.as_str(),
            config.store.profile_namespace.as_str(),
        ));

        let object_ref_resolver =
            Arc::new(ObjectRefResolver::new(store.clone()));

        let resolvers: HashMap<ResolverKind, Arc<dyn Resolver>> = [
            (
                ResolverKind::Inline,
                Arc::new(InlineResolver) as Arc<dyn Resolver>,
            ),
            (ResolverKind::ObjectRef, object_ref_resolver.clone() as _),
            (
                ResolverKind::Webhook,
                Arc::new(WebhookResolver::new(
                    object_ref_resolver.clone(),
                    config.force_tls_verify,
                )) as _,
            ),
        ]
        .into_iter()
        .collect();

        let transformers: HashMap<TransformerKind, Arc<dyn Transformer>> = [
            (
                TransformerKind::Butane,
                Arc::new(ButaneTransformer) as Arc<dyn Transformer>,
            ),
            (
                TransformerKind::Webhook,
                Arc::new(WebhookTransformer::new(
                    object_ref_resolver,
                    config.force_tls_verify,
                )) as _,
            ),
        ]
        .into_iter()
        .collect();

        let mux = Arc::new(ResolveTransformMux::new(
            config.base_url.clone(),
            resolvers,
            transformers,
        ));

        let ipxe = IpxeController::new(
            store.clone(),
            store.clone(),
            mux.clone(),
            log,
        );
        let content = ContentController::new(store, mux, log);

        ApiContext { ipxe, content }
    }
}

/// The boot API.
pub fn api() -> ApiDescription<ApiContext> {
    fn register_endpoints(
        api: &mut ApiDescription<ApiContext>,
    ) -> Result<(), ApiDescriptionRegisterError> {
        api.register(ipxe_get)?;
        api.register(content_get_by_id)?;
        Ok(())
    }

    let mut api = ApiDescription::new();
    if let Err(err) = register_endpoints(&mut api) {
        panic!("failed to register entrypoints: {}", err);
    }
    api
}

/// The liveness/readiness probe API, served on its own port.
pub fn probes_api() -> ApiDescription<()> {
    fn register_endpoints(
        api: &mut ApiDescription<()>,
    ) -> Result<(), ApiDescriptionRegisterError> {
        api.register(healthz)?;
        api.register(readyz)?;
        Ok(())
    }

    let mut api = ApiDescription::new();
    if let Err(err) = register_endpoints(&mut api) {
        panic!("failed to register probe entrypoints: {}", err);
    }
    api
}

/// Serve the bootstrap script, or a rendered profile when the request
/// carries boot selectors.
#[endpoint {
    method = GET,
    path = "/ipxe",
}]
async fn ipxe_get(
    rqctx: RequestContext<ApiContext>,
    query: Query<BootParams>,
) -> Result<Response<Body>, HttpError> {
    let ctx = rqctx.context();
    let params = query.into_inner();

    // A request without any selection parameter is a chain-loading
    // machine asking for the bootstrap script.
    if !params.has_selectors() {
        return plain_response(ctx.ipxe.bootstrap());
    }

    let selectors = params
        .selectors()
        .map_err(|e| HttpError::for_bad_request(None, e.to_string()))?;

    let rendered = ctx
        .ipxe
        .find_profile_and_render(&selectors)
        .await
        .map_err(ipxe_error_to_http)?;
    plain_response(rendered)
}

#[derive(Deserialize, JsonSchema)]
struct ContentPathParams {
    content_id: Uuid,
}

/// Serve one exposed content body.
#[endpoint {
    method = GET,
    path = "/content/{content_id}",
}]
async fn content_get_by_id(
    rqctx: RequestContext<ApiContext>,
    path: Path<ContentPathParams>,
    query: Query<BootParams>,
) -> Result<Response<Body>, HttpError> {
    let ctx = rqctx.context();
    let content_id = path.into_inner().content_id;

    let selectors = query
        .into_inner()
        .selectors()
        .map_err(|e| HttpError::for_bad_request(None, e.to_string()))?;

    let body = ctx
        .content
        .get_by_id(content_id, &selectors)
        .await
        .map_err(content_error_to_http)?;
    plain_response(body)
}

#[endpoint {
    method = GET,
    path = "/healthz",
}]
async fn healthz(
    _rqctx: RequestContext<()>,
) -> Result<HttpResponseOk<()>, HttpError> {
    Ok(HttpResponseOk(()))
}

#[endpoint {
    method = GET,
    path = "/readyz",
}]
async fn readyz(
    _rqctx: RequestContext<()>,
) -> Result<HttpResponseOk<()>, HttpError> {
    Ok(HttpResponseOk(()))
}

fn plain_response(body: Vec<u8>) -> Result<Response<Body>, HttpError> {
    Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::with_content(body))
        .map_err(|e| {
            HttpError::for_internal_error(format!(
                "building response: {e}"
            ))
        })
}

fn ipxe_error_to_http(err: IpxeError) -> HttpError {
    let message = InlineErrorChain::new(&err).to_string();
    match err {
        IpxeError::NoApplicableAssignment { .. } => {
            HttpError::for_not_found(None, message)
        }
        _ => HttpError::for_internal_error(message),
    }
}

fn content_error_to_http(err: ContentError) -> HttpError {
    let message = InlineErrorChain::new(&err).to_string();
    match err {
        ContentError::NilContentId => {
            HttpError::for_bad_request(None, message)
        }
        ContentError::NotFound(_) => HttpError::for_not_found(None, message),
        _ => HttpError::for_internal_error(message),
    }
}
