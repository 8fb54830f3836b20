// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The iPXE controller: assignment selection, profile rendering, and the
//! fixed bootstrap script.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use slog::{debug, o, Logger};
use uuid::Uuid;

use crate::mux::{BatchOptions, MuxError, ResolveTransformMux};
use crate::params::{Buildarch, IpxeSelectors};
use crate::store::{AssignmentStore, ProfileStore, StoreError};
use crate::template::{self, TemplateError};

/// The parameters the bootstrap script tells the firmware to report back,
/// with their iPXE expansion type modifiers. Order is fixed so the script
/// is byte-identical across calls.
const BOOTSTRAP_PARAMS: &[(&str, Option<&str>)] =
    &[("uuid", None), ("buildarch", Some("uristring"))];

#[derive(Debug, thiserror::Error)]
pub enum IpxeError {
    #[error(
        "no assignment matches uuid={uuid} buildarch={buildarch} and no \
         default assignment exists for the architecture"
    )]
    NoApplicableAssignment {
        uuid: Uuid,
        buildarch: Buildarch,
        #[source]
        source: StoreError,
    },

    #[error("selecting assignment")]
    SelectAssignment(#[source] StoreError),

    #[error("loading profile {name:?}")]
    LoadProfile {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("resolving profile content")]
    Content(#[from] MuxError),

    #[error("rendering ipxe template")]
    Template(#[from] TemplateError),
}

pub struct IpxeController {
    assignments: Arc<dyn AssignmentStore>,
    profiles: Arc<dyn ProfileStore>,
    mux: Arc<ResolveTransformMux>,
    bootstrap: OnceLock<Vec<u8>>,
    log: Logger,
}

impl IpxeController {
    pub fn new(
        assignments: Arc<dyn AssignmentStore>,
        profiles: Arc<dyn ProfileStore>,
        mux: Arc<ResolveTransformMux>,
        log: &Logger,
    ) -> Self {
        IpxeController {
            assignments,
            profiles,
            mux,
            bootstrap: OnceLock::new(),
            log: log.new(o!("component" => "ipxe-controller")),
        }
    }

    /// The fixed bootstrap script: chain back into the service carrying
    /// the firmware-known parameters. Built on first use, then served
    /// from the published snapshot; byte-identical across calls.
    pub fn bootstrap(&self) -> Vec<u8> {
        self.bootstrap
            .get_or_init(|| {
                let params = BOOTSTRAP_PARAMS
                    .iter()
                    .map(|(name, modifier)| match modifier {
                        None => format!("{name}=${{{name}}}"),
                        Some(m) => format!("{name}=${{{name}:{m}}}"),
                    })
                    .collect::<Vec<_>>()
                    .join("&");
                format!("#!ipxe\nchain ipxe?{params}\n").into_bytes()
            })
            .clone()
    }

    /// Select the assignment for `selectors` (falling back to the
    /// buildarch default), load its profile, resolve the profile's
    /// content with exposed entries substituted by URL, and render the
    /// iPXE template.
    pub async fn find_profile_and_render(
        &self,
        selectors: &IpxeSelectors,
    ) -> Result<Vec<u8>, IpxeError> {
        let assignment =
            match self.assignments.find_by_selectors(selectors).await {
                Ok(assignment) => assignment,
                Err(StoreError::AssignmentNotFound) => {
                    debug!(
                        self.log,
                        "no direct assignment; falling back to default";
                        "uuid" => %selectors.uuid,
                        "buildarch" => %selectors.buildarch
                    );
                    self.assignments
                        .find_default_by_buildarch(selectors.buildarch)
                        .await
                        .map_err(|source| match source {
                            StoreError::AssignmentNotFound => {
                                IpxeError::NoApplicableAssignment {
                                    uuid: selectors.uuid,
                                    buildarch: selectors.buildarch,
                                    source,
                                }
                            }
                            other => IpxeError::SelectAssignment(other),
                        })?
                }
                Err(source) => {
                    return Err(IpxeError::SelectAssignment(source))
                }
            };

        let profile = self
            .profiles
            .get(&assignment.profile_name)
            .await
            .map_err(|source| IpxeError::LoadProfile {
                name: assignment.profile_name.clone(),
                source,
            })?;

        let data: HashMap<String, Vec<u8>> = self
            .mux
            .resolve_and_transform_batch(
                &profile.additional_content,
                selectors,
                BatchOptions { return_exposed_content_url: true },
            )
            .await?;

        Ok(template::render(&profile.ipxe_template, &data)?)
    }
}
