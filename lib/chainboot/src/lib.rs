// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core profile-resolution and content-rendering pipeline for the
//! chainboot boot-orchestration service.
//!
//! Machines chain-load into the service over iPXE. The service first hands
//! out a fixed bootstrap script that re-invokes it carrying firmware-known
//! attributes, then selects an [`assignment::Assignment`] for the client,
//! loads the assigned [`profile::Profile`], resolves and transforms the
//! profile's additional content through the [`mux::ResolveTransformMux`],
//! and renders the profile's iPXE template. Exposed content entries are
//! substituted with stable `/content/{id}` URLs during rendering and
//! resolved lazily when the booting machine fetches them.
//!
//! The HTTP edge lives in the `chainboot-server` binary; everything here is
//! transport-agnostic and driven per request, with no in-process mutation
//! of control-plane state.

pub mod assignment;
pub mod content;
pub mod ipxe;
pub mod mux;
pub mod params;
pub mod profile;
pub mod records;
pub mod resolve;
pub mod store;
pub mod template;
pub mod transform;
mod webhook;
