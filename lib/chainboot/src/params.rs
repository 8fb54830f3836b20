// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boot-firmware request parameters and the selector pair derived from
//! them.
//!
//! iPXE exposes its settings as query-string parameters when a script
//! chains back into the service. The full parameter set is decoded here so
//! it can be carried through the pipeline, but only `uuid` and `buildarch`
//! drive assignment selection.

use std::net::IpAddr;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Build architecture reported by the iPXE firmware.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
    strum::Display,
    strum::EnumString,
)]
pub enum Buildarch {
    #[serde(rename = "arm32")]
    #[strum(serialize = "arm32")]
    Arm32,
    #[serde(rename = "arm64")]
    #[strum(serialize = "arm64")]
    Arm64,
    #[serde(rename = "i386")]
    #[strum(serialize = "i386")]
    I386,
    #[serde(rename = "x86_64")]
    #[strum(serialize = "x86_64")]
    X8664,
}

/// A value transmitted as colon-separated groups of hex digits (MAC
/// addresses, certificate fingerprints, and the like). Groups are decoded
/// and concatenated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hexa(pub Vec<u8>);

#[derive(Debug, thiserror::Error)]
#[error("invalid hex group {0:?}")]
pub struct ParseHexaError(String);

impl FromStr for Hexa {
    type Err = ParseHexaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = Vec::with_capacity(s.len() / 2);
        for group in s.split(':') {
            let decoded = hex::decode(group)
                .map_err(|_| ParseHexaError(group.to_string()))?;
            out.extend(decoded);
        }
        Ok(Hexa(out))
    }
}

impl<'de> Deserialize<'de> for Hexa {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for Hexa {
    fn schema_name() -> String {
        "Hexa".to_string()
    }

    fn json_schema(
        gen: &mut schemars::gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

/// The boot parameters iPXE firmware may report. All parameters are
/// optional; unrecognised parameters are ignored by the deserializer.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct BootParams {
    pub mac: Option<Hexa>,
    pub bustype: Option<String>,
    pub busloc: Option<u32>,
    pub busid: Option<Hexa>,
    pub chip: Option<String>,
    pub ssid: Option<String>,
    pub active_scan: Option<i8>,
    pub key: Option<String>,

    // IPv4 settings
    pub ip: Option<IpAddr>,
    pub netmask: Option<IpAddr>,
    pub gateway: Option<IpAddr>,
    pub dns: Option<IpAddr>,
    pub domain: Option<String>,

    // Boot settings
    pub filename: Option<String>,
    pub next_server: Option<IpAddr>,
    pub root_path: Option<String>,
    pub san_filename: Option<String>,
    pub initiator_iqn: Option<String>,
    pub keep_san: Option<i8>,
    pub skip_san_boot: Option<i8>,

    // Host settings
    pub hostname: Option<String>,
    pub uuid: Option<Uuid>,
    pub user_class: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
    pub asset: Option<String>,

    // Authentication settings
    pub username: Option<String>,
    pub password: Option<String>,
    pub reverse_username: Option<String>,
    pub reverse_password: Option<String>,

    // Cryptography settings
    pub crosscert: Option<String>,
    pub trust: Option<Hexa>,
    pub cert: Option<Hexa>,
    pub privkey: Option<Hexa>,

    // Miscellaneous settings
    pub buildarch: Option<Buildarch>,
    pub cpumodel: Option<String>,
    pub cpuvendor: Option<String>,
    pub dhcp_server: Option<IpAddr>,
    pub keymap: Option<String>,
    pub memsize: Option<i32>,
    pub platform: Option<String>,
    pub priority: Option<i8>,
    pub scriptlet: Option<String>,
    pub syslog: Option<IpAddr>,
    pub syslogs: Option<String>,
    pub sysmac: Option<Hexa>,
    pub unixtime: Option<u32>,
    pub use_cached: Option<u8>,
    pub version: Option<String>,
    pub vram: Option<String>,
}

/// The parameter pair that drives assignment selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpxeSelectors {
    pub uuid: Uuid,
    pub buildarch: Buildarch,
}

#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("missing required boot parameter \"uuid\"")]
    MissingUuid,
    #[error("missing required boot parameter \"buildarch\"")]
    MissingBuildarch,
}

impl BootParams {
    /// Whether the request carries any selection parameter at all. A
    /// request with neither is a bootstrap request, not a malformed
    /// selection.
    pub fn has_selectors(&self) -> bool {
        self.uuid.is_some() || self.buildarch.is_some()
    }

    pub fn selectors(&self) -> Result<IpxeSelectors, SelectorError> {
        let uuid = self.uuid.ok_or(SelectorError::MissingUuid)?;
        let buildarch = self.buildarch.ok_or(SelectorError::MissingBuildarch)?;
        Ok(IpxeSelectors { uuid, buildarch })
    }
}
