// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Describes the server config, parsed from a TOML file named by the
//! `CHAINBOOT_CONFIG` environment variable (or a command-line flag).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "CHAINBOOT_CONFIG";

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Externally-reachable base URL of this service, used when exposed
    /// content is substituted with `/content/{id}` URLs.
    pub base_url: String,

    /// Force TLS verification on outbound webhook calls, overriding any
    /// per-content `tlsInsecureSkipVerify` flag.
    #[serde(default)]
    pub force_tls_verify: bool,

    pub store: StoreConfig,
    pub api_server: ServerConfig,
    pub probes_server: ServerConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Root of the control-plane record tree.
    pub path: PathBuf,
    #[serde(default = "default_namespace")]
    pub assignment_namespace: String,
    #[serde(default = "default_namespace")]
    pub profile_namespace: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {path:?}"))?;
        toml::from_str(&contents)
            .with_context(|| format!("parsing config file {path:?}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let config: Config = toml::from_str(
            r#"
base_url = "https://boot.example.com"
force_tls_verify = true

[store]
path = "/var/lib/chainboot/store"
assignment_namespace = "machines"
profile_namespace = "machines"

[api_server]
bind_address = "[::]:8080"

[probes_server]
bind_address = "[::]:8081"
"#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://boot.example.com");
        assert!(config.force_tls_verify);
        assert_eq!(config.store.assignment_namespace, "machines");
        assert_eq!(config.api_server.bind_address.port(), 8080);
    }

    #[test]
    fn namespaces_default() {
        let config: Config = toml::from_str(
            r#"
base_url = "https://boot.example.com"

[store]
path = "/srv/store"

[api_server]
bind_address = "127.0.0.1:8080"

[probes_server]
bind_address = "127.0.0.1:8081"
"#,
        )
        .unwrap();
        assert_eq!(config.store.assignment_namespace, "default");
        assert_eq!(config.store.profile_namespace, "default");
        assert!(!config.force_tls_verify);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = toml::from_str::<Config>(
            r#"
base_url = "https://boot.example.com"
metrics_port = 9000

[store]
path = "/srv/store"

[api_server]
bind_address = "127.0.0.1:8080"

[probes_server]
bind_address = "127.0.0.1:8081"
"#,
        );
        assert!(err.is_err());
    }
}
