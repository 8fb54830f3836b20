// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound-HTTPS plumbing shared by the webhook resolver and the webhook
//! transformer: per-request client construction from referenced mTLS
//! material, and basic-auth credential extraction.
//!
//! Credentials are pulled through the object-ref resolver's
//! [`crate::resolve::ObjectRefResolver::resolve_paths`] capability, one
//! control-plane read per credential reference. Nothing is cached across
//! requests.

use crate::profile::{BasicAuthObjectRef, MtlsObjectRef};
use crate::resolve::{ObjectRefResolver, ResolveError};

/// Webhook URLs are configured without a scheme; calls are always HTTPS.
pub(crate) fn url(configured: &str) -> String {
    match configured.strip_prefix("https://") {
        Some(rest) => format!("https://{rest}"),
        None => format!("https://{configured}"),
    }
}

/// Build the HTTP client for one webhook call. With an mTLS reference the
/// client carries the referenced identity and trusts the referenced CA
/// bundle; `force_tls_verify` overrides the per-content insecure flag.
pub(crate) async fn client(
    objects: &ObjectRefResolver,
    mtls: Option<&MtlsObjectRef>,
    force_tls_verify: bool,
) -> Result<reqwest::Client, ResolveError> {
    let mut builder = reqwest::Client::builder().use_rustls_tls();

    if let Some(mtls) = mtls {
        let paths = [
            &mtls.client_key_path,
            &mtls.client_cert_path,
            &mtls.ca_bundle_path,
        ];
        let mut buffers = objects.resolve_paths(&paths, &mtls.key).await?;
        if buffers.len() != 3 {
            return Err(ResolveError::Config(format!(
                "mTLS reference {} resolved {} fields, expected 3",
                mtls.key,
                buffers.len()
            )));
        }
        let ca_bundle = buffers.pop().unwrap();
        let client_cert = buffers.pop().unwrap();
        let client_key = buffers.pop().unwrap();

        let mut identity_pem = client_cert;
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(&client_key);
        let identity = reqwest::Identity::from_pem(&identity_pem)
            .map_err(ResolveError::Tls)?;
        builder = builder.identity(identity);

        for cert in reqwest::Certificate::from_pem_bundle(&ca_bundle)
            .map_err(ResolveError::Tls)?
        {
            builder = builder.add_root_certificate(cert);
        }

        if mtls.tls_insecure_skip_verify && !force_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder.build().map_err(ResolveError::Tls)
}

/// Resolve the (username, password) pair named by a basic-auth reference.
pub(crate) async fn basic_auth(
    objects: &ObjectRefResolver,
    basic_auth: Option<&BasicAuthObjectRef>,
) -> Result<Option<(String, String)>, ResolveError> {
    let Some(basic_auth) = basic_auth else {
        return Ok(None);
    };

    let paths = [&basic_auth.username_path, &basic_auth.password_path];
    let mut buffers = objects.resolve_paths(&paths, &basic_auth.key).await?;
    if buffers.len() != 2 {
        return Err(ResolveError::Config(format!(
            "basic-auth reference {} resolved {} fields, expected 2",
            basic_auth.key,
            buffers.len()
        )));
    }
    let password = into_utf8(buffers.pop().unwrap(), "password")?;
    let username = into_utf8(buffers.pop().unwrap(), "username")?;
    Ok(Some((username, password)))
}

fn into_utf8(bytes: Vec<u8>, what: &str) -> Result<String, ResolveError> {
    String::from_utf8(bytes).map_err(|_| {
        ResolveError::Config(format!("{what} is not valid UTF-8"))
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn urls_gain_exactly_one_https_scheme() {
        assert_eq!(url("hooks.example.com/boot"), "https://hooks.example.com/boot");
        assert_eq!(
            url("https://hooks.example.com/boot"),
            "https://hooks.example.com/boot"
        );
    }
}
