// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Translation of Butane configurations into Ignition JSON.
//!
//! A Butane document is YAML carrying `variant` and `version` keys that
//! select the Ignition specification it targets. Translation strips those
//! keys, renames the remaining snake_case keys to Ignition's camelCase,
//! rewrites inline file contents into `data:` URLs, and emits a compact
//! JSON document whose first section is `ignition` (carrying the target
//! spec version).
//!
//! Translation is deterministic: the same input bytes always produce the
//! same output bytes. Section order follows the input document.

use base64::Engine;
use serde_json::{Map, Value as Json};
use serde_yaml::Value as Yaml;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("parsing YAML input")]
    Parse(#[source] serde_yaml::Error),

    #[error("input is not a YAML mapping")]
    NotAMapping,

    #[error("no variant specified")]
    NoVariant,

    #[error("no version specified")]
    NoVersion,

    #[error("unknown variant {0:?}")]
    UnknownVariant(String),

    #[error("unsupported version {version:?} for variant {variant:?}")]
    UnsupportedVersion { variant: String, version: String },

    #[error("unsupported node at {0}")]
    UnsupportedNode(String),

    #[error("local file references are not supported at {0}")]
    LocalFilesUnsupported(String),

    #[error("serializing Ignition output")]
    Serialize(#[source] serde_json::Error),
}

/// Translate a Butane document into Ignition JSON bytes.
pub fn translate(input: &[u8]) -> Result<Vec<u8>, TranslateError> {
    let doc: Yaml =
        serde_yaml::from_slice(input).map_err(TranslateError::Parse)?;
    let Yaml::Mapping(mapping) = doc else {
        return Err(TranslateError::NotAMapping);
    };

    let mut variant = None;
    let mut version = None;
    let mut ignition_section = None;
    let mut sections = Vec::new();

    for (key, value) in mapping {
        let Yaml::String(key) = key else {
            return Err(TranslateError::UnsupportedNode("$".to_string()));
        };
        match key.as_str() {
            "variant" => variant = yaml_string(value),
            "version" => version = yaml_string(value),
            "ignition" => ignition_section = Some(value),
            _ => sections.push((key, value)),
        }
    }

    let variant = variant.ok_or(TranslateError::NoVariant)?;
    let version = version.ok_or(TranslateError::NoVersion)?;
    let spec_version = ignition_version(&variant, &version)?;

    // The `ignition` section leads the output document, carrying the
    // target spec version ahead of any translated ignition.* settings.
    let mut ignition = Map::new();
    ignition
        .insert("version".to_string(), Json::String(spec_version.to_string()));
    if let Some(section) = ignition_section {
        match convert(section, "ignition")? {
            Json::Object(rest) => ignition.extend(rest),
            _ => {
                return Err(TranslateError::UnsupportedNode(
                    "ignition".to_string(),
                ))
            }
        }
    }

    let mut out = Map::new();
    out.insert("ignition".to_string(), Json::Object(ignition));
    for (key, value) in sections {
        let path = key.clone();
        out.insert(camel_case(&key), convert(value, &path)?);
    }

    serde_json::to_vec(&Json::Object(out)).map_err(TranslateError::Serialize)
}

/// The Ignition spec version targeted by a (variant, version) pair.
fn ignition_version(
    variant: &str,
    version: &str,
) -> Result<&'static str, TranslateError> {
    if variant != "fcos" {
        return Err(TranslateError::UnknownVariant(variant.to_string()));
    }
    match version {
        "1.0.0" => Ok("3.0.0"),
        "1.1.0" => Ok("3.1.0"),
        "1.2.0" => Ok("3.2.0"),
        "1.3.0" => Ok("3.2.0"),
        "1.4.0" => Ok("3.3.0"),
        "1.5.0" => Ok("3.4.0"),
        "1.6.0" => Ok("3.5.0"),
        _ => Err(TranslateError::UnsupportedVersion {
            variant: variant.to_string(),
            version: version.to_string(),
        }),
    }
}

/// Convert a YAML node into its Ignition JSON form, renaming mapping keys
/// and rewriting `contents`-style nodes. `path` is a dotted location used
/// in error messages.
fn convert(value: Yaml, path: &str) -> Result<Json, TranslateError> {
    match value {
        Yaml::Null => Ok(Json::Null),
        Yaml::Bool(b) => Ok(Json::Bool(b)),
        Yaml::Number(n) => {
            let n = if let Some(i) = n.as_i64() {
                serde_json::Number::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Number::from(u)
            } else {
                n.as_f64().and_then(serde_json::Number::from_f64).ok_or_else(
                    || TranslateError::UnsupportedNode(path.to_string()),
                )?
            };
            Ok(Json::Number(n))
        }
        Yaml::String(s) => Ok(Json::String(s)),
        Yaml::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for (i, item) in seq.into_iter().enumerate() {
                out.push(convert(item, &format!("{path}[{i}]"))?);
            }
            Ok(Json::Array(out))
        }
        Yaml::Mapping(mapping) => {
            let mut out = Map::new();
            for (key, value) in mapping {
                let Yaml::String(key) = key else {
                    return Err(TranslateError::UnsupportedNode(
                        path.to_string(),
                    ));
                };
                let child_path = format!("{path}.{key}");
                if key == "contents" || key == "append" {
                    out.insert(
                        camel_case(&key),
                        convert_contents(value, &child_path)?,
                    );
                } else {
                    out.insert(
                        camel_case(&key),
                        convert(value, &child_path)?,
                    );
                }
            }
            Ok(Json::Object(out))
        }
        Yaml::Tagged(_) => Err(TranslateError::UnsupportedNode(path.to_string())),
    }
}

/// File contents nodes get their `inline` sugar rewritten into a `data:`
/// URL `source`. `append` is a list of such nodes.
fn convert_contents(value: Yaml, path: &str) -> Result<Json, TranslateError> {
    match value {
        Yaml::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for (i, item) in seq.into_iter().enumerate() {
                out.push(convert_contents(item, &format!("{path}[{i}]"))?);
            }
            Ok(Json::Array(out))
        }
        Yaml::Mapping(mapping) => {
            let mut out = Map::new();
            for (key, value) in mapping {
                let Yaml::String(key) = key else {
                    return Err(TranslateError::UnsupportedNode(
                        path.to_string(),
                    ));
                };
                let child_path = format!("{path}.{key}");
                match key.as_str() {
                    "inline" => {
                        let Yaml::String(s) = value else {
                            return Err(TranslateError::UnsupportedNode(
                                child_path,
                            ));
                        };
                        out.insert(
                            "source".to_string(),
                            Json::String(data_url(s.as_bytes())),
                        );
                    }
                    "local" => {
                        return Err(TranslateError::LocalFilesUnsupported(
                            child_path,
                        ));
                    }
                    _ => {
                        out.insert(
                            camel_case(&key),
                            convert(value, &child_path)?,
                        );
                    }
                }
            }
            Ok(Json::Object(out))
        }
        other => convert(other, path),
    }
}

fn data_url(contents: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(contents);
    format!("data:;base64,{encoded}")
}

fn yaml_string(value: Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s),
        _ => None,
    }
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
