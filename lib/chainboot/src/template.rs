// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rendering of iPXE profile templates.
//!
//! Profile templates substitute resolved content with `{{ .name }}`
//! placeholders. The grammar is fixed by the records already deployed in
//! the field, so this is a purpose-built scanner for exactly that form
//! rather than a general template engine. Anything outside a placeholder
//! passes through untouched; content bytes are inserted as-is.

use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder at byte offset {0}")]
    Unterminated(usize),

    #[error("malformed placeholder {0:?}")]
    Malformed(String),

    #[error("template references unknown content {0:?}")]
    MissingKey(String),
}

/// Render `template`, replacing each `{{ .name }}` placeholder with the
/// bytes mapped under `name`.
pub fn render(
    template: &str,
    data: &HashMap<String, Vec<u8>>,
) -> Result<Vec<u8>, TemplateError> {
    let mut out = Vec::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        out.extend_from_slice(rest[..start].as_bytes());

        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(TemplateError::Unterminated(offset + start));
        };

        let placeholder = &after_open[..end];
        let key = parse_placeholder(placeholder)?;
        let value = data
            .get(key)
            .ok_or_else(|| TemplateError::MissingKey(key.to_string()))?;
        out.extend_from_slice(value);

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }

    out.extend_from_slice(rest.as_bytes());
    Ok(out)
}

/// A placeholder body is `.name` with optional surrounding whitespace,
/// where `name` is made of alphanumerics, `_` and `-`.
fn parse_placeholder(body: &str) -> Result<&str, TemplateError> {
    let trimmed = body.trim();
    let key = trimmed
        .strip_prefix('.')
        .ok_or_else(|| TemplateError::Malformed(body.to_string()))?;
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(TemplateError::Malformed(body.to_string()));
    }
    Ok(key)
}

#[cfg(test)]
mod test {
    use super::*;

    fn data(entries: &[(&str, &str)]) -> HashMap<String, Vec<u8>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn substitutes_placeholders() {
        let rendered = render(
            "kernel {{ .greet }} initrd={{.initrd}}",
            &data(&[("greet", "hi"), ("initrd", "initramfs.img")]),
        )
        .unwrap();
        assert_eq!(rendered, b"kernel hi initrd=initramfs.img");
    }

    #[test]
    fn empty_template_and_empty_data_render() {
        assert_eq!(render("", &HashMap::new()).unwrap(), b"");
        assert_eq!(
            render("#!ipxe\nboot\n", &HashMap::new()).unwrap(),
            b"#!ipxe\nboot\n"
        );
    }

    #[test]
    fn missing_key_is_an_error() {
        let err = render("{{ .ghost }}", &HashMap::new());
        assert_eq!(err, Err(TemplateError::MissingKey("ghost".to_string())));
    }

    #[test]
    fn unterminated_placeholder_is_an_error() {
        let err = render("boot {{ .cfg", &data(&[("cfg", "x")]));
        assert_eq!(err, Err(TemplateError::Unterminated(5)));
    }

    #[test]
    fn placeholder_must_dereference_a_name() {
        assert!(matches!(
            render("{{ cfg }}", &data(&[("cfg", "x")])),
            Err(TemplateError::Malformed(_))
        ));
        assert!(matches!(
            render("{{ . }}", &data(&[("cfg", "x")])),
            Err(TemplateError::Malformed(_))
        ));
        assert!(matches!(
            render("{{ .a b }}", &data(&[("a", "x")])),
            Err(TemplateError::Malformed(_))
        ));
    }

    #[test]
    fn literal_braces_outside_placeholders_pass_through() {
        let rendered =
            render("echo }} {{ .x }} {", &data(&[("x", "ok")])).unwrap();
        assert_eq!(rendered, b"echo }} ok {");
    }

    #[test]
    fn value_bytes_are_inserted_verbatim() {
        let mut map = HashMap::new();
        map.insert("blob".to_string(), vec![0xff, 0x00, 0x7f]);
        let rendered = render("x{{ .blob }}y", &map).unwrap();
        assert_eq!(rendered, vec![b'x', 0xff, 0x00, 0x7f, b'y']);
    }
}
