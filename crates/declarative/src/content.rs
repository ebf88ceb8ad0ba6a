//! Content processors and text encodings
//!
//! `text` content is passed through verbatim, `jinja2` content is rendered
//! as a template (through minijinja), `binary` content is an asset file
//! copied byte for byte.

use crate::error::{Error, Result};
use encoding_rs::Encoding;
use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// How the content of a file item is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentType {
    /// Literal content, no substitution
    #[default]
    #[serde(rename = "text")]
    Text,
    /// Template rendered with the node/bundle context
    ///
    /// The syntax is Jinja (`{{ node.name }}`, `{% if %}`) for both the
    /// `jinja2` tag and its `mako` alias. Mako expressions such as
    /// `${node.name}` are not substitutions and end up in the file as
    /// literal text.
    #[serde(rename = "jinja2", alias = "mako")]
    Template,
    /// Asset file copied verbatim
    #[serde(rename = "binary")]
    Binary,
}

/// Values visible to a template
pub struct TemplateContext<'a> {
    pub node_name: &'a str,
    pub bundle_name: &'a str,
    /// Bundle-level variables (node metadata)
    pub variables: &'a Map<String, Value>,
    /// User-supplied `context` attribute; wins over bundle variables
    pub context: &'a Map<String, Value>,
}

impl TemplateContext<'_> {
    fn to_value(&self) -> Value {
        let mut root = self.variables.clone();
        root.insert(
            "node".into(),
            json!({ "name": self.node_name, "metadata": self.variables }),
        );
        root.insert("bundle".into(), json!({ "name": self.bundle_name }));
        for (key, value) in self.context {
            root.insert(key.clone(), value.clone());
        }
        Value::Object(root)
    }
}

/// Return text content unmodified
pub fn process_text(content: &str) -> &str {
    content
}

/// Render template content
///
/// Undefined names are errors. Render errors are returned as-is so a
/// validation pass reports the template engine's own message.
pub fn render_template(source: &str, ctx: &TemplateContext<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    Ok(env.render_str(source, ctx.to_value())?)
}

fn is_ascii_label(label: &str) -> bool {
    matches!(
        label.trim().to_ascii_lowercase().as_str(),
        "ascii" | "us-ascii"
    )
}

/// Look up an encoding by label, also accepting labels like "latin-1"
fn lookup(label: &str) -> Option<&'static Encoding> {
    let label = label.trim().to_ascii_lowercase();
    Encoding::for_label(label.as_bytes()).or_else(|| {
        let compact: String = label.chars().filter(|c| !matches!(c, '-' | '_')).collect();
        Encoding::for_label(compact.as_bytes())
    })
}

/// Whether an encoding label is known
pub fn is_known_encoding(label: &str) -> bool {
    is_ascii_label(label) || lookup(label).is_some()
}

/// Encode text with the named encoding, failing on unmappable characters
pub fn encode(item_id: &str, text: &str, label: &str) -> Result<Vec<u8>> {
    let encoding_error = || Error::Encoding {
        item: item_id.to_string(),
        encoding: label.to_string(),
    };

    if is_ascii_label(label) {
        return if text.is_ascii() {
            Ok(text.as_bytes().to_vec())
        } else {
            Err(encoding_error())
        };
    }

    let encoding = lookup(label).ok_or_else(encoding_error)?;
    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors {
        return Err(encoding_error());
    }
    Ok(bytes.into_owned())
}

/// Decode bytes with the named encoding, `None` if they are not valid in it
pub fn decode_strict(bytes: &[u8], label: &str) -> Option<String> {
    if is_ascii_label(label) {
        return bytes
            .is_ascii()
            .then(|| String::from_utf8_lossy(bytes).into_owned());
    }
    let encoding = lookup(label)?;
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}
