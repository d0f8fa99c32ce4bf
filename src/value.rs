// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Identifiers, Inputs and Templates
//!
//! Literal values are plain `serde_json::Value`s. An [`Input`] is either such
//! a literal or something that only becomes a literal after another resource
//! has been provisioned: a reference to one of its outputs, a string template
//! interpolating several outputs, or a pure transform over one output.
//!
//! # Template syntax
//!
//! ```text
//! rediss://${atscale-redis-dev.hostName}:${atscale-redis-db-dev.port}/0
//!          └─ resource id ─┘ └output┘
//! ```
//!
//! A reference splits at the last `.`, so resource ids may contain dots and
//! output names may not.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{CompositionError, CompositionResult};

/// Output record of a provisioned resource
pub type OutputMap = BTreeMap<String, Value>;

const MAX_ID_LEN: usize = 128;

/// Unique resource identifier within a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Validate and wrap an identifier
    pub fn new(id: impl Into<String>) -> CompositionResult<Self> {
        let id = id.into();
        let invalid = |reason: &str| CompositionError::InvalidIdentifier {
            value: id.clone(),
            reason: reason.to_string(),
        };

        if id.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if id.len() > MAX_ID_LEN {
            return Err(invalid("longer than 128 characters"));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/')))
        {
            return Err(invalid(&format!("character '{}' is not allowed", c)));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reference to one of this resource's outputs
    pub fn output(&self, name: impl Into<String>) -> OutputRef {
        OutputRef {
            resource: self.clone(),
            output: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = CompositionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque dispatch key owned by the provisioner, e.g. `"redis-cache"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for TypeTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// Check an output attribute name
pub fn validate_output_name(name: &str) -> CompositionResult<()> {
    if name.is_empty() || name.contains(['.', '$', '{', '}']) {
        return Err(CompositionError::InvalidIdentifier {
            value: name.to_string(),
            reason: "output names must be non-empty and contain no '.', '$', '{' or '}'"
                .to_string(),
        });
    }
    Ok(())
}

/// Reference to a named output of another resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub resource: ResourceId,
    pub output: String,
}

impl OutputRef {
    pub fn new(resource: ResourceId, output: impl Into<String>) -> Self {
        Self {
            resource,
            output: output.into(),
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.output)
    }
}

/// Pure function applied to an upstream output at snapshot time
pub type Transform = Arc<dyn Fn(&Value) -> CompositionResult<Value> + Send + Sync>;

/// Input derived from one upstream output
#[derive(Clone)]
pub struct DerivedInput {
    pub source: OutputRef,
    transform: Transform,
}

impl DerivedInput {
    pub fn apply(&self, value: &Value) -> CompositionResult<Value> {
        (self.transform)(value)
    }
}

impl fmt::Debug for DerivedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedInput")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Input attribute of a resource
#[derive(Debug, Clone)]
pub enum Input {
    /// Known value
    Literal(Value),
    /// Known value that must never be logged or reported
    Secret(Value),
    /// Output of another resource
    Reference(OutputRef),
    /// String built from text and outputs of other resources
    Interpolate(Template),
    /// Transform of another resource's output
    Derived(DerivedInput),
}

impl Input {
    pub fn literal(value: impl Into<Value>) -> Self {
        Input::Literal(value.into())
    }

    pub fn secret(value: impl Into<Value>) -> Self {
        Input::Secret(value.into())
    }

    /// Parse an interpolation template
    pub fn template(source: &str) -> CompositionResult<Self> {
        Ok(Input::Interpolate(Template::parse(source)?))
    }

    pub fn derived<F>(source: OutputRef, transform: F) -> Self
    where
        F: Fn(&Value) -> CompositionResult<Value> + Send + Sync + 'static,
    {
        Input::Derived(DerivedInput {
            source,
            transform: Arc::new(transform),
        })
    }

    /// Every output this input depends on
    pub fn references(&self) -> Vec<&OutputRef> {
        match self {
            Input::Literal(_) | Input::Secret(_) => Vec::new(),
            Input::Reference(reference) => vec![reference],
            Input::Interpolate(template) => template.references().collect(),
            Input::Derived(derived) => vec![&derived.source],
        }
    }
}

impl From<OutputRef> for Input {
    fn from(reference: OutputRef) -> Self {
        Input::Reference(reference)
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Literal(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Literal(Value::String(value))
    }
}

/// Piece of an interpolation template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Ref(OutputRef),
}

/// String interpolation over resource outputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append literal text
    pub fn text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return self;
        }
        match self.segments.last_mut() {
            Some(Segment::Text(existing)) => existing.push_str(&text),
            _ => self.segments.push(Segment::Text(text)),
        }
        self
    }

    /// Append an output reference
    pub fn reference(mut self, reference: OutputRef) -> Self {
        self.segments.push(Segment::Ref(reference));
        self
    }

    /// Parse `${resource.output}` placeholders out of `source`
    pub fn parse(source: &str) -> CompositionResult<Self> {
        let malformed = |reason: &str| CompositionError::InvalidIdentifier {
            value: source.to_string(),
            reason: reason.to_string(),
        };

        let mut template = Template::new();
        let mut rest = source;
        while let Some(start) = rest.find("${") {
            template = template.text(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| malformed("unterminated '${' placeholder"))?;
            let placeholder = &after[..end];
            let (resource, output) = placeholder
                .rsplit_once('.')
                .ok_or_else(|| malformed("placeholder must be '${resource.output}'"))?;
            validate_output_name(output)?;
            template = template.reference(OutputRef::new(ResourceId::new(resource)?, output));
            rest = &after[end + 1..];
        }
        Ok(template.text(rest))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn references(&self) -> impl Iterator<Item = &OutputRef> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Ref(reference) => Some(reference),
            Segment::Text(_) => None,
        })
    }

    /// Render with `lookup` supplying each referenced value
    pub fn render<F>(&self, mut lookup: F) -> CompositionResult<String>
    where
        F: FnMut(&OutputRef) -> CompositionResult<Value>,
    {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Ref(reference) => match lookup(reference)? {
                    Value::String(s) => rendered.push_str(&s),
                    other => rendered.push_str(&other.to_string()),
                },
            }
        }
        Ok(rendered)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => f.write_str(text)?,
                Segment::Ref(reference) => write!(f, "${{{}}}", reference)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("atscale-redis-dev" ; "kebab case")]
    #[test_case("network/app-subnet" ; "path style")]
    #[test_case("k8s:secret.engine_redis" ; "mixed separators")]
    fn test_valid_resource_ids(id: &str) {
        assert_eq!(ResourceId::new(id).unwrap().as_str(), id);
    }

    #[test_case("" ; "empty")]
    #[test_case("has space" ; "whitespace")]
    #[test_case("${x}" ; "template characters")]
    fn test_invalid_resource_ids(id: &str) {
        assert!(matches!(
            ResourceId::new(id),
            Err(CompositionError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_resource_id_length_limit() {
        assert!(ResourceId::new("a".repeat(128)).is_ok());
        assert!(ResourceId::new("a".repeat(129)).is_err());
    }

    #[test]
    fn test_parse_template_with_dotted_resource_id() {
        let template = Template::parse("https://${web.app.defaultHostName}/health").unwrap();
        let refs: Vec<_> = template.references().collect();

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].resource.as_str(), "web.app");
        assert_eq!(refs[0].output, "defaultHostName");
        assert_eq!(template.to_string(), "https://${web.app.defaultHostName}/health");
    }

    #[test_case("rediss://${cache" ; "unterminated")]
    #[test_case("${cache}" ; "missing output")]
    #[test_case("${bad id.host}" ; "invalid resource id")]
    fn test_parse_template_errors(source: &str) {
        assert!(Template::parse(source).is_err());
    }

    #[test]
    fn test_render_formats_non_strings_as_json() {
        let template = Template::parse("rediss://${cache.hostName}:${cache.port}/0").unwrap();
        let rendered = template
            .render(|reference| match reference.output.as_str() {
                "hostName" => Ok(json!("cache.redis.net")),
                _ => Ok(json!(10000)),
            })
            .unwrap();
        assert_eq!(rendered, "rediss://cache.redis.net:10000/0");
    }

    #[test]
    fn test_template_without_placeholders_is_text() {
        let template = Template::parse("plain").unwrap();
        assert_eq!(template.segments(), &[Segment::Text("plain".into())]);
    }

    #[test]
    fn test_input_references() {
        let cache = ResourceId::new("cache").unwrap();
        let derived = Input::derived(cache.output("id"), |v| Ok(v.clone()));
        let template = Input::template("${cache.host}:${db.port}").unwrap();

        assert_eq!(derived.references().len(), 1);
        assert_eq!(template.references().len(), 2);
        assert!(Input::secret("p@ss").references().is_empty());
    }

    #[test]
    fn test_resource_id_deserialization_validates() {
        let parsed: Result<ResourceId, _> = serde_json::from_value(json!("ok-id"));
        assert!(parsed.is_ok());
        let parsed: Result<ResourceId, _> = serde_json::from_value(json!("not ok"));
        assert!(parsed.is_err());
    }
}
