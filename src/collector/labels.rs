//! User-defined extra labels.
//!
//! Each label is a small template compiled once at startup. Literal text is
//! copied through and every `{{ ... }}` action is a field path evaluated
//! against two documents:
//!
//! - `.Container` - the inventory summary (`Id`, `Names`, `Image`, `Labels`, ...)
//! - `.ContainerJSON` - the full inspection payload (`Config`, `State`, ...)
//!
//! Path segments are `.Name` (identifier or array index) or `["key"]` for
//! keys containing dots, e.g.
//! `{{ .Container.Labels["com.docker.compose.project"] }}`. `.ID` is read as
//! `.Id`. A key missing from the innermost map renders as an empty string;
//! any other missing field is an evaluation error.

use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

use crate::config::LabelDefinition;
use crate::runtime::ContainerRecord;

/// Label names every container sample carries before the extra labels.
pub const BASE_LABELS: [&str; 2] = ["name", "state"];

/// Configuration-time template errors; fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("invalid label name '{0}'")]
    InvalidName(String),

    #[error("label name '{0}' is reserved")]
    ReservedName(String),

    #[error("label '{0}' is defined more than once")]
    Duplicate(String),

    #[error("template for label '{label}': {reason} at byte {offset}")]
    Parse {
        label: String,
        reason: &'static str,
        offset: usize,
    },
}

/// Per-container evaluation errors; only that container's samples are dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("label '{label}': field {path} not found")]
    MissingField { label: String, path: String },

    #[error("label '{label}': field {path} is not a scalar value")]
    NotScalar { label: String, path: String },
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field { keys: Vec<String>, source: String },
}

/// One compiled label definition.
#[derive(Debug, Clone)]
pub struct LabelTemplate {
    name: String,
    segments: Vec<Segment>,
}

impl LabelTemplate {
    pub fn compile(name: &str, template: &str) -> Result<Self, TemplateError> {
        validate_label_name(name)?;
        let segments = parse_template(name, template)?;
        Ok(Self {
            name: name.to_string(),
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the label value for one container.
    pub fn render(&self, container: &Value, inspection: &Value) -> Result<String, LabelError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { keys, source } => {
                    let value = lookup(container, inspection, keys).ok_or_else(|| {
                        LabelError::MissingField {
                            label: self.name.clone(),
                            path: source.clone(),
                        }
                    })?;
                    match value {
                        Value::String(s) => out.push_str(s),
                        Value::Number(n) => out.push_str(&n.to_string()),
                        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
                        Value::Null => {}
                        Value::Array(_) | Value::Object(_) => {
                            return Err(LabelError::NotScalar {
                                label: self.name.clone(),
                                path: source.clone(),
                            })
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

/// The set of compiled label templates, shared read-only by every task.
#[derive(Debug, Clone, Default)]
pub struct LabelResolver {
    templates: Vec<LabelTemplate>,
}

impl LabelResolver {
    pub fn compile(definitions: &[LabelDefinition]) -> Result<Self, TemplateError> {
        let mut seen = HashSet::new();
        let mut templates = Vec::with_capacity(definitions.len());

        for def in definitions {
            if !seen.insert(def.name.as_str()) {
                return Err(TemplateError::Duplicate(def.name.clone()));
            }
            templates.push(LabelTemplate::compile(&def.name, &def.template)?);
        }

        Ok(Self { templates })
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Base labels followed by the extra label names, in definition order.
    pub fn label_names(&self) -> Vec<String> {
        BASE_LABELS
            .iter()
            .map(|s| s.to_string())
            .chain(self.templates.iter().map(|t| t.name.clone()))
            .collect()
    }

    /// Evaluates every template for one container.
    pub fn resolve(
        &self,
        record: &ContainerRecord,
        inspection: &Value,
    ) -> Result<Vec<String>, LabelError> {
        self.templates
            .iter()
            .map(|t| t.render(&record.summary, inspection))
            .collect()
    }
}

fn validate_label_name(name: &str) -> Result<(), TemplateError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if !valid {
        return Err(TemplateError::InvalidName(name.to_string()));
    }
    if name.starts_with("__") || BASE_LABELS.contains(&name) {
        return Err(TemplateError::ReservedName(name.to_string()));
    }
    Ok(())
}

fn parse_template(label: &str, template: &str) -> Result<Vec<Segment>, TemplateError> {
    let parse_err = |reason: &'static str, offset: usize| TemplateError::Parse {
        label: label.to_string(),
        reason,
        offset,
    };

    let mut segments = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| parse_err("unclosed action", offset + start))?;
        let action = after[..end].trim();
        let keys = parse_path(action).map_err(|reason| parse_err(reason, offset + start))?;
        segments.push(Segment::Field {
            keys,
            source: action.to_string(),
        });

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

fn parse_path(action: &str) -> Result<Vec<String>, &'static str> {
    if action.is_empty() {
        return Err("empty action");
    }
    if !action.starts_with('.') {
        return Err("action must be a field path starting with '.'");
    }

    let bytes = action.as_bytes();
    let mut keys = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                i += 1;
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'-')
                {
                    i += 1;
                }
                if start == i {
                    return Err("empty field name");
                }
                // The engine's JSON spells the identifier `Id`.
                match &action[start..i] {
                    "ID" => keys.push("Id".to_string()),
                    field => keys.push(field.to_string()),
                }
            }
            b'[' => {
                i += 1;
                if bytes.get(i) != Some(&b'"') {
                    return Err("expected '\"' after '['");
                }
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err("unterminated key");
                }
                keys.push(action[start..i].to_string());
                i += 1;
                if bytes.get(i) != Some(&b']') {
                    return Err("expected ']'");
                }
                i += 1;
            }
            _ => return Err("unexpected character in field path"),
        }
    }

    Ok(keys)
}

/// Stands in for a key absent from the innermost map.
static MISSING_KEY: Value = Value::Null;

/// Resolves a field path. A key missing from the last map on the path (such
/// as an unset container label) resolves to null and renders empty; a
/// missing root or intermediate field is `None`.
fn lookup<'a>(container: &'a Value, inspection: &'a Value, keys: &[String]) -> Option<&'a Value> {
    let (root, rest) = keys.split_first()?;
    let mut value = match root.as_str() {
        "Container" => container,
        "ContainerJSON" => inspection,
        _ => return None,
    };

    for (i, key) in rest.iter().enumerate() {
        let last = i + 1 == rest.len();
        value = match value {
            Value::Object(map) => match map.get(key) {
                Some(v) => v,
                None if last => &MISSING_KEY,
                None => return None,
            },
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}
