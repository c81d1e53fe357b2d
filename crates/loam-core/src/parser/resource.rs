//! Resource node parsing

use crate::error::{Result, StackError};
use crate::model::{Properties, ResourceDeclaration, ResourceKind};
use kdl::{KdlNode, KdlValue};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{var:([A-Za-z0-9_-]+)\}").unwrap())
}

/// Expand `${var:KEY}` substitutions in a string value
fn expand_variables(s: &str, variables: &HashMap<String, String>) -> Result<String> {
    let re = variable_re();
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for capture in re.captures_iter(s) {
        let whole = capture.get(0).unwrap();
        let key = &capture[1];
        let value = variables
            .get(key)
            .ok_or_else(|| StackError::UnknownVariable(key.to_string()))?;
        out.push_str(&s[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}

fn scalar_value(
    value: &KdlValue,
    variables: &HashMap<String, String>,
) -> Result<serde_json::Value> {
    if let Some(s) = value.as_string() {
        Ok(serde_json::Value::String(expand_variables(s, variables)?))
    } else if let Some(i) = value.as_integer() {
        let n = i64::try_from(i).map_err(|_| {
            StackError::InvalidStack(format!("integer {i} is out of range"))
        })?;
        Ok(serde_json::Value::from(n))
    } else if let Some(f) = value.as_float() {
        Ok(serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null))
    } else if let Some(b) = value.as_bool() {
        Ok(serde_json::Value::Bool(b))
    } else {
        Ok(serde_json::Value::Null)
    }
}

/// Convert a property node to a JSON value.
///
/// A node with children becomes an object, one argument becomes a
/// scalar, several arguments become an array, a bare node is a `true`
/// flag.
fn property_value(
    node: &KdlNode,
    variables: &HashMap<String, String>,
) -> Result<serde_json::Value> {
    if let Some(children) = node.children() {
        let mut object = Properties::new();
        for child in children.nodes() {
            object.insert(
                child.name().value().to_string(),
                property_value(child, variables)?,
            );
        }
        return Ok(serde_json::Value::Object(object));
    }

    let entries = node.entries();
    match entries.len() {
        0 => Ok(serde_json::Value::Bool(true)),
        1 => scalar_value(entries[0].value(), variables),
        _ => {
            let items = entries
                .iter()
                .map(|e| scalar_value(e.value(), variables))
                .collect::<Result<Vec<_>>>()?;
            Ok(serde_json::Value::Array(items))
        }
    }
}

/// Parse a `resource "<kind>" "<id>" { ... }` node
pub fn parse_resource(
    node: &KdlNode,
    variables: &HashMap<String, String>,
) -> Result<ResourceDeclaration> {
    let mut args = node
        .entries()
        .iter()
        .filter_map(|e| e.value().as_string());
    let kind_name = args.next().ok_or_else(|| {
        StackError::InvalidStack("resource requires a kind and an id".to_string())
    })?;
    let id = args.next().ok_or_else(|| {
        StackError::InvalidStack(format!("resource \"{kind_name}\" requires an id"))
    })?;

    let kind = ResourceKind::parse(kind_name).ok_or_else(|| StackError::UnknownKind {
        resource: id.to_string(),
        kind: kind_name.to_string(),
    })?;

    let mut decl = ResourceDeclaration::new(kind, id);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "depends-on" | "depends_on" => {
                    decl.depends_on.extend(
                        child
                            .entries()
                            .iter()
                            .filter_map(|e| e.value().as_string().map(|s| s.to_string())),
                    );
                }
                other => {
                    decl.properties
                        .insert(other.to_string(), property_value(child, variables)?);
                }
            }
        }
    }

    Ok(decl)
}
