//! Deferred reference scanning and resolution
//!
//! String property values may embed `${resource-id.output-field}`
//! placeholders. Scanning is a pure two-pass walk over the property tree
//! producing `(path, target, field)` tuples; resolution substitutes the
//! recorded outputs of already-applied resources. Resolution never
//! leaves a placeholder behind: a missing output is an error.

use crate::error::{Result, StackError};
use crate::model::Properties;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// A deferred reference found in a property tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePath {
    /// Dotted path to the containing value, e.g. `ip-configuration.subnet`
    pub path: String,

    /// Referenced resource id
    pub target: String,

    /// Output field of the referenced resource
    pub field: String,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").unwrap())
}

/// Split a placeholder body into (target, field), rejecting malformed ones
fn parse_reference(resource: &str, body: &str) -> Result<(String, String)> {
    let malformed = || StackError::MalformedReference {
        resource: resource.to_string(),
        reference: format!("${{{body}}}"),
    };

    let (target, field) = body.rsplit_once('.').ok_or_else(malformed)?;
    if target.is_empty() || field.is_empty() {
        return Err(malformed());
    }
    let valid =
        |s: &str| s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid(target) || !valid(field) {
        return Err(malformed());
    }
    Ok((target.to_string(), field.to_string()))
}

fn scan_value(
    resource: &str,
    path: &str,
    value: &Value,
    refs: &mut Vec<ReferencePath>,
) -> Result<()> {
    match value {
        Value::String(s) => {
            for capture in placeholder_re().captures_iter(s) {
                let (target, field) = parse_reference(resource, &capture[1])?;
                refs.push(ReferencePath {
                    path: path.to_string(),
                    target,
                    field,
                });
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                scan_value(resource, &format!("{path}[{i}]"), item, refs)?;
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                scan_value(resource, &child, item, refs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Collect every deferred reference embedded in a property tree.
///
/// Pure transformation; existence of the targets is checked separately
/// against the declaration set (`Stack::validate`).
pub fn scan_references(resource: &str, properties: &Properties) -> Result<Vec<ReferencePath>> {
    let mut refs = Vec::new();
    for (key, value) in properties {
        scan_value(resource, key, value, &mut refs)?;
    }
    Ok(refs)
}

/// Render an output value for interpolation inside a longer string
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn resolve_string<L>(resource: &str, s: &str, lookup: &L) -> Result<Value>
where
    L: Fn(&str, &str) -> Option<Value>,
{
    let re = placeholder_re();

    // A value that is exactly one reference resolves to the raw output,
    // preserving its type
    if let Some(capture) = re.captures(s)
        && capture.get(0).map(|m| m.as_str()) == Some(s)
    {
        let (target, field) = parse_reference(resource, &capture[1])?;
        return lookup(&target, &field)
            .ok_or(StackError::UnresolvedReference { target, field });
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for capture in re.captures_iter(s) {
        let whole = capture.get(0).unwrap();
        let (target, field) = parse_reference(resource, &capture[1])?;
        let value = lookup(&target, &field)
            .ok_or(StackError::UnresolvedReference { target, field })?;
        out.push_str(&s[last..whole.start()]);
        out.push_str(&value_to_string(&value));
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

fn resolve_value<L>(resource: &str, value: &Value, lookup: &L) -> Result<Value>
where
    L: Fn(&str, &str) -> Option<Value>,
{
    match value {
        Value::String(s) if s.contains("${") => resolve_string(resource, s, lookup),
        Value::Array(items) => {
            let resolved = items
                .iter()
                .map(|item| resolve_value(resource, item, lookup))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(resolved))
        }
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_value(resource, item, lookup)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Substitute every deferred reference in a property tree with the
/// output recorded for its target.
pub fn resolve_properties<L>(resource: &str, properties: &Properties, lookup: L) -> Result<Properties>
where
    L: Fn(&str, &str) -> Option<Value>,
{
    let mut resolved = Properties::with_capacity(properties.len());
    for (key, value) in properties {
        resolved.insert(key.clone(), resolve_value(resource, value, &lookup)?);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: serde_json::Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_scan_flat_reference() {
        let properties = props(json!({
            "resource-group": "${hub-rg.name}",
            "address-space": "10.0.0.0/16",
        }));
        let refs = scan_references("hub-vnet", &properties).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].path, "resource-group");
        assert_eq!(refs[0].target, "hub-rg");
        assert_eq!(refs[0].field, "name");
    }

    #[test]
    fn test_scan_nested_and_array() {
        let properties = props(json!({
            "ip-configuration": {
                "subnet": "${onprem-mgmt.id}",
                "public-ip": "${onprem-pip.id}",
            },
            "address-prefixes": ["192.168.0.0/16", "${hub-vnet.cidr}"],
        }));
        let mut refs = scan_references("onprem-nic", &properties).unwrap();
        refs.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].path, "address-prefixes[1]");
        assert_eq!(refs[0].target, "hub-vnet");
        assert_eq!(refs[1].path, "ip-configuration.public-ip");
        assert_eq!(refs[2].path, "ip-configuration.subnet");
    }

    #[test]
    fn test_scan_no_references() {
        let properties = props(json!({"location": "westeurope", "count": 3}));
        assert!(scan_references("rg", &properties).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_reference_without_dot() {
        let properties = props(json!({"subnet": "${onprem-mgmt}"}));
        let err = scan_references("nic", &properties).unwrap_err();
        assert!(matches!(err, StackError::MalformedReference { .. }));
    }

    #[test]
    fn test_resolve_whole_string_keeps_type() {
        let properties = props(json!({"length": "${pw-gen.length}"}));
        let resolved = resolve_properties("vm", &properties, |target, field| {
            (target == "pw-gen" && field == "length").then(|| json!(20))
        })
        .unwrap();
        assert_eq!(resolved["length"], json!(20));
    }

    #[test]
    fn test_resolve_interpolation() {
        let properties = props(json!({"peer": "gw-${hub-gw.name}-link"}));
        let resolved = resolve_properties("conn", &properties, |_, _| {
            Some(json!("hub-gateway"))
        })
        .unwrap();
        assert_eq!(resolved["peer"], json!("gw-hub-gateway-link"));
    }

    #[test]
    fn test_resolve_missing_output_is_error() {
        let properties = props(json!({"subnet": "${mgmt.id}"}));
        let err = resolve_properties("nic", &properties, |_, _| None).unwrap_err();
        match err {
            StackError::UnresolvedReference { target, field } => {
                assert_eq!(target, "mgmt");
                assert_eq!(field, "id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_leaves_literals_untouched() {
        let properties = props(json!({
            "address-prefix": "10.0.1.0/24",
            "enable-forwarding": true,
        }));
        let resolved =
            resolve_properties("subnet", &properties, |_, _| None).unwrap();
        assert_eq!(resolved, properties);
    }
}
