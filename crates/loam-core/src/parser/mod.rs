//! KDL stack parser
//!
//! Parses `stack.kdl` declaration files. Resource node parsing lives in
//! its own module; this module handles the top-level dispatch.

mod resource;

pub use resource::parse_resource;

use crate::error::{Result, StackError};
use crate::model::Stack;
use kdl::KdlDocument;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Parse a stack file into a `Stack`
pub fn parse_stack_file<P: AsRef<Path>>(path: P) -> Result<Stack> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_stack_str(&content, name)
}

/// Parse a stack from KDL text
pub fn parse_stack_str(content: &str, default_name: String) -> Result<Stack> {
    let doc: KdlDocument = content.parse()?;

    // Variables first: resource properties reference them via ${var:KEY}
    let mut variables: HashMap<String, String> = HashMap::new();
    for node in doc.nodes() {
        if node.name().value() == "variables"
            && let Some(children) = node.children()
        {
            for var in children.nodes() {
                let key = var.name().value().to_string();
                let value = var
                    .entries()
                    .first()
                    .and_then(|e| e.value().as_string())
                    .unwrap_or("")
                    .to_string();
                variables.insert(key, value);
            }
        }
    }

    let mut stack = Stack::new(default_name);
    stack.variables = variables.clone();

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {
                if let Some(stack_name) =
                    node.entries().first().and_then(|e| e.value().as_string())
                {
                    stack.name = stack_name.to_string();
                }
            }
            "resource" => {
                let decl = parse_resource(node, &variables)?;
                if stack.contains(&decl.id) {
                    return Err(StackError::DuplicateResource(decl.id));
                }
                stack.resources.insert(decl.id.clone(), decl);
            }
            "variables" => {
                // Collected above
            }
            _ => {
                // Unknown top-level nodes are skipped
            }
        }
    }

    tracing::debug!(
        stack = %stack.name,
        resources = stack.len(),
        "Parsed stack"
    );
    Ok(stack)
}
