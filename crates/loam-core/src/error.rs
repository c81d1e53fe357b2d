use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("file read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid stack: {0}")]
    InvalidStack(String),

    #[error("duplicate resource id: {0}")]
    DuplicateResource(String),

    #[error("resource '{resource}' references unknown resource '{target}'")]
    UnknownResourceReference { resource: String, target: String },

    #[error("unknown resource kind '{kind}' for resource '{resource}'")]
    UnknownKind { resource: String, kind: String },

    #[error("resource '{resource}' ({kind}) is missing required field '{field}'")]
    MissingField {
        resource: String,
        kind: String,
        field: String,
    },

    #[error("malformed reference '{reference}' in resource '{resource}': expected ${{resource-id.output-field}}")]
    MalformedReference { resource: String, reference: String },

    #[error("unknown variable '${{var:{0}}}'")]
    UnknownVariable(String),

    #[error("output '{field}' of resource '{target}' is not yet available")]
    UnresolvedReference { target: String, field: String },

    #[error("stack file not found: {0}")]
    StackFileNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, StackError>;
