//! Loam core: stack model, KDL parser and reference resolver
//!
//! A stack file declares cloud resources and their relationships:
//!
//! ```kdl
//! stack "hub-spoke"
//!
//! resource "resource-group" "hub-rg" {
//!     location "westeurope"
//! }
//!
//! resource "virtual-network" "hub-vnet" {
//!     resource-group "${hub-rg.name}"
//!     address-space "10.0.0.0/16"
//! }
//! ```
//!
//! `${hub-rg.name}` is a deferred reference: a placeholder for an output
//! of another resource, only known after that resource has been applied.
//! This crate parses declarations, validates them against per-kind
//! schemas, and scans/resolves deferred references; ordering and
//! application live in `loam-engine`.

pub mod error;
pub mod model;
pub mod parser;
pub mod resolve;
pub mod schema;

pub use error::{Result, StackError};
pub use model::{Properties, ResourceDeclaration, ResourceKind, Stack};
pub use parser::{parse_stack_file, parse_stack_str};
pub use resolve::{ReferencePath, resolve_properties, scan_references};
