//! Per-kind declaration schemas
//!
//! Each resource kind carries a list of required fields, checked before
//! graph construction so malformed declarations fail the run up front
//! instead of mid-apply.

use crate::error::{Result, StackError};
use crate::model::{ResourceDeclaration, ResourceKind};

/// Required property fields per resource kind.
///
/// Fields beyond the required set are allowed and passed to the provider
/// untouched; kinds differ too much across providers to close the set.
fn required_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::ResourceGroup => &["location"],
        ResourceKind::VirtualNetwork => &["resource-group", "address-space"],
        ResourceKind::Subnet => &["resource-group", "virtual-network", "address-prefix"],
        ResourceKind::PublicIp => &["resource-group", "allocation-method"],
        ResourceKind::NetworkInterface => &["resource-group", "subnet"],
        ResourceKind::NetworkSecurityGroup => &["resource-group"],
        ResourceKind::RouteTable => &["resource-group"],
        ResourceKind::VirtualNetworkGateway => &["resource-group", "subnet", "public-ip"],
        ResourceKind::GatewayConnection => &["resource-group", "gateway", "peer-gateway"],
        ResourceKind::VnetPeering => &["resource-group", "virtual-network", "remote-network"],
        ResourceKind::VirtualMachine => &["resource-group", "network-interface", "size", "image"],
        ResourceKind::RandomPassword => &["length"],
    }
}

/// Check a declaration against its kind's schema
pub fn validate(decl: &ResourceDeclaration) -> Result<()> {
    for field in required_fields(decl.kind) {
        match decl.properties.get(*field) {
            Some(serde_json::Value::Null) | None => {
                return Err(StackError::MissingField {
                    resource: decl.id.clone(),
                    kind: decl.kind.as_str().to_string(),
                    field: (*field).to_string(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}
