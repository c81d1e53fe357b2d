//! Stack and resource declaration model
//!
//! A stack is the parsed form of a `stack.kdl` file: a named set of
//! resource declarations plus stack-level variables. Declarations are
//! immutable once parsed; everything downstream (graph, planner, apply
//! engine) reads them through an explicit `Stack` value rather than any
//! process-wide registry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Property tree of a resource declaration.
///
/// String values may embed deferred references (`${resource-id.field}`),
/// substituted only after the referenced resource has been applied.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Kind of cloud object a declaration describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ResourceGroup,
    VirtualNetwork,
    Subnet,
    PublicIp,
    NetworkInterface,
    NetworkSecurityGroup,
    RouteTable,
    VirtualNetworkGateway,
    GatewayConnection,
    VnetPeering,
    VirtualMachine,
    RandomPassword,
}

impl ResourceKind {
    /// Parse the kebab-case kind name used in stack files
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resource-group" => Some(Self::ResourceGroup),
            "virtual-network" => Some(Self::VirtualNetwork),
            "subnet" => Some(Self::Subnet),
            "public-ip" => Some(Self::PublicIp),
            "network-interface" => Some(Self::NetworkInterface),
            "network-security-group" => Some(Self::NetworkSecurityGroup),
            "route-table" => Some(Self::RouteTable),
            "virtual-network-gateway" => Some(Self::VirtualNetworkGateway),
            "gateway-connection" => Some(Self::GatewayConnection),
            "vnet-peering" => Some(Self::VnetPeering),
            "virtual-machine" => Some(Self::VirtualMachine),
            "random-password" => Some(Self::RandomPassword),
            _ => None,
        }
    }

    /// Kind name as written in stack files and passed to providers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceGroup => "resource-group",
            Self::VirtualNetwork => "virtual-network",
            Self::Subnet => "subnet",
            Self::PublicIp => "public-ip",
            Self::NetworkInterface => "network-interface",
            Self::NetworkSecurityGroup => "network-security-group",
            Self::RouteTable => "route-table",
            Self::VirtualNetworkGateway => "virtual-network-gateway",
            Self::GatewayConnection => "gateway-connection",
            Self::VnetPeering => "vnet-peering",
            Self::VirtualMachine => "virtual-machine",
            Self::RandomPassword => "random-password",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single resource declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    /// Identifier, unique within the stack
    pub id: String,

    /// Kind of cloud object
    pub kind: ResourceKind,

    /// Declared properties (literals and deferred references)
    pub properties: Properties,

    /// Explicit dependency ids from `depends-on`
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ResourceDeclaration {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: Properties::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }
}

/// A parsed stack description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stack {
    /// Stack name (from the `stack` node, or the directory name)
    pub name: String,

    /// Declarations keyed by resource id; BTreeMap keeps iteration
    /// deterministic for planning output
    pub resources: BTreeMap<String, ResourceDeclaration>,

    /// Stack-level variables, already expanded into properties at parse
    /// time but kept for display
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<&ResourceDeclaration> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Declarations in id order
    pub fn iter(&self) -> impl Iterator<Item = &ResourceDeclaration> {
        self.resources.values()
    }

    /// Validate the stack: per-kind schema check, explicit dependency
    /// targets, and every deferred reference embedded in properties.
    pub fn validate(&self) -> crate::error::Result<()> {
        for decl in self.resources.values() {
            crate::schema::validate(decl)?;

            for dep in &decl.depends_on {
                if !self.contains(dep) {
                    return Err(crate::error::StackError::UnknownResourceReference {
                        resource: decl.id.clone(),
                        target: dep.clone(),
                    });
                }
            }

            for reference in crate::resolve::scan_references(&decl.id, &decl.properties)? {
                if !self.contains(&reference.target) {
                    return Err(crate::error::StackError::UnknownResourceReference {
                        resource: decl.id.clone(),
                        target: reference.target,
                    });
                }
            }
        }
        Ok(())
    }
}
