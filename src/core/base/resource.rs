//! Resource/Traffic Wrappers
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// ResourceType represents resource_type of the resources
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceType {
    Common = 0,
    Web,
    RPC,
    APIGateway,
    DBSQL,
    Cache,
    MQ,
}

impl Default for ResourceType {
    fn default() -> ResourceType {
        ResourceType::Common
    }
}

// or use `num_enum` crate
impl From<u8> for ResourceType {
    fn from(num: u8) -> ResourceType {
        match num {
            1 => ResourceType::Web,
            2 => ResourceType::RPC,
            3 => ResourceType::APIGateway,
            4 => ResourceType::DBSQL,
            5 => ResourceType::Cache,
            6 => ResourceType::MQ,
            _ => ResourceType::Common,
        }
    }
}

/// TrafficType describes the direction of the traffic: Inbound or Outbound
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TrafficType {
    Outbound,
    Inbound,
}

impl Default for TrafficType {
    fn default() -> TrafficType {
        TrafficType::Outbound
    }
}

/// ResourceWrapper identifies the guarded resource of an invocation.
/// Two wrappers are equal when both the name and the traffic direction match.
#[derive(Debug, Clone, Default)]
pub struct ResourceWrapper {
    /// global unique resource name
    name: String,
    resource_type: ResourceType,
    traffic_type: TrafficType,
}

impl PartialEq for ResourceWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.traffic_type == other.traffic_type
    }
}

impl Eq for ResourceWrapper {}

impl Hash for ResourceWrapper {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.traffic_type.hash(state);
    }
}

impl fmt::Display for ResourceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ResourceWrapper{{name={}, traffic_type={:?}, resource_type={:?}}}",
            self.name, self.traffic_type, self.resource_type
        )
    }
}

impl ResourceWrapper {
    pub fn new(name: String, resource_type: ResourceType, traffic_type: TrafficType) -> Self {
        ResourceWrapper {
            name,
            resource_type,
            traffic_type,
        }
    }

    pub fn name(&self) -> &String {
        &self.name
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn traffic_type(&self) -> &TrafficType {
        &self.traffic_type
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_by_name_and_direction() {
        let a = ResourceWrapper::new("abc".into(), ResourceType::Web, TrafficType::Inbound);
        let b = ResourceWrapper::new("abc".into(), ResourceType::RPC, TrafficType::Inbound);
        let c = ResourceWrapper::new("abc".into(), ResourceType::Web, TrafficType::Outbound);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn resource_type_from_u8() {
        assert_eq!(ResourceType::from(2), ResourceType::RPC);
        assert_eq!(ResourceType::from(42), ResourceType::Common);
    }
}
