use crate::loader::Resource;
use crate::replay::ReplayState;

/// Failure to obtain one of the seven snapshot resources.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    Unavailable { resource: Resource, reason: String },
    Status { resource: Resource, status: u16 },
    Malformed { resource: Resource, reason: String },
    Timeout { resource: Resource },
}

impl ResourceError {
    pub fn resource(&self) -> Resource {
        match self {
            ResourceError::Unavailable { resource, .. }
            | ResourceError::Status { resource, .. }
            | ResourceError::Malformed { resource, .. }
            | ResourceError::Timeout { resource } => *resource,
        }
    }
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceError::Unavailable { resource, reason } => {
                write!(f, "{} unavailable: {}", resource.file_name(), reason)
            }
            ResourceError::Status { resource, status } => {
                write!(f, "{} returned HTTP status {}", resource.file_name(), status)
            }
            ResourceError::Malformed { resource, reason } => {
                write!(f, "{} is not valid JSON: {}", resource.file_name(), reason)
            }
            ResourceError::Timeout { resource } => {
                write!(f, "{} fetch timed out", resource.file_name())
            }
        }
    }
}

impl std::error::Error for ResourceError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayError {
    NoMessageSelected,
    UnknownMessage(String),
    InvalidTransition { from: ReplayState, action: &'static str },
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::NoMessageSelected => write!(f, "No message selected for replay"),
            ReplayError::UnknownMessage(hash) => write!(f, "Unknown message '{}'", hash),
            ReplayError::InvalidTransition { from, action } => {
                write!(f, "Cannot {} while replay is {:?}", action, from)
            }
        }
    }
}

impl std::error::Error for ReplayError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidValue { key: String, value: String },
    MissingValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{}' for {}", value, key)
            }
            ConfigError::MissingValue(key) => write!(f, "Missing value for {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug)]
pub enum DashboardError {
    Resource(ResourceError),
    Replay(ReplayError),
    Config(ConfigError),
}

impl std::fmt::Display for DashboardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DashboardError::Resource(e) => write!(f, "{}", e),
            DashboardError::Replay(e) => write!(f, "{}", e),
            DashboardError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DashboardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DashboardError::Resource(e) => Some(e),
            DashboardError::Replay(e) => Some(e),
            DashboardError::Config(e) => Some(e),
        }
    }
}

impl From<ResourceError> for DashboardError {
    fn from(e: ResourceError) -> Self {
        DashboardError::Resource(e)
    }
}

impl From<ReplayError> for DashboardError {
    fn from(e: ReplayError) -> Self {
        DashboardError::Replay(e)
    }
}

impl From<ConfigError> for DashboardError {
    fn from(e: ConfigError) -> Self {
        DashboardError::Config(e)
    }
}
