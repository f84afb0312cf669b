use crate::error::StageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remote resource kind. Each service owns a disjoint namespace of item names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Parameter,
    Secret,
}

impl Service {
    /// All services, in serialization order
    pub const ALL: [Service; 2] = [Service::Parameter, Service::Secret];

    pub fn name(&self) -> &'static str {
        match self {
            Service::Parameter => "parameter",
            Service::Secret => "secret",
        }
    }

    /// Short label used in CLI output
    pub fn label(&self) -> &'static str {
        match self {
            Service::Parameter => "param",
            Service::Secret => "secret",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Service {
    type Err = StageError;

    /// Accepts the tags a front-end may send: "parameter", "param", "ssm", "secret", "sm"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parameter" | "param" | "ssm" => Ok(Service::Parameter),
            "secret" | "sm" => Ok(Service::Secret),
            other => Err(StageError::InvalidService(other.to_string())),
        }
    }
}

/// Kind of pending value change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Single-letter marker for status listings
    pub fn marker(&self) -> &'static str {
        match self {
            Operation::Create => "A",
            Operation::Update => "M",
            Operation::Delete => "D",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
