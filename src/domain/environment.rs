// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment Environment Taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment a deployable unit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Production,
    Staging,
    Development,
    Test,
}

impl AppEnvironment {
    /// Canonical lowercase name, used in stack identifiers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
            Self::Test => "test",
        }
    }

    /// PascalCase name, used in parameter store paths
    pub fn pascal_name(&self) -> &'static str {
        match self {
            Self::Production => "Production",
            Self::Staging => "Staging",
            Self::Development => "Development",
            Self::Test => "Test",
        }
    }

    /// Parse from common spellings
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" | "prd" => Some(Self::Production),
            "staging" | "stage" | "stg" => Some(Self::Staging),
            "development" | "dev" => Some(Self::Development),
            "test" | "testing" => Some(Self::Test),
            _ => None,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl Default for AppEnvironment {
    fn default() -> Self {
        Self::Development
    }
}

impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown environment: {}", s))
    }
}
