// Copyright (c) 2025 - Cowboy AI, Inc.
//! CloudFormation Naming Value Objects
//!
//! Pure string formatting used to derive stack identifiers, export names and
//! parameter paths from repository names.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Letter prepended when a formatted name would not start with a letter
pub const FILLER_PREFIX: char = 'r';

/// Naming validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("Name is empty")]
    Empty,

    #[error("Name exceeds maximum length of 128 characters: {0}")]
    TooLong(usize),

    #[error("Name must start with a letter: {0}")]
    InvalidStart(String),

    #[error("Invalid character in name: {0}")]
    InvalidCharacter(char),
}

/// Format a repository name so it is accepted as part of a CloudFormation stack name.
///
/// - lowercases the input
/// - replaces every character outside `[A-Za-z0-9]` with `-`
/// - collapses runs of `-`
/// - strips leading and trailing `-`
/// - prefixes `r-` when the result starts with a digit
///
/// Input that sanitizes to nothing (empty, or only symbols) yields the bare filler `"r"`.
///
/// ```rust
/// use iac_stacks::domain::format_identifier;
///
/// assert_eq!(format_identifier("My_Repo Name"), "my-repo-name");
/// assert_eq!(format_identifier("47-services"), "r-47-services");
/// assert_eq!(format_identifier("__"), "r");
/// ```
pub fn format_identifier(raw: &str) -> String {
    let mut formatted = String::with_capacity(raw.len());

    for ch in raw.chars().flat_map(char::to_lowercase) {
        let mapped = if ch.is_ascii_alphanumeric() { ch } else { '-' };
        if mapped == '-' && formatted.ends_with('-') {
            continue;
        }
        formatted.push(mapped);
    }

    let trimmed = formatted.trim_matches('-');

    match trimmed.chars().next() {
        None => FILLER_PREFIX.to_string(),
        Some(first) if first.is_ascii_alphabetic() => trimmed.to_string(),
        Some(_) => format!("{}-{}", FILLER_PREFIX, trimmed),
    }
}

/// Convert words separated by spaces, underscores or hyphens to PascalCase.
///
/// The first character of every word is uppercased and the rest of the word is kept
/// as written, so already-PascalCase input is returned unchanged.
///
/// ```rust
/// use iac_stacks::domain::to_pascal_case;
///
/// assert_eq!(to_pascal_case("my-repo"), "MyRepo");
/// assert_eq!(to_pascal_case("mydbPostgres"), "MydbPostgres");
/// assert_eq!(to_pascal_case(&to_pascal_case("work queue")), "WorkQueue");
/// ```
pub fn to_pascal_case(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// A name that satisfies the CloudFormation pattern `^[A-Za-z][A-Za-z0-9-]*$`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CloudFormationName(String);

impl CloudFormationName {
    /// Maximum stack name length accepted by CloudFormation
    pub const MAX_LENGTH: usize = 128;

    /// Validate an already formatted name
    pub fn new(name: impl Into<String>) -> Result<Self, NamingError> {
        let name = name.into();

        let first = name.chars().next().ok_or(NamingError::Empty)?;

        if name.len() > Self::MAX_LENGTH {
            return Err(NamingError::TooLong(name.len()));
        }

        if !first.is_ascii_alphabetic() {
            return Err(NamingError::InvalidStart(name));
        }

        if let Some(bad) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '-') {
            return Err(NamingError::InvalidCharacter(bad));
        }

        Ok(Self(name))
    }

    /// Format arbitrary input and wrap it
    pub fn from_raw(raw: &str) -> Result<Self, NamingError> {
        Self::new(format_identifier(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CloudFormationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CloudFormationName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CloudFormationName {
    type Error = NamingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CloudFormationName> for String {
    fn from(name: CloudFormationName) -> Self {
        name.0
    }
}
