// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Validation Functions - Configuration Invariants
//!
//! Every stack definition validates its configuration before any resource is
//! added. All functions are pure and return detailed validation errors.

/// Validation result with detailed error information
pub type ValidationResult = Result<(), ValidationError>;

/// Validation error with context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Required field is empty
    #[error("Required field '{field}' is empty")]
    Empty { field: String },

    /// Numeric field outside its allowed range
    #[error("Field '{field}' must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        actual: i64,
    },

    /// Fargate task size combination not offered by the provider
    #[error("Unsupported Fargate size: {cpu} CPU units with {memory_mib} MiB")]
    UnsupportedTaskSize { cpu: u32, memory_mib: u32 },

    /// Fields that must be provided together
    #[error("'{field}' requires '{requires}'")]
    MissingCompanion { field: String, requires: String },

    /// Business rule violation
    #[error("Business rule violated: {0}")]
    BusinessRule(String),
}

/// Require a non-blank string
pub fn require_non_empty(field: &str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Require a non-empty list
pub fn require_non_empty_list<T>(field: &str, values: &[T]) -> ValidationResult {
    if values.is_empty() {
        return Err(ValidationError::Empty {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Require `min <= value <= max`
pub fn require_range(field: &str, value: i64, min: i64, max: i64) -> ValidationResult {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
            actual: value,
        });
    }
    Ok(())
}

/// Require a strictly positive value
pub fn require_positive(field: &str, value: i64) -> ValidationResult {
    require_range(field, value, 1, i64::MAX)
}

/// Lambda memory size in MB
///
/// # Rules
/// - 128 MB to 10240 MB
pub fn validate_memory_size(memory_mb: u32) -> ValidationResult {
    require_range("memory_size_mb", memory_mb as i64, 128, 10_240)
}

/// Lambda timeout in seconds
///
/// # Rules
/// - 1 to 900 seconds
pub fn validate_function_timeout(seconds: u32) -> ValidationResult {
    require_range("timeout_seconds", seconds as i64, 1, 900)
}

/// Fargate CPU / memory combination
///
/// # Rules
/// - 256 CPU: 512, 1024, 2048 MiB
/// - 512 CPU: 1024 - 4096 MiB
/// - 1024 CPU: 2048 - 8192 MiB
/// - 2048 CPU: 4096 - 16384 MiB (1 GiB steps)
/// - 4096 CPU: 8192 - 30720 MiB (1 GiB steps)
pub fn validate_fargate_size(cpu: u32, memory_mib: u32) -> ValidationResult {
    let supported = match cpu {
        256 => matches!(memory_mib, 512 | 1024 | 2048),
        512 => (1024..=4096).contains(&memory_mib) && memory_mib % 1024 == 0,
        1024 => (2048..=8192).contains(&memory_mib) && memory_mib % 1024 == 0,
        2048 => (4096..=16_384).contains(&memory_mib) && memory_mib % 1024 == 0,
        4096 => (8192..=30_720).contains(&memory_mib) && memory_mib % 1024 == 0,
        _ => false,
    };

    if !supported {
        return Err(ValidationError::UnsupportedTaskSize { cpu, memory_mib });
    }
    Ok(())
}

/// Require `companion` to be present whenever `field` is
pub fn require_companion<A, B>(
    field: &str,
    value: &Option<A>,
    requires: &str,
    companion: &Option<B>,
) -> ValidationResult {
    if value.is_some() && companion.is_none() {
        return Err(ValidationError::MissingCompanion {
            field: field.to_string(),
            requires: requires.to_string(),
        });
    }
    Ok(())
}
