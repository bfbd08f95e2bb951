//! Custom macros for reducing code repetition in edb

/// Validate an enum-like string value
///
/// # Example
/// ```ignore
/// validate_enum!(level, "trace", "debug", "info", "warn", "error");
/// validate_enum!(source, "device", "pattern");
/// ```
#[macro_export]
macro_rules! validate_enum {
    ($value:expr, $($variant:expr),+) => {
        match $value {
            $($variant)|+ => Ok(()),
            _ => anyhow::bail!("Invalid value: {} (expected one of: {})", $value, [$($variant),+].join(", ")),
        }
    };
}

/// Map a wgpu resource failure into a fatal bridge error with context
///
/// # Example
/// ```ignore
/// let adapter = instance.request_adapter(&options).await
///     .map_err(|e| gpu_error!(GpuInit, "request adapter", e))?;
/// ```
#[macro_export]
macro_rules! gpu_error {
    ($variant:ident, $context:expr, $err:expr) => {
        common::BridgeError::$variant(format!("{}: {}", $context, $err))
    };
}
