//! Option helpers shared by the provisioners.

use shipline_core::{ProvisionCause, ResourceDescriptor};
use std::ops::RangeInclusive;

/// Integer option with a default, rejected when outside `range`.
pub(crate) fn int_in_range(
    descriptor: &ResourceDescriptor,
    key: &str,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<i64, ProvisionCause> {
    let value = descriptor.int_option(key)?.unwrap_or(default);
    if !range.contains(&value) {
        return Err(ProvisionCause::InvalidOption {
            key: key.to_string(),
            message: format!(
                "{value} is outside {}..={}",
                range.start(),
                range.end()
            ),
        });
    }
    Ok(value)
}

/// String option falling back to `default` when absent or blank.
pub(crate) fn str_or(
    descriptor: &ResourceDescriptor,
    key: &str,
    default: impl FnOnce() -> String,
) -> Result<String, ProvisionCause> {
    Ok(descriptor
        .str_option(key)?
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(default))
}
