//! Group naming rules shared by the handshake and configuration.

use crate::error::AppError;

/// Longest accepted group name.
pub const MAX_GROUP_NAME_LEN: usize = 128;

/// Checks that `group` is 1 to 128 characters of `[A-Za-z0-9:_-]`.
pub fn validate_group_name(group: &str) -> Result<(), AppError> {
    if group.is_empty() || group.len() > MAX_GROUP_NAME_LEN {
        return Err(AppError::validation("Invalid group name length"));
    }

    if !group
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '-' || c == '_')
    {
        return Err(AppError::validation("Group name contains invalid characters"));
    }

    Ok(())
}
