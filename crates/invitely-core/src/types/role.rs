//! User role enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Roles carried in access tokens.
///
/// Roles are ordered by privilege level: Superuser > Staff > Customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full back-office administrator.
    Superuser,
    /// Back-office staff (approvals, order handling).
    Staff,
    /// End customer buying invitations.
    Customer,
}

impl UserRole {
    /// Return the privilege level (higher = more privileged).
    pub fn privilege_level(&self) -> u8 {
        match self {
            Self::Superuser => 3,
            Self::Staff => 2,
            Self::Customer => 1,
        }
    }

    /// Check if this role has at least the given role's privileges.
    pub fn has_at_least(&self, other: &UserRole) -> bool {
        self.privilege_level() >= other.privilege_level()
    }

    /// Whether the role may subscribe to the admin notification layer.
    pub fn is_privileged(&self) -> bool {
        self.has_at_least(&Self::Staff)
    }

    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Superuser => "superuser",
            Self::Staff => "staff",
            Self::Customer => "customer",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "superuser" => Ok(Self::Superuser),
            "staff" => Ok(Self::Staff),
            "customer" => Ok(Self::Customer),
            _ => Err(AppError::validation(format!(
                "Invalid user role: '{s}'. Expected one of: superuser, staff, customer"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_ordering() {
        assert!(UserRole::Superuser.has_at_least(&UserRole::Customer));
        assert!(UserRole::Staff.has_at_least(&UserRole::Staff));
        assert!(!UserRole::Customer.has_at_least(&UserRole::Staff));
    }

    #[test]
    fn test_privileged_roles() {
        assert!(UserRole::Superuser.is_privileged());
        assert!(UserRole::Staff.is_privileged());
        assert!(!UserRole::Customer.is_privileged());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("staff".parse::<UserRole>().unwrap(), UserRole::Staff);
        assert_eq!("SUPERUSER".parse::<UserRole>().unwrap(), UserRole::Superuser);
        assert!("admin".parse::<UserRole>().is_err());
    }
}
