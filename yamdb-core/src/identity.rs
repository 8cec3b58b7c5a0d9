use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// The role a user has on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

#[derive(Debug, Error)]
#[error("{0} is not a valid role")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A yamdb account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: PrimaryKey,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    /// Platform-level flag, grants admin capabilities regardless of role
    pub staff: bool,
    /// Platform-level flag, grants admin capabilities regardless of role
    pub superuser: bool,
}

impl User {
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns true if the user has either of the platform-level elevated flags
    pub fn is_platform_elevated(&self) -> bool {
        self.staff || self.superuser
    }

    /// The only place where the role and the platform flags are combined.
    /// Everything that needs to know if a user is an admin must go through this.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin || self.is_platform_elevated()
    }

    pub fn is_moderator(&self) -> bool {
        self.role == Role::Moderator
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub fn user_with_role(id: PrimaryKey, role: Role) -> User {
        User {
            id,
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
            role,
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            staff: false,
            superuser: false,
        }
    }

    #[test]
    fn test_is_admin() {
        let mut user = user_with_role(1, Role::User);
        assert!(!user.is_admin(), "plain user should not be admin");

        user.role = Role::Admin;
        assert!(user.is_admin(), "admin role should be admin immediately");

        user.role = Role::Moderator;
        assert!(!user.is_admin(), "moderator should not be admin");

        user.staff = true;
        assert!(user.is_admin(), "staff flag should make any role admin");

        user.staff = false;
        user.superuser = true;
        assert!(user.is_admin(), "superuser flag should make any role admin");
    }

    #[test]
    fn test_is_moderator() {
        let mut user = user_with_role(1, Role::Moderator);
        assert!(user.is_moderator());

        // Platform flags don't make anyone a moderator
        user.role = Role::User;
        user.superuser = true;
        assert!(!user.is_moderator());

        user.role = Role::Admin;
        assert!(!user.is_moderator());
    }

    #[test]
    fn test_role_parsing() {
        for role in [Role::User, Role::Moderator, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }

        assert!("superadmin".parse::<Role>().is_err());
        assert!("Admin".parse::<Role>().is_err());
    }
}
