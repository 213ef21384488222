//! Role hierarchy and access decisions.
//!
//! Levels form a total order `guest < user < editor < admin < super`. A
//! subject may perform an operation when its level ranks at or above the
//! level the operation requires. Parsing from a string is the only place an
//! unrecognised level can appear, and an unrecognised level never grants
//! anything.

use crate::types::{AppError, PublicUser, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// User access level, ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Guest,
    #[default]
    User,
    Editor,
    Admin,
    Super,
}

impl AccessLevel {
    /// Every level, lowest first.
    pub const ALL: [AccessLevel; 5] = [
        AccessLevel::Guest,
        AccessLevel::User,
        AccessLevel::Editor,
        AccessLevel::Admin,
        AccessLevel::Super,
    ];

    /// Numeric rank of the level (guest = 0).
    pub fn rank(self) -> u8 {
        match self {
            AccessLevel::Guest => 0,
            AccessLevel::User => 1,
            AccessLevel::Editor => 2,
            AccessLevel::Admin => 3,
            AccessLevel::Super => 4,
        }
    }

    /// Whether a subject at this level satisfies `required`.
    pub fn can_access(self, required: AccessLevel) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Guest => "guest",
            AccessLevel::User => "user",
            AccessLevel::Editor => "editor",
            AccessLevel::Admin => "admin",
            AccessLevel::Super => "super",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "guest" => Ok(AccessLevel::Guest),
            "user" => Ok(AccessLevel::User),
            "editor" => Ok(AccessLevel::Editor),
            "admin" => Ok(AccessLevel::Admin),
            "super" => Ok(AccessLevel::Super),
            other => Err(AppError::InvalidInput(format!(
                "unknown access level '{}'",
                other
            ))),
        }
    }
}

/// Access check over raw level strings, as they arrive from storage or
/// request payloads. Unknown strings on either side deny.
pub fn can_access_str(subject: &str, required: &str) -> bool {
    match (subject.parse::<AccessLevel>(), required.parse::<AccessLevel>()) {
        (Ok(subject), Ok(required)) => subject.can_access(required),
        _ => false,
    }
}

/// Gate a protected operation on an optionally resolved identity.
///
/// No identity is `Unauthorized`; an identity below `required` is
/// `Forbidden`. On success the identity is handed back for the wrapped
/// operation to use.
pub fn authorize(identity: Option<&PublicUser>, required: AccessLevel) -> Result<&PublicUser> {
    let user = identity.ok_or(AppError::Unauthorized)?;
    if !user.access_level.can_access(required) {
        return Err(AppError::Forbidden);
    }
    Ok(user)
}
