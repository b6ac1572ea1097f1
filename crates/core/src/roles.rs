//! Well-known role names and the authenticated actor handed to the engine.
//!
//! Role names must match the values issued by the identity provider.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::DbId;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_AUTHOR: &str = "author";
pub const ROLE_DEPARTMENT_HEAD: &str = "department_head";
pub const ROLE_EXECUTIVE_DIRECTOR: &str = "executive_director";
pub const ROLE_STAFF: &str = "staff";

/// An authenticated user acting on the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: DbId,
    pub roles: BTreeSet<String>,
}

impl Actor {
    pub fn new<I, S>(id: DbId, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }
}
