use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn staff(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Staff,
        }
    }

    pub fn viewer(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Viewer,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Staff)
    }
}

/// Capabilities granted by the identity provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Staff,
    Viewer,
}
