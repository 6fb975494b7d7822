use sdk::types::Role;
use serde::Serialize;

use super::router::RoutingError;

/// The fixed set of roles taking part in one conversation.
///
/// Exactly one Human, one Planner and one Synchronizer. Fixed at
/// conversation start and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Roster {
    roles: Vec<Role>,
}

impl Roster {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Result<Self, RoutingError> {
        let roles: Vec<Role> = roles.into_iter().collect();

        for role in Role::ALL {
            match roles.iter().filter(|r| **r == role).count() {
                1 => {}
                0 => {
                    return Err(RoutingError::InvalidRoster(format!(
                        "missing the {} role",
                        role
                    )))
                }
                n => {
                    return Err(RoutingError::InvalidRoster(format!(
                        "{} appears {} times",
                        role, n
                    )))
                }
            }
        }

        Ok(Self { roles })
    }

    /// Human, Planner and Synchronizer
    pub fn standard() -> Self {
        Self {
            roles: Role::ALL.to_vec(),
        }
    }

    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Roster without the membership checks, for exercising routing faults
    #[cfg(test)]
    pub(crate) fn unchecked(roles: Vec<Role>) -> Self {
        Self { roles }
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::standard()
    }
}
