//! Who may do what to a note.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{auth::AuthenticatedUser, models::Note};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Owner,
    Manager,
    User,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Owner, Role::Manager, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Manager => "MANAGER",
            Role::User => "USER",
        }
    }

    /// Owners and managers oversee every note.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Owner | Role::Manager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                format!("unknown role '{value}'. Allowed roles: OWNER, MANAGER, USER")
            })
    }
}

pub fn same_email(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}

fn is_requester(user: &AuthenticatedUser, note: &Note) -> bool {
    note.created_by == user.user_id
}

fn is_coordinator(user: &AuthenticatedUser, note: &Note) -> bool {
    same_email(&user.email, &note.coordinator_email)
}

pub fn can_view(user: &AuthenticatedUser, note: &Note) -> bool {
    user.role.is_elevated() || is_requester(user, note) || is_coordinator(user, note)
}

pub fn can_edit(user: &AuthenticatedUser, note: &Note) -> bool {
    user.role.is_elevated() || is_requester(user, note)
}

pub fn can_attest(user: &AuthenticatedUser, note: &Note) -> bool {
    user.role.is_elevated() || is_coordinator(user, note)
}

pub fn can_revert(user: &AuthenticatedUser) -> bool {
    user.role.is_elevated()
}

pub fn can_soft_delete(user: &AuthenticatedUser, note: &Note) -> bool {
    user.role.is_elevated() || is_requester(user, note)
}

pub fn can_manage_trash(user: &AuthenticatedUser) -> bool {
    user.role.is_elevated()
}

/// Requesters may only purge their own notes once those are already in the trash.
pub fn can_purge(user: &AuthenticatedUser, note: &Note) -> bool {
    can_manage_trash(user) || (note.deleted && is_requester(user, note))
}

pub fn can_mint_link(user: &AuthenticatedUser, note: &Note) -> bool {
    user.role.is_elevated() || is_requester(user, note)
}

pub fn can_list_users(user: &AuthenticatedUser) -> bool {
    user.role.is_elevated()
}

pub fn can_change_roles(user: &AuthenticatedUser) -> bool {
    user.role == Role::Owner
}

pub fn can_update_settings(user: &AuthenticatedUser) -> bool {
    user.role.is_elevated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::tests::sample_note;
    use uuid::Uuid;

    fn user(role: Role, email: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            name: "Someone".into(),
            email: email.into(),
            role,
        }
    }

    #[test]
    fn role_parsing_is_case_insensitive_and_strict() {
        assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
        assert_eq!(" OWNER ".parse::<Role>().unwrap(), Role::Owner);
        assert!("MEMBER".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn coordinator_email_match_allows_attest_and_view() {
        let note = sample_note();
        let coordinator = user(Role::User, "COORD@example.org");
        assert!(can_attest(&coordinator, &note));
        assert!(can_view(&coordinator, &note));
        assert!(!can_edit(&coordinator, &note));
        assert!(!can_soft_delete(&coordinator, &note));
    }

    #[test]
    fn plain_user_without_relation_sees_nothing() {
        let note = sample_note();
        let stranger = user(Role::User, "stranger@example.org");
        assert!(!can_view(&stranger, &note));
        assert!(!can_attest(&stranger, &note));
        assert!(!can_revert(&stranger));
        assert!(!can_purge(&stranger, &note));
    }

    #[test]
    fn requester_purges_only_from_trash() {
        let mut note = sample_note();
        let mut requester = user(Role::User, "req@example.org");
        requester.user_id = note.created_by;
        assert!(can_soft_delete(&requester, &note));
        assert!(!can_purge(&requester, &note));
        assert!(!can_manage_trash(&requester));

        note.deleted = true;
        assert!(can_purge(&requester, &note));
    }

    #[test]
    fn managers_and_owners_are_elevated() {
        let note = sample_note();
        for role in [Role::Owner, Role::Manager] {
            let actor = user(role, "boss@example.org");
            assert!(can_attest(&actor, &note));
            assert!(can_revert(&actor));
            assert!(can_manage_trash(&actor));
            assert!(can_purge(&actor, &note));
            assert!(can_update_settings(&actor));
        }
        assert!(can_change_roles(&user(Role::Owner, "o@example.org")));
        assert!(!can_change_roles(&user(Role::Manager, "m@example.org")));
    }
}
