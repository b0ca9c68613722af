use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{assignable_roles, can_manage_user, can_remove_user, OrgRole};
use crate::authz::Role;
use crate::errors::{AppError, AppResult};
use crate::events::{publish, EventBus, Loggable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Membership {
    pub organization_id: String,
    pub user_id: String,
    pub role: OrgRole,
    pub joined_at: DateTime<Utc>,
}

impl Loggable for Membership {
    fn entity_type() -> &'static str { "membership" }
    fn subject_id(&self) -> String { format!("{}:{}", self.organization_id, self.user_id) }
}

/// Member roster of one organization.
///
/// Holds exactly one `PRESIDENT` from construction onward; every mutation
/// validates fully before touching the roster so a rejected call leaves it
/// unchanged. Successful mutations publish `membership.*` events when a bus
/// is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    members: BTreeMap<String, Membership>,
    #[serde(skip)]
    events: Option<EventBus>,
}

impl Organization {
    pub fn new(id: impl Into<String>, name: impl Into<String>, president_id: impl Into<String>) -> Self {
        let id = id.into();
        let president_id = president_id.into();
        let mut members = BTreeMap::new();
        members.insert(
            president_id.clone(),
            Membership {
                organization_id: id.clone(),
                user_id: president_id,
                role: OrgRole::President,
                joined_at: Utc::now(),
            },
        );

        Self {
            id,
            name: name.into(),
            members,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, action: &str, actor_id: &str, membership: &Membership) {
        if let Some(bus) = &self.events {
            publish(bus, action, Some(actor_id), membership);
        }
    }

    pub fn role_of(&self, user_id: &str) -> Option<OrgRole> {
        self.members.get(user_id).map(|m| m.role)
    }

    pub fn president(&self) -> Option<&str> {
        self.members
            .values()
            .find(|m| m.role == OrgRole::President)
            .map(|m| m.user_id.as_str())
    }

    pub fn members(&self) -> impl Iterator<Item = &Membership> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Admit `user_id` as a `MEMBER`. The actor must be allowed to hand out
    /// the `MEMBER` rank.
    pub fn add_member(&mut self, actor_id: &str, actor_global: Role, user_id: &str) -> AppResult<&Membership> {
        let actor = self.role_of(actor_id);
        if !assignable_roles(actor, actor_global).contains(&OrgRole::Member) {
            return Err(AppError::forbidden("not allowed to add members"));
        }
        if self.members.contains_key(user_id) {
            return Err(AppError::conflict(format!("{user_id} is already a member")));
        }

        tracing::info!(organization_id = %self.id, actor_id = %actor_id, user_id = %user_id, "member added");
        let membership = Membership {
            organization_id: self.id.clone(),
            user_id: user_id.to_string(),
            role: OrgRole::Member,
            joined_at: Utc::now(),
        };
        self.emit("added", actor_id, &membership);
        Ok(&*self.members.entry(user_id.to_string()).or_insert(membership))
    }

    /// Change the rank of another member. The actor must outrank the target's
    /// current rank and be allowed to assign the new one.
    pub fn assign_role(
        &mut self,
        actor_id: &str,
        actor_global: Role,
        target_id: &str,
        role: OrgRole,
    ) -> AppResult<&Membership> {
        if role == OrgRole::President {
            return Err(AppError::bad_request("presidency can only be transferred"));
        }
        if actor_id == target_id {
            return Err(AppError::forbidden("cannot change your own role"));
        }

        let current = self
            .role_of(target_id)
            .ok_or_else(|| AppError::not_found(format!("{target_id} is not a member")))?;
        let actor = self.role_of(actor_id);

        if !can_manage_user(actor, actor_global, current) {
            return Err(AppError::forbidden(format!("cannot manage a {current}")));
        }
        if !assignable_roles(actor, actor_global).contains(&role) {
            return Err(AppError::forbidden(format!("cannot assign {role}")));
        }
        if current == OrgRole::President {
            return Err(AppError::conflict("transfer presidency before demoting the president"));
        }

        let events = self.events.clone();
        let membership = self
            .members
            .get_mut(target_id)
            .ok_or_else(|| AppError::not_found(format!("{target_id} is not a member")))?;
        tracing::info!(
            organization_id = %membership.organization_id,
            actor_id = %actor_id,
            target_id = %target_id,
            from = %current,
            to = %role,
            "member role changed"
        );
        membership.role = role;
        if let Some(bus) = &events {
            publish(bus, "role_changed", Some(actor_id), &*membership);
        }
        Ok(&*membership)
    }

    /// Remove another member. Self-removal is never possible here; see [`Organization::leave`].
    pub fn remove_member(&mut self, actor_id: &str, actor_global: Role, target_id: &str) -> AppResult<Membership> {
        let target = self
            .role_of(target_id)
            .ok_or_else(|| AppError::not_found(format!("{target_id} is not a member")))?;
        let actor = self.role_of(actor_id);

        if !can_remove_user(actor, actor_global, target, actor_id, target_id) {
            return Err(AppError::forbidden(format!("cannot remove {target_id}")));
        }
        if target == OrgRole::President {
            return Err(AppError::conflict("transfer presidency before removing the president"));
        }

        tracing::info!(organization_id = %self.id, actor_id = %actor_id, target_id = %target_id, "member removed");
        let removed = self
            .members
            .remove(target_id)
            .ok_or_else(|| AppError::not_found(format!("{target_id} is not a member")))?;
        self.emit("removed", actor_id, &removed);
        Ok(removed)
    }

    /// Explicit self-removal.
    pub fn leave(&mut self, user_id: &str) -> AppResult<Membership> {
        match self.role_of(user_id) {
            None => Err(AppError::not_found(format!("{user_id} is not a member"))),
            Some(OrgRole::President) => Err(AppError::conflict("the president must transfer presidency before leaving")),
            Some(_) => {
                tracing::info!(organization_id = %self.id, user_id = %user_id, "member left");
                let left = self
                    .members
                    .remove(user_id)
                    .ok_or_else(|| AppError::not_found(format!("{user_id} is not a member")))?;
                self.emit("left", user_id, &left);
                Ok(left)
            }
        }
    }

    /// Hand the presidency to `target_id` in one step. The outgoing president
    /// becomes `demote_to` (`ADMIN` when unspecified).
    ///
    /// Allowed for the sitting president and for global managers.
    pub fn transfer_presidency(
        &mut self,
        actor_id: &str,
        actor_global: Role,
        target_id: &str,
        demote_to: Option<OrgRole>,
    ) -> AppResult<()> {
        let demote_to = demote_to.unwrap_or(OrgRole::Admin);
        if demote_to == OrgRole::President {
            return Err(AppError::bad_request("outgoing president needs a lower role"));
        }

        let current = self
            .president()
            .map(str::to_string)
            .ok_or_else(|| AppError::internal(format!("organization {} has no president", self.id)))?;

        if actor_id != current && !actor_global.is_organization_manager() {
            return Err(AppError::forbidden("only the president can transfer presidency"));
        }
        if target_id == current {
            return Err(AppError::bad_request(format!("{target_id} is already president")));
        }
        if !self.members.contains_key(target_id) {
            return Err(AppError::not_found(format!("{target_id} is not a member")));
        }

        for membership in self.members.values_mut() {
            if membership.user_id == current {
                membership.role = demote_to;
            } else if membership.user_id == target_id {
                membership.role = OrgRole::President;
            }
        }

        tracing::info!(
            organization_id = %self.id,
            actor_id = %actor_id,
            from = %current,
            to = %target_id,
            demoted_to = %demote_to,
            "presidency transferred"
        );
        if let Some(president) = self.members.get(target_id) {
            self.emit("presidency_transferred", actor_id, president);
        }
        Ok(())
    }
}
