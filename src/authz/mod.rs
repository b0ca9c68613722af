//! Authorization module - permission table and role resolution
//!
//! This module implements:
//! - the closed set of global roles and permissions
//! - the static role -> permission table and route -> permission lookup
//! - effective-role resolution for the selected institute
//!
//! Organization ranks live in [`crate::org`].

mod evaluator;
mod permission;
mod principal;
mod resolver;
mod role;

pub use evaluator::{AccessControl, PolicyEvaluator};
pub use permission::{granted, route_permission, Permission, UnknownPermission};
pub use principal::Principal;
pub use resolver::{effective_role, organization_role};
pub use role::{Role, UnknownRole};
