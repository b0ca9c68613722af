use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;

use crate::{authz, context, guard, models, org, routes, session};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::permissions::role_permissions,
		routes::permissions::check_permissions,
		routes::permissions::route_access,
		routes::access::evaluate,
		routes::access::context_from_path,
		routes::organizations::list_assignable_roles,
		routes::organizations::can_manage,
		routes::organizations::can_remove
	),
	components(
		schemas(
			routes::health::HealthResponse,
			authz::Role,
			authz::Permission,
			org::OrgRole,
			session::ScopeKind,
			session::ScopeRef,
			session::ScopeSelection,
			context::ContextIds,
			guard::GuardState,
			guard::DenialReason,
			guard::Redirect,
			models::permission::RolePermissionsResponse,
			models::permission::CheckMode,
			models::permission::PermissionCheckRequest,
			models::permission::PermissionResult,
			models::permission::PermissionCheckResponse,
			models::permission::RouteAccessResponse,
			models::access::EvaluateRequest,
			models::access::EvaluateResponse,
			models::organization::AssignableRolesRequest,
			models::organization::AssignableRolesResponse,
			models::organization::CanManageRequest,
			models::organization::CanRemoveRequest,
			models::organization::AllowedResponse
		)
	),
	tags(
		(name = "Health", description = "Service health"),
		(name = "Permissions", description = "Role permission table"),
		(name = "Access", description = "Route guard decisions"),
		(name = "Organizations", description = "Organization rank rules")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes(doc: &utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let doc_json = Arc::new(serde_json::to_value(doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new().route("/api-docs/openapi.json", json_route))
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else {
		return;
	};
	let components = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()));
	let Some(components) = components.as_object_mut() else {
		return;
	};

	let addition = json!({
		"securitySchemes": {
			"bearerAuth": {
				"type": "http",
				"scheme": "bearer",
				"bearerFormat": "JWT"
			}
		}
	});
	if let Value::Object(addition) = addition {
		for (key, value) in addition {
			match components.get_mut(&key) {
				Some(existing) => merge_values(existing, &value),
				None => {
					components.insert(key, value);
				}
			}
		}
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

fn merge_values(target: &mut Value, addition: &Value) {
	match (target, addition) {
		(Value::Object(dest), Value::Object(src)) => {
			for (key, value) in src {
				if let Some(existing) = dest.get_mut(key) {
					merge_values(existing, value);
				} else {
					dest.insert(key.clone(), value.clone());
				}
			}
		}
		(Value::Array(dest), Value::Array(src)) => {
			for item in src {
				if !dest.contains(item) {
					dest.push(item.clone());
				}
			}
		}
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn document_lists_every_endpoint() {
		let doc = serde_json::to_value(build_openapi(8000).unwrap()).unwrap();
		let paths = doc["paths"].as_object().unwrap();
		for path in [
			"/api/health",
			"/api/permissions/{role}",
			"/api/permissions/check",
			"/api/routes/access",
			"/api/access/evaluate",
			"/api/context",
			"/api/organizations/assignable-roles",
			"/api/organizations/can-manage",
			"/api/organizations/can-remove",
		] {
			assert!(paths.contains_key(path), "missing {path}");
		}
		assert_eq!(doc["components"]["securitySchemes"]["bearerAuth"]["scheme"], "bearer");
		assert_eq!(doc["servers"][0]["url"], "http://localhost:8000");
	}
}
