use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use campus_gate::authz::{effective_role, AccessControl, PolicyEvaluator, Principal, Role};
use campus_gate::context::parse_context_ids;
use campus_gate::events::verify_chain;
use campus_gate::guard::{AccessGuard, GuardConfig, GuardState, RouteRegistry};
use campus_gate::org::{assignable_roles, can_manage_user, OrgRole};
use campus_gate::session::{SessionSnapshot, SessionTokens};

#[derive(Parser, Debug)]
#[command(author, version, about = "campus-gate access policy tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the permissions granted to a role
    Permissions { role: String },
    /// Check permissions against a role (all must hold unless --any)
    Check {
        role: String,
        #[arg(required = true)]
        permissions: Vec<String>,
        #[arg(long)]
        any: bool,
    },
    /// Whether a role may open a console path
    Route { role: String, path: String },
    /// Print the scope ids recoverable from a path
    Parse { path: String },
    /// Run the route guard for a path, signed in with --role or anonymous
    Guard {
        path: String,
        #[arg(long)]
        role: Option<Role>,
        /// Institute-specific role, as INSTITUTE_ID=ROLE
        #[arg(long, value_parser = parse_institute_role)]
        institute_role: Vec<(String, Role)>,
    },
    /// Organization roles an actor may assign
    Assignable {
        global_role: Role,
        #[arg(long)]
        org_role: Option<OrgRole>,
    },
    /// Whether an actor may manage a member holding TARGET_ROLE
    CanManage {
        global_role: Role,
        target_role: OrgRole,
        #[arg(long)]
        org_role: Option<OrgRole>,
    },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Recompute the audit log hash chain
    AuditVerify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();
    let access = AccessControl::new();

    match cli.command {
        Commands::Permissions { role } => {
            let permissions = access.get_permissions_str(&role);
            if permissions.is_empty() {
                println!("{role}: no permissions");
            }
            for permission in permissions {
                println!("{permission}");
            }
        }
        Commands::Check { role, permissions, any } => {
            let mut granted = Vec::with_capacity(permissions.len());
            for permission in &permissions {
                let ok = access.has_permission_str(&role, permission);
                println!("{:<7} {}", if ok { "granted" } else { "denied" }, permission);
                granted.push(ok);
            }
            let allowed = if any {
                granted.iter().any(|ok| *ok)
            } else {
                granted.iter().all(|ok| *ok)
            };
            println!("{}", if allowed { "allowed" } else { "denied" });
        }
        Commands::Route { role, path } => {
            let allowed = Role::parse(&role).is_some_and(|role| access.can_access_route(role, &path));
            println!("{}", if allowed { "allowed" } else { "denied" });
        }
        Commands::Parse { path } => {
            println!("{}", serde_json::to_string_pretty(&parse_context_ids(&path))?);
        }
        Commands::Guard { path, role, institute_role } => {
            run_guard(&path, role, institute_role)?;
        }
        Commands::Assignable { global_role, org_role } => {
            let roles = assignable_roles(org_role, global_role);
            if roles.is_empty() {
                println!("none");
            }
            for role in roles {
                println!("{role}");
            }
        }
        Commands::CanManage { global_role, target_role, org_role } => {
            let allowed = can_manage_user(org_role, global_role, target_role);
            println!("{}", if allowed { "allowed" } else { "denied" });
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::AuditVerify => {
            let pool = get_pool().await?;
            match verify_chain(&pool).await? {
                None => println!("audit chain intact"),
                Some(seq) => anyhow::bail!("audit chain broken at entry {seq}"),
            }
        }
    }

    Ok(())
}

fn parse_institute_role(value: &str) -> Result<(String, Role), String> {
    let (institute, role) = value
        .split_once('=')
        .ok_or_else(|| format!("expected INSTITUTE_ID=ROLE, got {value}"))?;
    let role = role.parse::<Role>().map_err(|err| err.to_string())?;
    Ok((institute.to_string(), role))
}

fn run_guard(path: &str, role: Option<Role>, institute_roles: Vec<(String, Role)>) -> anyhow::Result<()> {
    let registry = RouteRegistry::console();
    let Some(route) = registry.find(path) else {
        println!("{path}: not a protected route");
        return Ok(());
    };

    let session = match role {
        Some(role) => {
            let user = institute_roles
                .into_iter()
                .fold(Principal::new("cli", "cli", role), |user, (institute, role)| {
                    user.with_institute_role(institute, role)
                });
            SessionSnapshot {
                user: Some(user),
                tokens: Some(SessionTokens::new("cli")),
                scope: Default::default(),
            }
        }
        None => SessionSnapshot::default(),
    };

    let config = GuardConfig::from_env()?;
    let mut guard = AccessGuard::new(route.requirement.clone(), config.into());

    println!("route: {}", route.pattern);
    if let Some(user) = &session.user {
        println!("effective role: {}", effective_role(user, &session.scope));
    }
    match guard.evaluate(&session, path) {
        GuardState::Denied { reason, redirect } => {
            println!("denied: {reason}");
            println!("redirect: {}", redirect.to);
        }
        other => println!("{}", other.name()),
    }
    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?
        .is_some();
    let applied_versions: HashSet<i64> = if has_table {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when run from the repo root, else the crate's own.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
