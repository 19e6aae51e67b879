//! Per-tenant migration driver.
//!
//! The migration tool itself is external: for each tenant this activates a
//! tenancy context, then runs the given command with `DATABASE_URL` pointing
//! at the tenant's scoped connection.

use colored::Colorize;
use pgtenancy::prelude::*;
use pgtenancy_log::{debug, error};
use std::time::Instant;
use tokio::process::Command;

use crate::app::App;
use crate::error::{CliError, CliResult};
use crate::output::{info, step, success, warn};

/// Options for `pgtenancy migrate`
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Forwarded as `PGTENANCY_MIGRATE_FRESH=1`
    pub fresh: bool,
    /// Forwarded as `PGTENANCY_MIGRATE_SEED=1`
    pub seed: bool,
    /// Restrict to these ids or slugs
    pub tenants: Vec<String>,
    /// Program and arguments
    pub runner: Vec<String>,
}

/// Run the migration command once per tenant, stopping at the first failure.
pub async fn run(app: &App, options: &MigrateOptions) -> CliResult<()> {
    let (program, args) = options.runner.split_first().ok_or_else(|| {
        CliError::InvalidArgument(
            "missing migration command; pass it after `--`, e.g. `pgtenancy migrate -- sea-orm-cli migrate up`"
                .to_string(),
        )
    })?;

    let tenancy = app.tenancy()?;
    let store = app.store().await?;
    let tenants = select_tenants(store.list().await?, &options.tenants)?;

    if tenants.is_empty() {
        warn("No tenants to migrate.");
        return Ok(());
    }

    let start = Instant::now();
    let total = tenants.len();

    for (index, tenant) in tenants.into_iter().enumerate() {
        step(index + 1, total, &format!("Migrating {}", tenant.label()));
        let label = tenant.label();

        let mut context = tenancy.begin();
        let result = migrate_tenant(&mut context, tenant, program, args, options).await;
        let cleared = context.clear().await;

        if let Err(e) = result {
            error!("Migration failed for {}: {}", label, e);
            return Err(CliError::Command(format!("migration failed for {}: {}", label, e)));
        }
        cleared?;
    }

    println!();
    success(&format!(
        "Migrated {} tenant(s) in {:.2}s",
        total,
        start.elapsed().as_secs_f64()
    ));
    Ok(())
}

async fn migrate_tenant(
    context: &mut TenancyContext<pgtenancy_seaorm::SeaOrmConnectionFactory>,
    tenant: Tenant,
    program: &str,
    args: &[String],
    options: &MigrateOptions,
) -> CliResult<()> {
    context.initialize_for_tenant(tenant).await?;

    let (Some(tenant), Some(scoped)) = (context.current(), context.scoped_config()) else {
        return Err(CliError::Command("tenancy context was not activated".to_string()));
    };
    let env = runner_env(tenant, scoped, options)?;

    info(&format!("{} {}", program.cyan(), args.join(" ")));
    debug!("Running migration command for {}", tenant.slug);

    let status = Command::new(program).args(args).envs(env).status().await?;

    if status.success() {
        Ok(())
    } else {
        Err(CliError::Command(format!("{} exited with {}", program, status)))
    }
}

/// Environment handed to the migration command.
fn runner_env(
    tenant: &Tenant,
    scoped: &ConnectionConfig,
    options: &MigrateOptions,
) -> CliResult<Vec<(&'static str, String)>> {
    let mut env = vec![
        ("DATABASE_URL", scoped.to_url()?),
        ("PGTENANCY_TENANT", tenant.slug.clone()),
        (
            "PGTENANCY_SCHEMA",
            tenant.schema_name().unwrap_or_default().to_string(),
        ),
    ];
    if options.fresh {
        env.push(("PGTENANCY_MIGRATE_FRESH", "1".to_string()));
    }
    if options.seed {
        env.push(("PGTENANCY_MIGRATE_SEED", "1".to_string()));
    }
    Ok(env)
}

/// Keep the tenants named by id or slug, or all of them when none are named.
fn select_tenants(tenants: Vec<Tenant>, wanted: &[String]) -> CliResult<Vec<Tenant>> {
    if wanted.is_empty() {
        return Ok(tenants);
    }

    let matches = |tenant: &Tenant, key: &str| {
        tenant.slug == key || tenant.id.map(|id| id.to_string()).as_deref() == Some(key)
    };

    if let Some(missing) = wanted.iter().find(|key| !tenants.iter().any(|t| matches(t, key))) {
        return Err(CliError::InvalidArgument(format!("no tenant matches '{}'", missing)));
    }

    Ok(tenants
        .into_iter()
        .filter(|tenant| wanted.iter().any(|key| matches(tenant, key)))
        .collect())
}
