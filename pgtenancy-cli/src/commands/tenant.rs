//! Tenant management commands.

use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};
use pgtenancy::{CreateTenantRequest, Tenant};

use crate::app::App;
use crate::error::{CliError, CliResult};
use crate::output::{field, info, success, warn};

/// Provision a tenant and print its role password once.
pub async fn create(app: &App, request: CreateTenantRequest) -> CliResult<()> {
    info(&format!("Creating tenant {}...", request.slug.cyan()));

    let manager = app.tenant_manager().await?;
    let created = manager.create(request).await?;

    println!();
    success(&format!("Tenant {} created", created.tenant.label()));
    print_details(&created.tenant);
    field("password", &created.password.bright_white().bold().to_string());
    println!();
    warn("The password is stored encrypted and will not be shown again.");
    Ok(())
}

/// Drop a tenant's schema, role and record.
pub async fn delete(app: &App, id_or_slug: &str, force: bool) -> CliResult<()> {
    let manager = app.tenant_manager().await?;

    let tenant = manager
        .find(id_or_slug)
        .await?
        .ok_or_else(|| CliError::InvalidArgument(format!("no tenant matches '{}'", id_or_slug)))?;

    if !force {
        print_details(&tenant);
        println!();

        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "  Drop schema and role of {}? All tenant data is lost",
                tenant.slug
            ))
            .default(false)
            .interact()?;

        if !proceed {
            println!("\n  {} Deletion cancelled.", "✗".red());
            return Ok(());
        }
    }

    let deleted = manager.delete(id_or_slug).await?;
    success(&format!("Tenant {} deleted", deleted.label()));
    Ok(())
}

/// Requested changes to a tenant's mutable fields
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TenantUpdate {
    /// `Some(None)` removes the domain
    pub domain: Option<Option<String>>,
    /// `Some(None)` detaches the team
    pub team_id: Option<Option<i64>>,
}

impl TenantUpdate {
    pub fn is_empty(&self) -> bool {
        self.domain.is_none() && self.team_id.is_none()
    }
}

/// Change a tenant's domain or team.
pub async fn update(app: &App, id_or_slug: &str, update: TenantUpdate) -> CliResult<()> {
    if update.is_empty() {
        return Err(CliError::InvalidArgument(
            "nothing to update; pass --domain, --no-domain, --team-id or --no-team".to_string(),
        ));
    }

    let manager = app.tenant_manager().await?;

    let mut tenant = None;
    if let Some(domain) = update.domain {
        tenant = Some(manager.update_domain(id_or_slug, domain).await?);
    }
    if let Some(team_id) = update.team_id {
        tenant = Some(manager.assign_team(id_or_slug, team_id).await?);
    }

    if let Some(tenant) = tenant {
        success(&format!("Tenant {} updated", tenant.label()));
        print_details(&tenant);
    }
    Ok(())
}

/// Print all tenants as a table.
pub async fn list(app: &App) -> CliResult<()> {
    use pgtenancy::TenantStore;

    let store = app.store().await?;
    let tenants = store.list().await?;

    if tenants.is_empty() {
        info("No tenants yet. Create one with `pgtenancy tenant create <slug>`.");
        return Ok(());
    }

    let mut lines = render_table(&tenants).into_iter();
    if let Some(header) = lines.next() {
        println!("  {}", header.bold());
    }
    for line in lines {
        println!("  {}", line);
    }
    println!();
    println!("  {} tenant(s)", tenants.len());
    Ok(())
}

fn print_details(tenant: &Tenant) {
    field("slug", &tenant.slug);
    field("schema", tenant.schema_name().unwrap_or("-"));
    field("role", tenant.role_name().unwrap_or("-"));
    if let Some(ref domain) = tenant.domain {
        field("domain", domain);
    }
    if let Some(team_id) = tenant.team_id {
        field("team", &team_id.to_string());
    }
}

/// Header plus one line per tenant. Never includes credentials.
fn render_table(tenants: &[Tenant]) -> Vec<String> {
    let row = |cols: [&str; 7]| {
        format!(
            "{:<6} {:<20} {:<22} {:<22} {:<28} {:<6} {}",
            cols[0], cols[1], cols[2], cols[3], cols[4], cols[5], cols[6]
        )
        .trim_end()
        .to_string()
    };

    let mut lines = vec![row(["ID", "SLUG", "SCHEMA", "ROLE", "DOMAIN", "TEAM", "CREATED"])];
    for tenant in tenants {
        let id = tenant.id.map(|id| id.to_string()).unwrap_or_default();
        let team = tenant.team_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        let created = tenant
            .created_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        lines.push(row([
            id.as_str(),
            tenant.slug.as_str(),
            tenant.schema_name().unwrap_or("-"),
            tenant.role_name().unwrap_or("-"),
            tenant.domain.as_deref().unwrap_or("-"),
            team.as_str(),
            created.as_str(),
        ]));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_table() {
        let mut acme = Tenant::new("acme")
            .with_id(1)
            .with_schema("t_acme")
            .with_db_username("u_acme")
            .with_domain("acme.io");
        acme.db_password = Some("ciphertext".to_string());
        let bare = Tenant::new("globex").with_id(2);

        let lines = render_table(&[acme, bare]);

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].contains("t_acme"));
        assert!(lines[1].contains("acme.io"));
        assert!(!lines[1].contains("ciphertext"));
        assert!(lines[2].starts_with("2"));
        assert!(lines[2].contains("globex"));
    }

    #[test]
    fn test_update_is_empty() {
        assert!(TenantUpdate::default().is_empty());
        assert!(
            !TenantUpdate {
                team_id: Some(None),
                ..Default::default()
            }
            .is_empty()
        );
    }
}
