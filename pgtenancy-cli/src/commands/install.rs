//! `pgtenancy install`: create the tenant registry.

use pgtenancy_log::debug;

use crate::app::App;
use crate::error::CliResult;
use crate::output::{info, success};

/// Create the `tenants` table on the default connection if missing.
pub async fn run(app: &App) -> CliResult<()> {
    let connection = &app.config().default_connection;
    info(&format!("Installing tenants table on connection '{}'...", connection));

    let store = app.store().await?;
    store.install().await?;

    debug!("Tenant registry installed on '{}'", connection);
    success("Tenants table is ready");
    Ok(())
}
