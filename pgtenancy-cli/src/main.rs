//! pgtenancy CLI - operator tools for schema-per-tenant PostgreSQL.
//!
//! # Commands
//!
//! - `pgtenancy install` - Create the `tenants` table on the default connection
//! - `pgtenancy tenant create <slug>` - Provision and register a tenant
//! - `pgtenancy tenant update <id-or-slug>` - Change a tenant's domain or team
//! - `pgtenancy tenant delete <id-or-slug>` - Drop a tenant's schema, role and record
//! - `pgtenancy tenant list` - List registered tenants
//! - `pgtenancy migrate -- <command...>` - Run a migration command once per tenant
//! - `pgtenancy config` - Show the effective configuration, secrets masked
//! - `pgtenancy completions` - Generate shell completions
//!
//! Configuration comes from `--config` files, then `.env`, then `PGTENANCY_*`
//! environment variables.

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::Colorize;
use pgtenancy::CreateTenantRequest;
use pgtenancy_log::Level;
use std::io;

mod app;
mod commands;
mod error;
mod output;

use app::App;
use commands::migrate::MigrateOptions;
use commands::tenant::TenantUpdate;
use commands::{config, install, migrate, tenant};
use error::CliResult;

/// pgtenancy - schema-per-tenant PostgreSQL administration
#[derive(Parser)]
#[command(name = "pgtenancy")]
#[command(version)]
#[command(about = "Provision, inspect and migrate schema-per-tenant PostgreSQL databases")]
#[command(long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = format!(
    "{}\n  {} pgtenancy install\n  {} pgtenancy tenant create acme --domain acme.io\n  {} pgtenancy migrate -- sea-orm-cli migrate up\n",
    "Examples:".bright_cyan().bold(),
    "$".dimmed(),
    "$".dimmed(),
    "$".dimmed(),
))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (.toml, .json or .env); repeat to layer files
    #[arg(short, long = "config", global = true, value_name = "FILE")]
    config_files: Vec<String>,

    /// Load this .env file instead of ./.env
    #[arg(long, global = true, value_name = "FILE")]
    env_file: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress log output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tenants table
    Install,

    /// Manage tenants
    #[command(alias = "t")]
    Tenant {
        #[command(subcommand)]
        command: TenantCommands,
    },

    /// Run a migration command against every tenant schema
    #[command(alias = "m")]
    Migrate(MigrateArgs),

    /// Show the effective configuration
    #[command(alias = "c")]
    Config,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum TenantCommands {
    /// Provision a schema and role, then register the tenant
    #[command(alias = "new")]
    Create(CreateArgs),

    /// Change a tenant's domain or team
    Update(UpdateArgs),

    /// Drop a tenant's schema and role, then remove its record
    #[command(alias = "rm")]
    Delete {
        /// Tenant id or slug
        tenant: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// List tenants
    #[command(alias = "ls")]
    List,
}

#[derive(Args)]
struct CreateArgs {
    /// Unique tenant slug
    slug: String,

    /// Custom host name served by this tenant
    #[arg(long)]
    domain: Option<String>,

    /// Schema name to use instead of the derived `t_<slug>`
    #[arg(long)]
    schema: Option<String>,

    /// Owning team id
    #[arg(long)]
    team_id: Option<i64>,

    /// Role password to use instead of a generated one
    #[arg(long, env = "PGTENANCY_TENANT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl From<CreateArgs> for CreateTenantRequest {
    fn from(args: CreateArgs) -> Self {
        CreateTenantRequest {
            slug: args.slug,
            domain: args.domain,
            schema: args.schema,
            team_id: args.team_id,
            password: args.password,
        }
    }
}

#[derive(Args)]
struct UpdateArgs {
    /// Tenant id or slug
    tenant: String,

    /// New custom host name
    #[arg(long, conflicts_with = "no_domain")]
    domain: Option<String>,

    /// Remove the custom host name
    #[arg(long)]
    no_domain: bool,

    /// New owning team id
    #[arg(long, conflicts_with = "no_team")]
    team_id: Option<i64>,

    /// Detach the tenant from its team
    #[arg(long)]
    no_team: bool,
}

impl From<&UpdateArgs> for TenantUpdate {
    fn from(args: &UpdateArgs) -> Self {
        TenantUpdate {
            domain: match (&args.domain, args.no_domain) {
                (Some(domain), _) => Some(Some(domain.clone())),
                (None, true) => Some(None),
                (None, false) => None,
            },
            team_id: match (args.team_id, args.no_team) {
                (Some(team_id), _) => Some(Some(team_id)),
                (None, true) => Some(None),
                (None, false) => None,
            },
        }
    }
}

#[derive(Args)]
struct MigrateArgs {
    /// Ask the runner to rebuild each schema from scratch
    #[arg(long)]
    fresh: bool,

    /// Ask the runner to seed after migrating
    #[arg(long)]
    seed: bool,

    /// Only migrate this tenant (id or slug); repeatable
    #[arg(long = "tenant", value_name = "TENANT")]
    tenants: Vec<String>,

    /// Migration command and its arguments
    #[arg(last = true, value_name = "COMMAND")]
    runner: Vec<String>,
}

impl From<MigrateArgs> for MigrateOptions {
    fn from(args: MigrateArgs) -> Self {
        MigrateOptions {
            fresh: args.fresh,
            seed: args.seed,
            tenants: args.tenants,
            runner: args.runner,
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    pgtenancy_log::init();
    if verbose {
        pgtenancy_log::set_level(Level::Debug);
    } else if quiet {
        pgtenancy_log::set_level(Level::Error);
    }

    // Routes sqlx/sea-orm tracing events; a subscriber may already be set.
    let _ = tracing::subscriber::set_global_default(pgtenancy_log::tracing_compat::subscriber());
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "pgtenancy", &mut io::stdout());
        return Ok(());
    }

    let app = App::load(&cli.config_files, cli.env_file.as_deref())?;

    match cli.command {
        Commands::Install => install::run(&app).await,
        Commands::Tenant { command } => match command {
            TenantCommands::Create(args) => tenant::create(&app, args.into()).await,
            TenantCommands::Update(args) => tenant::update(&app, &args.tenant, (&args).into()).await,
            TenantCommands::Delete { tenant: id, force } => tenant::delete(&app, &id, force).await,
            TenantCommands::List => tenant::list(&app).await,
        },
        Commands::Migrate(args) => migrate::run(&app, &args.into()).await,
        Commands::Config => config::show(&app),
        Commands::Completions { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = dispatch(cli).await {
        eprintln!("\n  {} {}\n", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_migrate_runner_after_double_dash() {
        let cli = Cli::parse_from([
            "pgtenancy",
            "migrate",
            "--fresh",
            "--tenant",
            "acme",
            "--",
            "sea-orm-cli",
            "migrate",
            "up",
        ]);

        let Commands::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        let options: MigrateOptions = args.into();
        assert!(options.fresh);
        assert!(!options.seed);
        assert_eq!(options.tenants, vec!["acme"]);
        assert_eq!(options.runner, vec!["sea-orm-cli", "migrate", "up"]);
    }

    #[test]
    fn test_update_flags() {
        let cli = Cli::parse_from(["pgtenancy", "tenant", "update", "acme", "--no-domain", "--team-id", "9"]);
        let Commands::Tenant {
            command: TenantCommands::Update(args),
        } = cli.command
        else {
            panic!("expected tenant update");
        };

        let update = TenantUpdate::from(&args);
        assert_eq!(update.domain, Some(None));
        assert_eq!(update.team_id, Some(Some(9)));
    }

    #[test]
    fn test_update_domain_conflicts_with_no_domain() {
        let result = Cli::try_parse_from([
            "pgtenancy",
            "tenant",
            "update",
            "acme",
            "--domain",
            "acme.io",
            "--no-domain",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_config_files() {
        let cli = Cli::parse_from(["pgtenancy", "tenant", "list", "-c", "base.toml", "--config", "prod.env"]);
        assert_eq!(cli.config_files, vec!["base.toml", "prod.env"]);
    }
}
