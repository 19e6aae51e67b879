//! `pgtenancy config`: show the effective configuration.

use colored::Colorize;

use crate::app::App;
use crate::error::{CliError, CliResult};

/// Print the merged configuration as JSON with passwords and the key masked.
pub fn show(app: &App) -> CliResult<()> {
    let rendered = render(app)?;

    println!("  {}", "Effective configuration".bright_cyan().bold());
    println!();
    for line in rendered.lines() {
        println!("  {}", line);
    }
    Ok(())
}

fn render(app: &App) -> CliResult<String> {
    serde_json::to_string_pretty(&app.config().redacted()).map_err(|e| CliError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgtenancy::{ConnectionConfig, TenancyConfig, TenancyMode};

    #[test]
    fn test_render_masks_secrets() {
        let mut config = TenancyConfig {
            mode: TenancyMode::Path,
            key: Some("c2VjcmV0LWtleQ==".to_string()),
            ..TenancyConfig::default()
        };
        config.connections.insert(
            "pgsql".to_string(),
            ConnectionConfig::new("localhost", "app").with_credentials("admin", "hunter2"),
        );

        let rendered = render(&App::new(config)).unwrap();

        assert!(rendered.contains("\"mode\": \"path\""));
        assert!(rendered.contains("\"admin\""));
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("c2VjcmV0LWtleQ=="));
    }
}
