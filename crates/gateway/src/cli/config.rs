//! `fame config validate` / `fame config show`.

use std::path::Path;

use fame_domain::config::{Config, ConfigSeverity};

/// Validate and print issues. Returns false when any error-severity issue
/// exists.
pub fn validate(config: &Config, path: &Path) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{}: OK", path.display());
        return true;
    }
    for issue in &issues {
        println!("{issue}");
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    println!(
        "{} issue(s), {errors} error(s)",
        issues.len()
    );
    errors == 0
}

/// Print the effective config as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => println!("failed to render config: {e}"),
    }
}
