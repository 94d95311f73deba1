//! `waypoint config` - Configuration management commands.

use waypoint_config::AppConfig;

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ok  Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ok  All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   !   {w}");
                }
            }

            println!();
            println!("   UTC offset:   {:+}", config.utc_offset_hours);
            println!("   Auto-chain:   {}", config.executor.max_auto_chain);
            println!(
                "   Fallbacks:    {} / {}",
                config.executor.ambiguity.business_fallback, config.executor.ambiguity.chat_fallback
            );
            println!("   Store:        {}", config.store.backend);
            println!(
                "   Gateway:      {}:{}",
                config.gateway.host, config.gateway.port
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Settings that load fine but are probably not what the operator wants.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.rules.curfew.override_active {
        warnings.push("Curfew override is active: night-time bookings are allowed");
    }
    if !config.rules.pii {
        warnings.push("PII rule disabled: identity numbers will not be blocked");
    }
    if config.rules.financial.review_threshold.is_none() {
        warnings.push("No review threshold: large payments go through without confirmation");
    }
    if config.store.backend == "memory" {
        warnings.push("In-memory store: conversations are lost on restart");
    }
    if config.gateway.host == "0.0.0.0" {
        warnings.push("Gateway bound to 0.0.0.0");
    }
    warnings
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".waypoint"));
    }

    #[test]
    fn defaults_only_warn_about_nothing() {
        assert!(warnings(&AppConfig::default()).is_empty());
    }

    #[test]
    fn risky_settings_are_flagged() {
        let mut config = AppConfig::default();
        config.rules.curfew.override_active = true;
        config.store.backend = "memory".into();
        assert_eq!(warnings(&config).len(), 2);
    }
}
