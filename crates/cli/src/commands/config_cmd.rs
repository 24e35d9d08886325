//! `llamaskill config`: Configuration management commands.

use std::path::Path;

use llamaskill_config::AppConfig;

use super::{config_file, load_config};

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let settings = match config.llama.resolve() {
        Ok(settings) => settings,
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Required settings present");

    println!();
    println!("   Input:     {}", settings.topic_input);
    println!("   Output:    {}", settings.topic_output);
    println!(
        "   Intention: {}",
        settings.topic_intention.as_deref().unwrap_or("(always active)")
    );
    println!("   Language:  {}", settings.language);
    println!("   Port:      {}", settings.port);
    println!("   Model:     {}", config.llama.model);
    println!("   Order:     {:?}", config.gate.match_order);
    Ok(())
}

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", config_file(config_path).display());
}

pub fn init(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_file(config_path);
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::sample_toml())?;
    println!("✅ Wrote sample config to {}", path.display());
    Ok(())
}
