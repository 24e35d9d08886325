//! `llamaskill doctor`: Diagnose configuration and backend health.

use std::path::Path;

use llamaskill_agent::SessionConfigBuilder;
use llamaskill_core::provider::Provider;
use llamaskill_providers::OpenAiCompatProvider;

use super::{config_file, load_config};

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 llamaskill doctor");
    println!("====================\n");

    let mut issues = 0;

    let path = config_file(config_path);
    if !path.exists() {
        println!("  ⚠️  No config file at {} — run `llamaskill config init`", path.display());
        issues += 1;
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Cannot continue without a valid config.");
            return Err(e.into());
        }
    };

    match config.llama.resolve() {
        Ok(settings) => {
            println!("  ✅ Topics: {} → {}", settings.topic_input, settings.topic_output);
            if let Some(topic) = &settings.topic_intention {
                if settings.intentions.is_empty() {
                    println!("  ⚠️  Intention topic {topic} set but no intentions listed");
                    issues += 1;
                } else {
                    println!("  ✅ Intentions on {topic}: {}", settings.intentions.join(", "));
                }
            }
        }
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    if config.gate.topic_keywords.is_empty() {
        println!("  ⚠️  No topic keywords: every utterance will be answered");
    } else {
        println!(
            "  ✅ Gate: {} topic / {} ack keywords",
            config.gate.topic_keywords.len(),
            config.gate.ack_keywords.len()
        );
    }

    let session_config = SessionConfigBuilder::from_config(&config.llama).build();
    let provider = OpenAiCompatProvider::new(
        "local",
        session_config.base_url(),
        session_config.api_key(),
        session_config.request_timeout(),
    )?;

    match provider.health_check().await {
        Ok(true) => {
            println!("  ✅ Backend reachable at {}", provider.base_url());
            match provider.list_models().await {
                Ok(models) if !models.is_empty() => {
                    println!("  ✅ Models: {}", models.join(", "));
                }
                Ok(_) => println!("  ⚠️  Backend lists no models"),
                Err(e) => println!("  ⚠️  Could not list models: {e}"),
            }
        }
        Ok(false) => {
            println!("  ❌ Backend at {} answered with an error", provider.base_url());
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Backend at {} unreachable: {e}", provider.base_url());
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
