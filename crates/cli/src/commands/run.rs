//! `llamaskill run`: the skill as a bus component, driven from stdin.
//!
//! Each stdin line is published as a text signal on the input topic;
//! replies on the output topic are printed. Runs until Ctrl+C or an exit
//! command.

use std::path::Path;
use std::sync::Arc;

use llamaskill_config::ServiceSettings;
use llamaskill_core::event::{
    Event, EventBus, EventPayload, InMemoryEventBus, IntentionSignal, TextSignal, timestamp_now,
};
use llamaskill_service::{LlamaService, ScenarioSource, StaticScenario};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::{is_exit_command, load_config};

pub async fn run(
    config_path: Option<&Path>,
    scenario: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let settings = config.llama.resolve()?;

    let scenario = Arc::new(
        scenario
            .map(StaticScenario::new)
            .unwrap_or_else(StaticScenario::generate),
    );
    let bus = Arc::new(InMemoryEventBus::default());

    let mut service = LlamaService::from_config(&config, bus.clone(), scenario.clone())?;

    print_banner(&settings, scenario.as_ref());

    let mut replies = bus.subscribe(&settings.topic_output)?;
    let printer = tokio::spawn(async move {
        while let Ok(event) = replies.recv().await {
            if let Some(text) = event.text_signal().and_then(|s| s.text.as_deref()) {
                println!("  Robot > {text}");
            }
        }
    });

    service.start().await?;

    // Activate the skill when it waits for an intention.
    if let Some(topic) = &settings.topic_intention {
        if !settings.intentions.is_empty() {
            info!(topic = %topic, intentions = ?settings.intentions, "Announcing intention");
            let intention = IntentionSignal::new(settings.intentions.iter().cloned());
            bus.publish(topic, Event::for_payload(EventPayload::Intention(intention)))?;
        }
    }

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if is_exit_command(line) {
                        break;
                    }
                    let now = timestamp_now();
                    let signal =
                        TextSignal::for_scenario(scenario.current_scenario_id(), now, now, line);
                    let event = Event::for_payload(EventPayload::Text(signal));
                    bus.publish(&settings.topic_input, event)?;
                }
                Ok(None) => {
                    info!("Input closed, still serving the bus until Ctrl+C");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
        }
    }

    service.stop().await?;
    printer.abort();
    println!("  Goodbye!");
    Ok(())
}

fn print_banner(settings: &ServiceSettings, scenario: &dyn ScenarioSource) {
    println!();
    println!("  llamaskill — running on an in-process bus");
    println!();
    println!("  Input:     {}", settings.topic_input);
    println!("  Output:    {}", settings.topic_output);
    if let Some(topic) = &settings.topic_intention {
        println!("  Intention: {topic} ({})", settings.intentions.join(", "));
    }
    println!("  Language:  {}", settings.language);
    println!("  Backend:   http://localhost:{}/v1", settings.port);
    println!("  Scenario:  {}", scenario.current_scenario_id());
    println!();
    println!("  Type an utterance and press Enter. Ctrl+C to quit.");
    println!();
}
