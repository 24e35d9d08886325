//! `llamaskill chat`: talk to the gate directly, without a bus.

use std::io::Write;
use std::path::Path;

use llamaskill_agent::{ConversationSession, InboundGate, Outcome, SessionConfigBuilder};
use tokio::io::{self, AsyncBufReadExt, BufReader};

use super::{is_exit_command, load_config};

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let session_config = SessionConfigBuilder::from_config(&config.llama).build();
    let backend = session_config.base_url();
    let language = session_config.language().to_string();
    let session = ConversationSession::connect(session_config)?;
    let mut gate = InboundGate::from_config(&config.gate, session);

    if let Some(msg) = message {
        // Single message mode
        match gate.handle(&msg).await? {
            Outcome::Replied(reply) => println!("{reply}"),
            Outcome::Absorbed => eprintln!("(absorbed: no keyword matched)"),
            Outcome::Silent => eprintln!("(empty reply)"),
        }
        return Ok(());
    }

    println!();
    println!("  llamaskill — interactive chat");
    println!();
    println!("  Backend:   {backend}");
    println!("  Language:  {language}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_command(line) {
            break;
        }

        match gate.handle(line).await {
            Ok(Outcome::Replied(reply)) => {
                for text in reply.lines() {
                    println!("  Robot > {text}");
                }
            }
            Ok(Outcome::Absorbed) => println!("  (absorbed, {} turns)", gate.session().len()),
            Ok(Outcome::Silent) => println!("  (no reply)"),
            Err(e) => eprintln!("  [Error] {e}"),
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}
