//! Command handlers for CLI operations
//!
//! - chat: interactive conversation at the terminal
//! - run: one request, one routing cycle
//! - doctor: validate configuration and check providers and calendar access
//! - config show: print the effective configuration

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::calendar::{CalendarSync, GoogleCalendarClient};
use crate::config::Config;
use crate::conversation::{
    Conversation, ConversationLoop, Roster, RunOutcome, TerminationReason, Turn, TurnBody,
};
use crate::llm::router::LLMRouter;
use crate::participants::{render_for_console, ConsoleHuman, DetachedHuman, Participant};
use crate::secrets::SecretStore;
use crate::session::{CycleOutcome, InMemorySessionStore, SessionManager};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// One line per turn, as shown by `run`
pub fn describe_turn(turn: &Turn) -> String {
    match &turn.body {
        TurnBody::Text { content } => format!("[{}] {}: {}", turn.seq, turn.source, content),
        TurnBody::ToolCall { tool, .. } => {
            format!("[{}] {} → {}(...)", turn.seq, turn.source, tool)
        }
        TurnBody::ToolResult { tool, message, .. } => {
            format!("[{}] {} ← {}: {}", turn.seq, turn.source, tool, message)
        }
        TurnBody::Error { message } => {
            format!("[{}] {} (error): {}", turn.seq, turn.source, message)
        }
    }
}

/// Interactive conversation; ends on the termination token or end of input
pub async fn handle_chat(config: &Config, format: OutputFormat) -> Result<()> {
    let human = Arc::new(ConsoleHuman::new());
    let participant = Arc::clone(&human) as Arc<dyn Participant>;
    let engine = ConversationLoop::from_config(config, participant, SecretStore::new());
    let mut conversation = Conversation::new(Roster::standard());

    if let OutputFormat::Text = format {
        println!(
            "Cadence study planner. Type {} to quit.",
            config.conversation.termination_token
        );
        println!();
    }

    // Interactive sessions are bounded by the iteration ceiling only
    let limits = engine.limits().with_max_turns(None);
    let result = engine
        .run_with(&mut conversation, &CancellationToken::new(), limits)
        .await;

    match format {
        OutputFormat::Text => {
            for line in render_for_console(&conversation.transcript, human.shown_seq()) {
                println!("{}", line);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&conversation)?);
        }
    }

    match result {
        Ok(RunOutcome::Terminated(TerminationReason::Token)) | Ok(RunOutcome::AwaitingHuman) => {
            Ok(())
        }
        Ok(other) => {
            tracing::info!("Chat ended: {:?}", other);
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("Conversation failed")),
    }
}

/// Send one request and run a single routing cycle
pub async fn handle_run(request: String, config: &Config, format: OutputFormat) -> Result<()> {
    let engine = ConversationLoop::from_config(config, Arc::new(DetachedHuman), SecretStore::new());
    let manager = SessionManager::new(Arc::new(InMemorySessionStore::new()), Arc::new(engine));

    let id = manager.create_conversation().await?;
    manager.append_human_turn(&id, &request).await?;

    if let OutputFormat::Text = format {
        println!("Request: {}", request);
        println!();
    }

    let report = manager
        .run_cycle_with(&id, Some(config.conversation.max_turns))
        .await
        .context("Failed to run conversation")?;

    match format {
        OutputFormat::Text => {
            for turn in &report.new_turns {
                println!("{}", describe_turn(turn));
            }
            println!();
            match report.outcome {
                CycleOutcome::Failed => println!("✗ Conversation failed"),
                _ => println!("✓ Cycle finished ({})", report.status),
            }
            if let Some(error) = &report.error {
                println!("  Error: {}", error);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    match (report.outcome, report.error) {
        (CycleOutcome::Failed, Some(error)) => Err(anyhow::anyhow!(error)),
        _ => Ok(()),
    }
}

/// Validate configuration and report provider and calendar health
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(String, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration".to_string(), "Valid".to_string()));

    if config.core.data_dir.exists() {
        checks.push(("Data directory".to_string(), "Exists".to_string()));
    } else {
        checks.push(("Data directory".to_string(), "Missing".to_string()));
        issues.push(format!(
            "Data directory does not exist: {}",
            config.core.data_dir.display()
        ));
    }

    let secrets = SecretStore::new();
    let router = LLMRouter::from_config(Arc::new(config.llm.clone()), secrets.clone());
    let health = router.check_health().await;
    for (name, healthy) in &health {
        let state = if *healthy { "Available" } else { "Not available" };
        checks.push((format!("Provider {}", name), state.to_string()));
    }
    if !health.iter().any(|(_, healthy)| *healthy) {
        issues.push(
            "No LLM providers available. Set GEMINI_API_KEY or OPENAI_API_KEY, or start Ollama."
                .to_string(),
        );
    } else if !health
        .iter()
        .any(|(name, healthy)| *healthy && *name == config.llm.default_provider)
    {
        issues.push(format!(
            "Default provider '{}' is not available; requests will fail over",
            config.llm.default_provider
        ));
    }

    let calendar = GoogleCalendarClient::new(&config.calendar, secrets);
    if calendar.check_health().await {
        checks.push(("Calendar token".to_string(), "Found".to_string()));
    } else {
        checks.push(("Calendar token".to_string(), "Missing".to_string()));
        issues.push(format!(
            "No calendar token. Set CADENCE_CALENDAR_TOKEN or provide {}",
            config.calendar.token_path.display()
        ));
    }

    match format {
        OutputFormat::Text => {
            println!("Cadence diagnostics");
            println!();
            for (name, state) in &checks {
                println!("  {:<24} {}", name, state);
            }
            println!();
            if issues.is_empty() {
                println!("✓ No issues found");
            } else {
                println!("Issues:");
                for issue in &issues {
                    println!("  - {}", issue);
                }
            }
        }
        OutputFormat::Json => {
            let checks: Vec<_> = checks
                .iter()
                .map(|(name, state)| json!({ "check": name, "status": state }))
                .collect();
            let output = json!({ "checks": checks, "issues": issues });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Print the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
            println!("{}", text);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}
