use finance_agent_session::{
    agent::SessionController,
    config::SessionConfig,
    models::{ActionRequest, Decision, TurnOutcome},
    runtime::{RetryingRuntime, ScriptedRuntime, StepEvent},
    state::InMemorySessionStore,
    tracker::TracingSink,
    SessionSeed,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SessionConfig::from_env()?;
    info!(
        max_turns = config.max_turns,
        approval_timeout_secs = config.approval_timeout.as_secs(),
        "Finance agent session demo starting"
    );

    // Canned agent behaviour: look up a quote, then ask before trading
    let scripted = ScriptedRuntime::new();
    scripted
        .push_script(vec![
            Ok(StepEvent::StepMarker {
                node: "task".into(),
                subagent: Some("market-data-fetcher".into()),
            }),
            Ok(StepEvent::ToolCall {
                call_id: "call-1".into(),
                tool_name: "get_stock_quote".into(),
                arguments: serde_json::json!({"ticker": "AAPL"}),
            }),
            Ok(StepEvent::ToolResult {
                call_id: "call-1".into(),
                tool_name: "get_stock_quote".into(),
                result: r#"{"ticker": "AAPL", "price": 150.0}"#.into(),
                success: true,
            }),
            Ok(StepEvent::FinalMessage {
                text: "AAPL is trading at $150.00.".into(),
            }),
        ])
        .await;
    scripted
        .push_interrupt(
            "demo-thread",
            vec![ActionRequest::new(
                "update_investment_holding",
                serde_json::json!({"ticker": "AAPL", "shares": 10, "action": "buy"}),
            )
            .with_description("Buy 10 shares of AAPL at market price")],
        )
        .await;
    scripted
        .push_reply("Bought 10 shares of AAPL. Portfolio updated.")
        .await;

    let runtime = RetryingRuntime::new(scripted, config.retry.clone());
    let controller = SessionController::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(runtime),
        config,
    )
    .with_sink(Arc::new(TracingSink));

    let mut files = BTreeMap::new();
    files.insert(
        "/financial_data/portfolio.json".to_string(),
        r#"{"holdings": []}"#.to_string(),
    );
    let session_id = controller
        .create_session(SessionSeed {
            primer: Some("User is a long-term investor with moderate risk tolerance.".into()),
            files,
        })
        .await?;

    println!("\n=== SESSION {} ===", session_id);

    for message in ["What's AAPL trading at?", "Buy 10 shares of AAPL"] {
        println!("\n> {}", message);
        let mut outcome = controller.submit_turn(&session_id, message).await?;

        while let TurnOutcome::AwaitingApproval { requests } = &outcome {
            println!("Approval required:");
            for request in requests {
                println!(
                    "  - {} {}",
                    request.tool_name,
                    request.description.as_deref().unwrap_or("")
                );
            }
            println!("  (approving all)");
            let decisions = vec![Decision::Approve; requests.len()];
            outcome = controller.submit_decisions(&session_id, decisions).await?;
        }

        if let TurnOutcome::Completed { final_text } = &outcome {
            println!("{}", final_text);
        }
    }

    println!("\n=== HISTORY ===");
    for (i, turn) in controller.get_history(&session_id).await?.iter().enumerate() {
        println!("  {}: {}", i + 1, turn.user_message);
        println!("     {}", turn.response.as_deref().unwrap_or("(no response)"));
    }

    Ok(())
}
