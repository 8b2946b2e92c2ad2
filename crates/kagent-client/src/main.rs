//! kagent: interactive Kubernetes diagnosis agent.
//!
//! Connects to a kagent-server, hands its tool catalog to Claude, and
//! answers cluster questions from stdin until `q`/`quit`.

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use kagent_client::{
    AgentError, ClaudeClient, ClaudeConfig, DebugAgent, ToolTransport, WsTransport,
};

const SYSTEM_PROMPT: &str = "\
You are a skilled Kubernetes operations agent with read-only inspection \
tools for a live cluster. Use the tools to gather facts before answering; \
tool results are JSON, so parse them rather than quoting them verbatim. \
When reporting on pods, always include the namespace and status alongside \
the pod name. When asked for pod counts, answer per namespace and give the \
total. For questions about pod-to-pod communication, fetch the network \
policies and reason about their ingress and egress rules before making an \
assessment. If a tool call fails, say what failed and work with what you \
have.";

#[derive(Parser)]
#[command(name = "kagent", about = "Kubernetes diagnostic agent CLI")]
struct Args {
    /// kagent-server WebSocket URL.
    #[arg(long, default_value = "ws://127.0.0.1:5001")]
    server_url: String,

    /// Claude model to use.
    #[arg(long)]
    model: Option<String>,

    /// Maximum model rounds per question.
    #[arg(long, default_value_t = 10)]
    max_turns: u32,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kagent_client=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ClaudeConfig::from_env()
        .expect("Claude API not configured; set ANTHROPIC_API_KEY")
        .with_system_prompt(SYSTEM_PROMPT);
    if let Some(model) = &args.model {
        config = config.with_model(model);
    }
    let model = ClaudeClient::new(config);

    let transport = WsTransport::connect(&args.server_url)
        .await
        .expect("failed to connect to kagent-server");

    println!(
        "Connected to {} ({} tools)",
        args.server_url,
        transport.catalog().len()
    );
    let mut agent = DebugAgent::new(model, transport).with_max_turns(args.max_turns);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"k8s> ").await.expect("stdout closed");
        stdout.flush().await.expect("stdout closed");

        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "q" | "quit" | "exit") {
            break;
        }

        match agent.run(query).await {
            Ok(answer) => println!("{answer}\n"),
            Err(AgentError::MaxTurnsExceeded { turns, trace }) => {
                eprintln!("gave up after {turns} rounds without a final answer");
                eprintln!("partial trace ({} turns):", trace.len());
                for turn in trace {
                    eprintln!("  {}", serde_json::to_string(&turn).unwrap());
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                if matches!(e, AgentError::TransportClosed) {
                    break;
                }
            }
        }
    }

    agent.transport().close().await;
    tracing::info!(
        tokens = agent.usage().total_tokens(),
        "Session finished"
    );
}
