//! opencode-cli: 在终端里启动 OpenCode 后端、查看会话、发送提示。
//!
//! Usage:
//!   opencode-cli serve                      Run the backend until Ctrl-C
//!   opencode-cli health                     Probe the backend health endpoint
//!   opencode-cli sessions                   List sessions
//!   opencode-cli prompt <text> [--no-stream]
//!   opencode-cli version | help

use anyhow::{anyhow, bail, Context};
use futures::StreamExt;
use opencode_runtime::client::ClientConfig;
use opencode_runtime::{
    BackendConfig, BackendConnection, BackendSupervisor, EventStreamClient, OpencodeClientBuilder,
    OrchestratorConfig, PromptReply, SessionOrchestrator, StartOutcome, StreamEvent,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Options {
    port: Option<u16>,
    command: Option<String>,
    dir: Option<PathBuf>,
    no_spawn: bool,
    no_stream: bool,
    positional: Vec<String>,
}

fn parse_options(args: &[String]) -> anyhow::Result<Options> {
    let mut opts = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--port" => {
                let value = iter.next().ok_or_else(|| anyhow!("--port needs a value"))?;
                opts.port = Some(value.parse().with_context(|| format!("bad port: {value}"))?);
            }
            "--command" => {
                opts.command = Some(
                    iter.next()
                        .ok_or_else(|| anyhow!("--command needs a value"))?
                        .clone(),
                );
            }
            "--dir" => {
                opts.dir = Some(PathBuf::from(
                    iter.next().ok_or_else(|| anyhow!("--dir needs a value"))?,
                ));
            }
            "--no-spawn" => opts.no_spawn = true,
            "--no-stream" => opts.no_stream = true,
            flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
            _ => opts.positional.push(arg.clone()),
        }
    }
    Ok(opts)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "version" | "--version" | "-V" => {
            println!("opencode-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        command => match parse_options(&args[2..]) {
            Ok(opts) => run(command, opts).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        match e.downcast_ref::<opencode_runtime::Error>() {
            Some(err) => eprintln!("error: {}", err.user_message()),
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"opencode-cli: OpenCode 后端命令行工具

USAGE:
    opencode-cli <COMMAND> [OPTIONS]

COMMANDS:
    serve                       Start the backend and keep it running until Ctrl-C
    health                      Show backend health and version
    sessions                    List sessions
    prompt <text>               Send a prompt to a new session and print the reply
    version                     Show version information
    help                        Show this help message

OPTIONS:
    --port <port>               Backend port (default 4096)
    --command <path>            Backend executable (default "opencode")
    --dir <path>                Project directory the backend runs in
    --no-spawn                  Use an already running backend
    --no-stream                 Wait for the whole reply instead of streaming it

ENVIRONMENT:
    OPENCODE_COMMAND, OPENCODE_PORT, OPENCODE_HTTP_TIMEOUT_SECS,
    OPENCODE_CONNECT_TIMEOUT_SECS, RUST_LOG"#
    );
}

fn backend_config(opts: &Options) -> BackendConfig {
    let mut cfg = BackendConfig::from_env();
    if let Some(port) = opts.port {
        cfg = cfg.with_port(port);
    }
    if let Some(command) = &opts.command {
        cfg = cfg.with_command(command.clone());
    }
    if let Some(dir) = &opts.dir {
        cfg = cfg.with_working_dir(dir.clone());
    }
    cfg
}

/// Clients for the backend, plus the supervisor when this process spawned it.
async fn connect(
    opts: &Options,
) -> anyhow::Result<(Option<BackendSupervisor>, BackendConnection)> {
    let cfg = backend_config(opts);
    if opts.no_spawn {
        let base_url = cfg.base_url();
        let client_cfg: ClientConfig = cfg.client.clone().with_base_url(base_url.clone());
        let client = OpencodeClientBuilder::from_config(client_cfg).build()?;
        let events = EventStreamClient::new(&base_url, &cfg.client.transport, cfg.client.retry.clone())?;
        let connection = BackendConnection {
            port: cfg.port,
            base_url,
            client,
            events: Arc::new(events),
        };
        return Ok((None, connection));
    }

    let supervisor = BackendSupervisor::new(cfg);
    let connection = supervisor.ensure_started().await?;
    Ok((Some(supervisor), connection))
}

async fn run(command: &str, opts: Options) -> anyhow::Result<()> {
    if command == "serve" {
        return serve(opts).await;
    }

    let (supervisor, connection) = connect(&opts).await?;
    let result = match command {
        "health" => health(&connection).await,
        "sessions" => sessions(&connection).await,
        "prompt" => prompt(&connection, &opts).await,
        other => Err(anyhow!("unknown command: {other} (see `opencode-cli help`)")),
    };

    if let Some(supervisor) = supervisor {
        supervisor.stop().await?;
    }
    result
}

async fn serve(opts: Options) -> anyhow::Result<()> {
    let supervisor = BackendSupervisor::new(backend_config(&opts));
    match supervisor.start().await? {
        StartOutcome::Started { port, version } => {
            println!("backend {version} listening on 127.0.0.1:{port}")
        }
        StartOutcome::AlreadyRunning { port } => println!("backend already running on {port}"),
    }
    tokio::signal::ctrl_c().await?;
    println!("stopping backend");
    supervisor.stop().await?;
    Ok(())
}

async fn health(connection: &BackendConnection) -> anyhow::Result<()> {
    let health = connection.client.health().await?;
    println!(
        "{} (version {}) at {}",
        if health.healthy { "healthy" } else { "unhealthy" },
        if health.version.is_empty() { "unknown" } else { &health.version },
        connection.base_url
    );
    Ok(())
}

async fn sessions(connection: &BackendConnection) -> anyhow::Result<()> {
    let sessions = connection.client.list_sessions().await?;
    if sessions.is_empty() {
        println!("no sessions");
    }
    for session in sessions {
        println!("{}  {}", session.id, session.display_title());
    }
    Ok(())
}

async fn prompt(connection: &BackendConnection, opts: &Options) -> anyhow::Result<()> {
    let text = opts.positional.join(" ");
    if text.trim().is_empty() {
        bail!("usage: opencode-cli prompt <text> [--no-stream]");
    }

    let orchestrator = SessionOrchestrator::from_connection(
        connection,
        OrchestratorConfig::default().streaming(!opts.no_stream),
    );
    match orchestrator.send_prompt(&text).await? {
        PromptReply::Complete(response) => println!("{}", response.text()),
        PromptReply::Streaming(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(event) = stream.next().await {
                match event {
                    StreamEvent::TextDelta { text } => {
                        print!("{text}");
                        stdout.flush().ok();
                    }
                    StreamEvent::ToolUse { name, .. } => eprintln!("\n[tool] {name}"),
                    StreamEvent::MessageComplete { .. } => break,
                    StreamEvent::Error { message } => {
                        println!();
                        bail!("stream failed: {message}");
                    }
                    _ => {}
                }
            }
            println!();
        }
    }
    Ok(())
}
