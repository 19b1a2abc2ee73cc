//! underlamp-ctl - talk to underlampd over its socket

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use underlamp_api::{
    Command, EventPayload, OutcomeKind, ResponsePayload, StatusSnapshot,
};
use underlamp_ipc::{EventStream, IpcClient};
use underlamp_util::{OperationId, default_socket_path, format_datetime_full};

#[derive(Parser, Debug)]
#[command(name = "underlamp-ctl")]
#[command(about = "Start, extend and stop the game server through underlampd", long_about = None)]
struct Args {
    /// Socket path (or set UNDERLAMP_SOCKET env var)
    #[arg(short, long, env = "UNDERLAMP_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Print raw JSON payloads
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Action,
}

#[derive(ClapArgs, Debug)]
struct Credentials {
    /// Operator identity (as listed in the access list)
    #[arg(short, long, env = "UNDERLAMP_OPERATOR")]
    operator: String,

    /// Verification code
    #[arg(short, long)]
    code: String,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Show the lifecycle state and remaining time
    Status(Credentials),

    /// Boot the server for a number of minutes
    Start {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(short, long, default_value_t = 60)]
        minutes: u32,
        /// Return once the request is accepted
        #[arg(long)]
        no_wait: bool,
    },

    /// Push the auto-shutdown back
    Extend {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(short, long, default_value_t = 30)]
        minutes: u32,
        #[arg(long)]
        no_wait: bool,
    },

    /// Stop the server now
    Stop {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        no_wait: bool,
    },

    /// Mint a verification code (service user only)
    IssueCode {
        #[arg(short, long, env = "UNDERLAMP_OPERATOR")]
        operator: String,
    },

    /// Grant another operator access until the service restarts (admins only)
    AddOperator {
        #[command(flatten)]
        credentials: Credentials,
        /// Identity to add
        target: String,
        /// Name shown in notifications
        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Service health
    Health,

    /// Print events as they happen
    Watch,
}

fn print_status(status: &StatusSnapshot) {
    println!("State:     {}", status.state);
    if let Some(start) = &status.start_time {
        println!("Started:   {}", format_datetime_full(start));
    }
    if let Some(expire) = &status.expire_time {
        println!("Expires:   {}", format_datetime_full(expire));
    }
    if let Some(minutes) = status.remaining_minutes {
        println!("Remaining: {} min", minutes);
    }
}

fn describe_event(payload: &EventPayload) -> String {
    match payload {
        EventPayload::StateChanged(status) => match status.remaining_minutes {
            Some(minutes) => format!("state is {} ({} min left)", status.state, minutes),
            None => format!("state is {}", status.state),
        },
        EventPayload::OperationStarted { kind, actor, .. } => {
            format!("{} requested by {}", kind.as_str(), actor)
        }
        EventPayload::OperationFinished {
            kind,
            actor,
            outcome,
            message,
            ..
        } => format!("{} by {} {:?}: {}", kind.as_str(), actor, outcome, message),
        EventPayload::AutoShutdownAborted { reason } => {
            format!("auto-shutdown skipped: {}", reason)
        }
        EventPayload::Shutdown => "service is shutting down".into(),
    }
}

/// Send a lifecycle command and, unless told not to, wait for its outcome
async fn run_operation(args: &Args, command: Command, no_wait: bool) -> Result<()> {
    // Subscribe first so the outcome cannot be missed
    let mut events = if no_wait {
        None
    } else {
        Some(connect(args).await?.subscribe().await?)
    };

    let mut client = connect(args).await?;
    let operation_id = match client.request(command).await? {
        ResponsePayload::Accepted {
            operation_id,
            message,
        } => {
            println!("{}", message);
            operation_id
        }
        other => bail!("Unexpected response: {:?}", other),
    };

    match events.as_mut() {
        Some(events) => wait_for_outcome(events, &operation_id).await,
        None => Ok(()),
    }
}

async fn wait_for_outcome(events: &mut EventStream, operation_id: &OperationId) -> Result<()> {
    loop {
        let event = events.next().await.context("Lost connection to underlampd")?;
        match event.payload {
            EventPayload::OperationFinished {
                operation_id: finished,
                outcome,
                message,
                ..
            } if &finished == operation_id => {
                println!("{}", message);
                return match outcome {
                    OutcomeKind::Completed => Ok(()),
                    other => bail!("Operation ended as {:?}", other),
                };
            }
            EventPayload::Shutdown => bail!("underlampd shut down before the operation finished"),
            _ => {}
        }
    }
}

async fn connect(args: &Args) -> Result<IpcClient> {
    IpcClient::connect(&args.socket)
        .await
        .with_context(|| format!("Failed to connect to underlampd at {:?}", args.socket))
}

async fn run(args: Args) -> Result<()> {
    match &args.command {
        Action::Status(credentials) => {
            let payload = connect(&args)
                .await?
                .request(Command::GetStatus {
                    operator: credentials.operator.clone(),
                    code: credentials.code.clone(),
                })
                .await?;
            match payload {
                ResponsePayload::Status(status) if args.json => {
                    println!("{}", serde_json::to_string_pretty(&status)?)
                }
                ResponsePayload::Status(status) => print_status(&status),
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        Action::Start {
            credentials,
            minutes,
            no_wait,
        } => {
            let command = Command::Start {
                operator: credentials.operator.clone(),
                code: credentials.code.clone(),
                minutes: *minutes,
            };
            run_operation(&args, command, *no_wait).await?;
        }

        Action::Extend {
            credentials,
            minutes,
            no_wait,
        } => {
            let command = Command::Extend {
                operator: credentials.operator.clone(),
                code: credentials.code.clone(),
                minutes: *minutes,
            };
            run_operation(&args, command, *no_wait).await?;
        }

        Action::Stop {
            credentials,
            no_wait,
        } => {
            let command = Command::Stop {
                operator: credentials.operator.clone(),
                code: credentials.code.clone(),
            };
            run_operation(&args, command, *no_wait).await?;
        }

        Action::IssueCode { operator } => {
            let payload = connect(&args)
                .await?
                .request(Command::IssueCode {
                    operator: operator.clone(),
                })
                .await?;
            match payload {
                ResponsePayload::CodeIssued {
                    operator,
                    code,
                    expires_at,
                } => println!(
                    "Code for {}: {} (valid until {})",
                    operator,
                    code,
                    format_datetime_full(&expires_at)
                ),
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        Action::AddOperator {
            credentials,
            target,
            name,
        } => {
            let payload = connect(&args)
                .await?
                .request(Command::AddOperator {
                    operator: credentials.operator.clone(),
                    code: credentials.code.clone(),
                    target: target.clone(),
                    display_name: name.clone(),
                })
                .await?;
            match payload {
                ResponsePayload::OperatorAdded { target, added: true } => {
                    println!("{} can now request operations", target)
                }
                ResponsePayload::OperatorAdded { target, added: false } => {
                    println!("{} already had access", target)
                }
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        Action::Health => {
            let payload = connect(&args).await?.request(Command::GetHealth).await?;
            match payload {
                ResponsePayload::Health(health) if args.json => {
                    println!("{}", serde_json::to_string_pretty(&health)?)
                }
                ResponsePayload::Health(health) => println!(
                    "live={} ready={} store_ok={} state={}",
                    health.live, health.ready, health.store_ok, health.state
                ),
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        Action::Watch => {
            let mut events = connect(&args).await?.subscribe().await?;
            loop {
                let event = events.next().await.context("Lost connection to underlampd")?;
                if args.json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!(
                        "[{}] {}",
                        format_datetime_full(&event.timestamp),
                        describe_event(&event.payload)
                    );
                }
                if matches!(event.payload, EventPayload::Shutdown) {
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Args::parse()).await
}
