use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;

use runconductor::config::ConductorConfig;
use runconductor::model::{NewDevice, NewEnvironment, NewTestConfiguration, RunStatus};
use runconductor::orchestrator::ReportRequest;

#[derive(Parser)]
#[command(
    name = "runconductor",
    about = "Test-run lifecycle orchestration for remote network test controllers",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $RUNCONDUCTOR_CONFIG, then ./runconductor.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + run monitors)
    Serve {
        /// Bind address, overriding the config file
        #[arg(long)]
        bind: Option<String>,
    },

    /// Manage test definitions and their remote mirrors
    Definition {
        #[command(subcommand)]
        action: DefinitionAction,
    },

    /// Manage test environments
    Environment {
        #[command(subcommand)]
        action: EnvironmentAction,
    },

    /// Manage devices under test
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },

    /// Launch, stop and inspect runs
    Run {
        #[command(subcommand)]
        action: RunAction,
    },

    /// Generate and maintain reports and charts
    Artifact {
        #[command(subcommand)]
        action: ArtifactAction,
    },
}

#[derive(Subcommand)]
enum DefinitionAction {
    /// Add a test configuration from a JSON payload file
    Add {
        #[arg(long)]
        name: String,

        /// Test type, e.g. strike, appsim, bandwidth
        #[arg(long)]
        test_type: String,

        /// JSON file with the controller test payload
        #[arg(long)]
        payload: PathBuf,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        created_by: Option<String>,
    },

    /// Sync a configuration to the controller, optionally with a new payload
    Push {
        #[arg(long)]
        id: i64,

        /// Replace the stored payload with this JSON file first
        #[arg(long)]
        payload: Option<PathBuf>,
    },

    /// Delete a configuration locally and on the controller
    Remove {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum EnvironmentAction {
    /// Register a test environment
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        ip: String,

        #[arg(long, default_value = "443")]
        port: u16,

        #[arg(long)]
        username: String,

        #[arg(long, env = "RUNCONDUCTOR_ENVIRONMENT_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
enum DeviceAction {
    /// Register a device under test
    Add {
        #[arg(long)]
        name: String,

        /// e.g. firewall, router, switch
        #[arg(long)]
        device_type: String,

        #[arg(long)]
        ip: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
enum RunAction {
    /// Launch a run of a configuration
    Launch {
        #[arg(long)]
        config_id: i64,

        #[arg(long)]
        environment_id: i64,

        #[arg(long)]
        device_id: i64,

        #[arg(long)]
        created_by: Option<String>,

        /// Keep monitoring in the foreground until the run settles
        #[arg(long)]
        wait: bool,
    },

    /// Stop a running run
    Stop {
        #[arg(long)]
        id: i64,
    },

    /// Show the stored run record
    Show {
        #[arg(long)]
        id: i64,
    },

    /// Query the controller once for the run's status
    Status {
        #[arg(long)]
        id: i64,
    },

    /// Show the run's result, fetching it on demand if needed
    Result {
        #[arg(long)]
        id: i64,
    },

    /// List recent runs
    List {
        /// Filter by status (pending, running, completed, failed, stopped)
        #[arg(long)]
        status: Option<RunStatus>,

        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum ArtifactAction {
    /// Generate a report for a settled run
    Report {
        #[arg(long)]
        run_id: i64,

        /// standard, executive, detailed or compliance
        #[arg(long = "type", default_value = "standard")]
        report_type: String,

        /// html, pdf or csv
        #[arg(long, default_value = "pdf")]
        format: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        created_by: Option<String>,
    },

    /// Generate the chart set for a settled run
    Charts {
        #[arg(long)]
        run_id: i64,

        #[arg(long)]
        created_by: Option<String>,
    },

    /// Delete stored files no report or chart record references
    Sweep,
}

/// Stderr logging for config resolution, before the configured subscriber exists.
fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

fn init_tracing(config: &ConductorConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = tracing::subscriber::with_default(bootstrap_subscriber(), || {
        ConductorConfig::resolve(cli.config.as_deref())
    })?;
    init_tracing(&config);
    match &config.source {
        Some(path) => tracing::info!(path = %path.display(), "loaded configuration"),
        None => tracing::debug!("using compiled-in configuration defaults"),
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.api.bind = bind;
            }
            tracing::info!(bind = %config.api.bind, "Starting runconductor daemon");
            runconductor::serve(&config).await?;
        }
        Commands::Definition { action } => {
            let orchestrator = runconductor::build_orchestrator(&config)?;
            match action {
                DefinitionAction::Add {
                    name,
                    test_type,
                    payload,
                    description,
                    created_by,
                } => {
                    let payload = runconductor::read_json_file(&payload)?;
                    let created = orchestrator.store().insert_configuration(&NewTestConfiguration {
                        name,
                        description,
                        test_type,
                        payload,
                        created_by,
                    })?;
                    print_json(&created)?;
                }
                DefinitionAction::Push { id, payload } => {
                    let config = match payload {
                        Some(path) => {
                            let payload = runconductor::read_json_file(&path)?;
                            orchestrator.revise_definition(id, payload).await?
                        }
                        None => {
                            let config = orchestrator.load_configuration(id)?;
                            orchestrator.update_remote_test(&config).await?;
                            orchestrator.load_configuration(id)?
                        }
                    };
                    print_json(&config)?;
                }
                DefinitionAction::Remove { id } => {
                    orchestrator.retire_definition(id).await?;
                    println!("Configuration {} removed.", id);
                }
            }
        }
        Commands::Environment { action } => {
            let store = runconductor::open_store(&config)?;
            match action {
                EnvironmentAction::Add {
                    name,
                    ip,
                    port,
                    username,
                    password,
                    description,
                } => {
                    let env = store.insert_environment(&NewEnvironment {
                        name,
                        description,
                        ip_address: ip,
                        port,
                        username,
                        password,
                        attributes: None,
                    })?;
                    print_json(&env)?;
                }
            }
        }
        Commands::Device { action } => {
            let store = runconductor::open_store(&config)?;
            match action {
                DeviceAction::Add {
                    name,
                    device_type,
                    ip,
                    description,
                } => {
                    let device = store.insert_device(&NewDevice {
                        name,
                        description,
                        device_type,
                        ip_address: ip,
                        credentials: None,
                        attributes: None,
                    })?;
                    print_json(&device)?;
                }
            }
        }
        Commands::Run { action } => {
            let orchestrator = runconductor::build_orchestrator(&config)?;
            match action {
                RunAction::Launch {
                    config_id,
                    environment_id,
                    device_id,
                    created_by,
                    wait,
                } => {
                    let run = orchestrator
                        .launch(config_id, environment_id, device_id, created_by.as_deref())
                        .await?;
                    print_json(&run)?;
                    if wait {
                        let outcome = orchestrator.monitors().join(run.id).await;
                        tracing::info!(run_id = run.id, ?outcome, "Monitor finished");
                        print_json(&orchestrator.load_run(run.id)?)?;
                    } else {
                        println!("Run {} launched; `runconductor serve` keeps monitoring it.", run.id);
                    }
                }
                RunAction::Stop { id } => print_json(&orchestrator.stop(id).await?)?,
                RunAction::Show { id } => print_json(&orchestrator.load_run(id)?)?,
                RunAction::Status { id } => print_json(&orchestrator.refresh_status(id).await?)?,
                RunAction::Result { id } => print_json(&orchestrator.result_for_run(id).await?)?,
                RunAction::List { status, limit } => {
                    let runs = orchestrator.store().list_runs(status, limit)?;
                    if runs.is_empty() {
                        println!("No runs found.");
                    } else {
                        println!("{:<6} | {:<10} | {:<25} | Remote run", "ID", "Status", "Started");
                        println!("{:-<6}-|-{:-<10}-|-{:-<25}-|-{:-<12}", "", "", "", "");
                        for run in runs {
                            let started = run
                                .start_time
                                .map(|t| t.to_rfc3339())
                                .unwrap_or_else(|| "-".to_string());
                            println!(
                                "{:<6} | {:<10} | {:<25} | {}",
                                run.id, run.status, started, run.remote_run_id
                            );
                        }
                    }
                }
            }
        }
        Commands::Artifact { action } => {
            let orchestrator = runconductor::build_orchestrator(&config)?;
            match action {
                ArtifactAction::Report {
                    run_id,
                    report_type,
                    format,
                    name,
                    description,
                    created_by,
                } => {
                    let generated = orchestrator
                        .generate_report(
                            run_id,
                            &ReportRequest {
                                report_type,
                                format,
                                name,
                                description,
                                created_by,
                            },
                        )
                        .await?;
                    print_json(&generated)?;
                }
                ArtifactAction::Charts { run_id, created_by } => {
                    let media = orchestrator
                        .generate_charts(run_id, created_by.as_deref())
                        .await?;
                    print_json(&media)?;
                }
                ArtifactAction::Sweep => {
                    let deleted = orchestrator.sweep_orphans().await?;
                    if deleted.is_empty() {
                        println!("No orphaned files.");
                    } else {
                        for path in &deleted {
                            println!("deleted {}", path);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
