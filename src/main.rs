use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use miniq::client::{send_request, server_url};
use miniq::config::{QueueConfig, ServerConfig, DEFAULT_PORT};
use miniq::engine::{QueueEngine, StatusReport};
use miniq::scheduler::Job;
use miniq::server::{self, protocol::Request, protocol::Response};
use miniq::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "miniq")]
#[command(version)]
#[command(about = "A minimal local batch-job queue")]
#[command(propagate_version = true)]
struct Args {
    /// Server port
    #[arg(long, global = true, env = "MINIQ_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Output format for client commands
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the queue server
    Server(ServerArgs),

    /// Submit a script to the queue
    Submit {
        /// Path to an executable script
        script: PathBuf,

        /// Wall-time limit in minutes
        #[arg(short = 't', value_name = "MINUTES")]
        minutes: i64,

        /// Number of nodes
        #[arg(short = 'n', value_name = "NUM_NODES")]
        num_nodes: i64,
    },

    /// Show one job or all jobs
    Status {
        /// Job ID
        #[arg(long)]
        id: Option<u64>,
    },

    /// Delete a job, killing it if it is running
    Delete {
        /// Job ID
        id: u64,
    },
}

// =============================================================================
// Server
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,

    /// Maximum number of live jobs
    #[arg(long, default_value = "100")]
    max_queued: usize,

    /// Maximum number of jobs running at once
    #[arg(long, default_value = "4")]
    max_running: usize,

    /// Seconds between SIGTERM and SIGKILL when deleting a running job
    #[arg(long, default_value = "10")]
    grace_period_secs: u64,
}

async fn run_server(port: u16, args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let queue = QueueConfig::new(args.max_queued, args.max_running)
        .with_kill_grace_period(Duration::from_secs(args.grace_period_secs));
    let config = ServerConfig::new(SocketAddr::new(args.bind, port), queue);

    let engine = QueueEngine::start(config.queue.clone())?;
    let shutdown = install_shutdown_handler(engine.clone());

    let listener = TcpListener::bind(config.listen_addr).await?;
    server::serve(listener, engine, async move { shutdown.cancelled().await }).await?;

    tracing::info!("Server stopped");
    Ok(())
}

// =============================================================================
// Client
// =============================================================================

/// Send a request and return its job state, exiting on an error reply.
async fn request(port: u16, request: Request) -> Result<StatusReport, Box<dyn std::error::Error>> {
    match send_request(&server_url(port), &request).await? {
        Response::Ok { job_state } => Ok(job_state),
        Response::Error { error, message } => {
            eprintln!("Error ({}): {}", error, message);
            std::process::exit(1);
        }
    }
}

fn print_report(report: &StatusReport, output: &OutputFormat) -> Result<(), serde_json::Error> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            let jobs: Vec<&Job> = match report {
                StatusReport::Job(job) => vec![job],
                StatusReport::Jobs(jobs) => jobs.iter().collect(),
            };
            for job in jobs {
                println!("{:>4} {:>12}", job.id, job.state);
            }
        }
    }
    Ok(())
}

async fn handle_submit(
    port: u16,
    script: PathBuf,
    minutes: i64,
    num_nodes: i64,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = std::path::absolute(&script)?;
    if !script.is_file() {
        return Err(format!("{} is not a file", script.display()).into());
    }
    let cwd = std::env::current_dir()?;

    let report = request(
        port,
        Request::Submit {
            script,
            num_nodes,
            minutes,
            cwd,
        },
    )
    .await?;

    match (output, &report) {
        (OutputFormat::Table, StatusReport::Job(job)) => {
            println!("Job submitted successfully!");
            println!("Job ID: {}", job.id);
        }
        _ => print_report(&report, output)?,
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(args.port, server_args).await?;
        }
        Commands::Submit {
            script,
            minutes,
            num_nodes,
        } => {
            handle_submit(args.port, script, minutes, num_nodes, &args.output).await?;
        }
        Commands::Status { id } => {
            let report = request(args.port, Request::Status { id }).await?;
            print_report(&report, &args.output)?;
        }
        Commands::Delete { id } => {
            let report = request(args.port, Request::Delete { id }).await?;
            print_report(&report, &args.output)?;
        }
    }

    Ok(())
}
