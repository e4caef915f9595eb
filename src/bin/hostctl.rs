use clap::{Parser, Subcommand};
use host_reconciler_client::{ConnectionParams, HostClient};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hostctl")]
#[command(about = "Management CLI for the host reconciler", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// API key, sent as a bearer token
    #[arg(short, long, env = "HOSTCTL_API_KEY")]
    key: Option<String>,

    /// Acting user id, recorded as the host updater
    #[arg(long)]
    user: Option<u64>,

    #[arg(short, long)]
    project: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List hosts of the project
    List {
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
    /// Re-check hosts in the background
    Correct {
        #[arg(required = true)]
        ids: Vec<u64>,
    },
    /// Re-check hosts and print the correlation key
    CorrectProgress {
        #[arg(required = true)]
        ids: Vec<u64>,
        /// Poll until the batch settles
        #[arg(short, long)]
        watch: bool,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Show progress of a correction batch
    Progress { correct_key: String },
    /// Test connectivity of stored hosts, or of ad-hoc parameters
    Test {
        ids: Vec<u64>,
        #[arg(long, conflicts_with = "ids")]
        ip: Option<String>,
        #[arg(long, default_value_t = 22)]
        ssh_port: u16,
        #[arg(long, default_value = "root")]
        username: String,
        /// Password, or private key with --auth-mode key
        #[arg(long, env = "HOSTCTL_SECRET", default_value = "")]
        secret: String,
        #[arg(long, default_value = "password")]
        auth_mode: String,
        #[arg(long, default_value = "deploy")]
        class: String,
        #[arg(long)]
        app_port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let mut client = HostClient::new(&cli.url);
    if let Some(key) = cli.key {
        client = client.api_key(key);
    }
    if let Some(user) = cli.user {
        client = client.user_id(user);
    }
    let project = cli.project;

    match cli.command {
        Commands::List { search, page, size } => {
            print_json(&client.list_hosts(project, search.as_deref(), page, size).await?)?;
        }
        Commands::Correct { ids } => {
            let ids: BTreeSet<u64> = ids.into_iter().collect();
            print_json(&client.correct(project, &ids).await?)?;
        }
        Commands::CorrectProgress { ids, watch, interval_ms } => {
            let ids: BTreeSet<u64> = ids.into_iter().collect();
            let key = client.correct_with_progress(project, &ids).await?;
            println!("{key}");
            if watch {
                loop {
                    let progress = client.checking_progress(project, &key).await?;
                    eprintln!("{} {:.2}%", progress.status, progress.progress);
                    if progress.is_terminal() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }
        }
        Commands::Progress { correct_key } => {
            print_json(&client.checking_progress(project, &correct_key).await?)?;
        }
        Commands::Test { ids, ip, ssh_port, username, secret, auth_mode, class, app_port } => match ip {
            Some(host_ip) => {
                let params = ConnectionParams { host_ip, ssh_port, auth_mode, username, secret, class, app_port };
                print_json(&client.connection_test(project, &params).await?)?;
            }
            None if ids.len() == 1 => {
                // Detailed verdict; the server only allows this for deploy hosts.
                print_json(&client.deploy_host_connection_test(project, ids[0]).await?)?;
            }
            None if ids.is_empty() => {
                return Err("pass host ids or --ip".into());
            }
            None => {
                let ids: BTreeSet<u64> = ids.into_iter().collect();
                let failed = client.multi_connection_test(project, &ids).await?;
                print_json(&serde_json::json!({ "failed": failed }))?;
            }
        },
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
