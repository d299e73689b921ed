//! Tokentree driver binary.
//!
//! # Usage
//!
//! ```bash
//! # Interactive: ten nodes in a binary tree, node 0 holds the token
//! tokentree
//!
//! # Scripted: node 8 and node 3 request, node 5 fails, then wait 20 s
//! tokentree --script "c8 c3 f5" --settle-ms 20000
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use tokentree_core::{NodeConfig, Topology};
use tokentree_proto::NodeId;
use tokentree_runtime::{Cluster, ClusterConfig, DriverCommand, prompt, report};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Fault-tolerant tree token mutual exclusion
#[derive(Parser, Debug)]
#[command(name = "tokentree")]
#[command(about = "Run a tree of nodes sharing one critical-section token")]
#[command(version)]
struct Args {
    /// Number of nodes
    #[arg(short, long, default_value = "10", value_parser = node_count())]
    nodes: u32,

    /// Children per tree node
    #[arg(long, default_value = "2")]
    fanout: u32,

    /// Initial token holder
    #[arg(long, default_value = "0")]
    root: u32,

    /// Time a node spends in the critical section
    #[arg(long, default_value = "5000")]
    cs_duration_ms: u64,

    /// Time a failed node stays down before recovering
    #[arg(long, default_value = "5000")]
    failure_duration_ms: u64,

    /// Hand over the token together with a pending request
    #[arg(long)]
    combine_privilege_and_request: bool,

    /// File receiving every node's history at exit
    #[arg(long, default_value = "history.txt")]
    history_file: PathBuf,

    /// Run these commands instead of reading stdin
    #[arg(short, long)]
    script: Option<String>,

    /// Time to let the cluster run after bootstrap and after a script
    #[arg(long, default_value = "100")]
    settle_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn node_count() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(1..=i64::from(Topology::MAX_NODES))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = ClusterConfig {
        nodes: args.nodes,
        fanout: args.fanout,
        root: NodeId(args.root),
        node: NodeConfig {
            cs_duration: Duration::from_millis(args.cs_duration_ms),
            failure_duration: Duration::from_millis(args.failure_duration_ms),
            combine_privilege_and_request: args.combine_privilege_and_request,
            ..NodeConfig::default()
        },
    };
    let settle = Duration::from_millis(args.settle_ms);

    report::reset_history_file(&args.history_file).await?;

    let cluster = Cluster::spawn(&config)?;
    cluster.designate_root(cluster.root())?;
    tokio::time::sleep(settle).await;

    let mut stdout = tokio::io::stdout();
    match &args.script {
        Some(script) => {
            apply_line(&cluster, script, args.nodes, &mut stdout).await?;
            tokio::time::sleep(settle).await;
        },
        None => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                stdout.write_all(prompt(args.nodes).as_bytes()).await?;
                stdout.flush().await?;

                let Some(line) = lines.next_line().await? else { break };
                if !apply_line(&cluster, &line, args.nodes, &mut stdout).await? {
                    break;
                }
            }
        },
    }

    let histories = cluster.shutdown().await?;
    report::append_histories(&args.history_file, &histories).await?;
    tracing::info!(path = %args.history_file.display(), "histories written");

    Ok(())
}

/// Apply one line of driver tokens. Returns `false` once `e` is read.
async fn apply_line(
    cluster: &Cluster,
    line: &str,
    nodes: u32,
    stdout: &mut Stdout,
) -> Result<bool, Box<dyn std::error::Error>> {
    for parsed in DriverCommand::parse_line(line, nodes) {
        match parsed {
            Ok(DriverCommand::RequestCs(id)) => cluster.request_cs(id)?,
            Ok(DriverCommand::Fail(id)) => cluster.fail(id)?,
            Ok(DriverCommand::PrintHistory(id)) => {
                let history = cluster.dump_history(id).await?;
                stdout.write_all(history.render().as_bytes()).await?;
            },
            Ok(DriverCommand::Exit) => return Ok(false),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring token");
                stdout.write_all(format!("{}\n", DriverCommand::INVALID).as_bytes()).await?;
            },
        }
    }
    stdout.flush().await?;
    Ok(true)
}
