//! # Forest Bus CLI
//!
//! `fbus` sends messages to and reads messages from a Forest Bus cluster.
//!
//! ## Usage
//!
//! ```bash
//! # Send two messages and wait until a majority holds them
//! fbus -c mycluster -n 127.0.0.1:3000 -n 127.0.0.1:3001 send orders one two --commit
//!
//! # Send each line of a file
//! fbus -c mycluster -n 127.0.0.1:3000 send orders < messages.txt
//!
//! # Read from index 1, then keep following the topic
//! fbus -c mycluster -n 127.0.0.1:3000 get orders --index 1 --follow
//!
//! # Highest committed index of a topic
//! fbus -c mycluster -n 127.0.0.1:3000 max-index orders
//!
//! # Cluster membership and topics
//! fbus -c mycluster -n 127.0.0.1:3000 cluster
//! ```
//!
//! Logs go to stderr and default to `warn`; set `RUST_LOG` to see more.

use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use forestbus_client::{Client, ClientConfig};
use tokio::io::{AsyncBufReadExt, BufReader};


#[derive(FromArgs, Debug)]
/// Forest Bus command-line client
struct Cli {
    /// cluster id every node must report
    #[argh(option, short = 'c', long = "cluster-id")]
    cluster_id: String,

    /// node address (host:port); repeat for each node
    #[argh(option, short = 'n', long = "node")]
    nodes: Vec<String>,

    /// seconds to wait for a TCP connection to one node
    #[argh(option, default = "5")]
    connect_timeout: u64,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Commands {
    Send(SendArgs),
    Get(GetArgs),
    MaxIndex(MaxIndexArgs),
    Cluster(ClusterArgs),
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "send")]
/// send messages to a topic
struct SendArgs {
    /// topic to append to
    #[argh(positional)]
    topic: String,

    /// messages to send; each line of stdin is sent when none are given
    #[argh(positional)]
    messages: Vec<String>,

    /// wait until a majority of the cluster holds the messages
    #[argh(switch)]
    commit: bool,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "get")]
/// read messages from a topic
struct GetArgs {
    /// topic to read
    #[argh(positional)]
    topic: String,

    /// first index to read
    #[argh(option, default = "1")]
    index: u64,

    /// how many messages to ask for per call
    #[argh(option, default = "100")]
    quantity: u64,

    /// block until at least one message is available
    #[argh(switch)]
    wait: bool,

    /// keep reading new messages as they arrive
    #[argh(switch)]
    follow: bool,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "max-index")]
/// print the highest committed index of a topic
struct MaxIndexArgs {
    /// topic to inspect
    #[argh(positional)]
    topic: String,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "cluster")]
/// print the cluster id, peers and topics
struct ClusterArgs {}

impl Cli {
    fn client(&self) -> Result<Client> {
        let config = ClientConfig::new().with_connect_timeout(Duration::from_secs(self.connect_timeout));
        Client::with_config(self.cluster_id.clone(), self.nodes.clone(), config)
            .context("Failed to create client")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep stdout clean for piping; logs go to stderr
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let client = cli.client()?;
    let result = run(&client, cli.command).await;
    client.close().await;
    result
}

async fn run(client: &Client, command: Commands) -> Result<()> {
    match command {
        Commands::Send(args) => {
            let messages = if args.messages.is_empty() {
                read_stdin_lines().await?
            } else {
                args.messages
            };
            if messages.is_empty() {
                tracing::warn!(topic = %args.topic, "nothing to send");
                return Ok(());
            }

            let payloads = messages.into_iter().map(String::into_bytes).collect();
            let ids = client
                .send_messages(&args.topic, payloads, args.commit)
                .await
                .with_context(|| format!("Failed to send to topic '{}'", args.topic))?;
            for id in ids {
                println!("{}", id);
            }
        }
        Commands::Get(args) => {
            let mut index = args.index;
            loop {
                let batch = client
                    .get_messages(&args.topic, index, args.quantity, args.wait || args.follow)
                    .await
                    .with_context(|| format!("Failed to read topic '{}'", args.topic))?;
                for message in &batch.messages {
                    println!("{}", String::from_utf8_lossy(message));
                }
                tracing::debug!(topic = %args.topic, next_index = batch.next_index, "batch received");
                index = batch.next_index;
                if !args.follow {
                    break;
                }
            }
        }
        Commands::MaxIndex(args) => {
            let index = client
                .get_topic_max_index(&args.topic)
                .await
                .with_context(|| format!("Failed to get details of topic '{}'", args.topic))?;
            println!("{}", index);
        }
        Commands::Cluster(_) => {
            let details = client
                .cluster_details()
                .await
                .context("Failed to get cluster details")?;
            println!("cluster: {}", details.cluster_id);
            for peer in &details.peers {
                println!("peer: {}", peer);
            }
            for topic in &details.topics {
                println!("topic: {}", topic);
            }
        }
    }
    Ok(())
}

async fn read_stdin_lines() -> Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut messages = Vec::new();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if !line.is_empty() {
            messages.push(line);
        }
    }
    Ok(messages)
}
