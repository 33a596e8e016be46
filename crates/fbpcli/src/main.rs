// crates/fbpcli/src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use fbpcore::{Capacity, ComponentEvent, ExecutionEvent, Value};
use fbpnodes::{Collector, Delay, Logger, Map, Source};
use fbpruntime::{Network, NetworkConfig, StartupOrder};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fbp")]
#[command(about = "Flow-based programming network runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Source -> Map -> Logger -> Collector demo network
    Demo {
        /// Number of values emitted by the source
        #[arg(short, long, default_value_t = 5)]
        count: u32,

        /// Connection buffer size (unbuffered when omitted)
        #[arg(long)]
        capacity: Option<usize>,

        /// Delay each value by this many milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,

        /// Start downstream components before their senders
        #[arg(long)]
        downstream_first: bool,

        /// Print the wired topology as JSON before running
        #[arg(long)]
        topology: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List available standard components
    Components,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            count,
            capacity,
            delay_ms,
            downstream_first,
            topology,
            verbose,
        } => {
            init_logging(verbose);
            let config = NetworkConfig {
                default_capacity: capacity.map_or(Capacity::Unbuffered, Capacity::Bounded),
                startup_order: if downstream_first {
                    StartupOrder::DownstreamFirst
                } else {
                    StartupOrder::Registration
                },
                ..NetworkConfig::default()
            };
            run_demo(config, count, delay_ms, topology).await?;
        }

        Commands::Components => {
            list_components();
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

async fn run_demo(config: NetworkConfig, count: u32, delay_ms: u64, topology: bool) -> Result<()> {
    let mut network = Network::with_config(config);
    let collector = Collector::new("collect");
    let collected = collector.handle();

    network.add(Source::new("numbers", (1..=count).map(f64::from)))?;
    network.add(Map::new("square", |value: Value| {
        let n = value.as_f64().unwrap_or_default();
        Value::from(n * n)
    }))?;
    network.add(Logger::new("log"))?;
    network.add(collector)?;

    network.connect("numbers", "square")?;
    if delay_ms > 0 {
        network.add(Delay::from_millis("delay", delay_ms))?;
        network.connect("square", "delay")?;
        network.connect("delay", "log")?;
    } else {
        network.connect("square", "log")?;
    }
    network.connect("log", "collect")?;

    println!("🧩 Network {}", network.id());
    println!("   Components: {}", network.graph().len());
    println!("   Connections: {}", network.graph().connections().len());
    if topology {
        println!("{}", serde_json::to_string_pretty(network.graph().connections())?);
    }
    println!();

    let mut events = network.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::NetworkStarted { components, .. } => {
                    println!("▶️  Network started with {} components", components);
                }
                ExecutionEvent::ComponentStateChanged {
                    component, state, ..
                } => {
                    println!("  ⚡ {} -> {}", component, state);
                }
                ExecutionEvent::ComponentFailed {
                    component, error, ..
                } => {
                    println!("  ❌ {} failed: {}", component, error);
                }
                ExecutionEvent::ComponentEvent {
                    component, event, ..
                } => match event {
                    ComponentEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", component, message);
                    }
                    ComponentEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", component, message);
                    }
                },
                ExecutionEvent::NetworkCompleted {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("✨ Network completed successfully in {}ms", duration_ms);
                    } else {
                        println!("💥 Network completed with faults after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    network.run()?;
    let outcome = network.wait().await;

    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();
    outcome?;

    println!();
    println!("📤 Collected:");
    for value in collected.values().await {
        println!("   {:?}", value);
    }

    Ok(())
}

fn list_components() {
    println!("📦 Available Components:");
    println!();

    for info in fbpnodes::catalog() {
        println!("  • {} ({})", info.component_type, info.category);
        println!("    {}", info.description);
    }
}
