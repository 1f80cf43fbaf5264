use anyhow::Result;
use clap::{Parser, Subcommand};
use pipecore::{socket_types, DataValue, Graph, PortRef, RunEvent, Value};
use pipenodes::EchoInvoker;
use piperuntime::{BehaviorRegistry, DefinitionRegistry, PipelineRuntime};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pipegraph")]
#[command(about = "Pipeline graph CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline file
    Run {
        /// Path to pipeline JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Trigger payload as JSON string
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a pipeline file: unknown kinds, illegal edges, cycles
    Validate {
        /// Path to pipeline JSON file
        file: PathBuf,
    },

    /// List available node kinds
    Kinds,

    /// Create a new example pipeline
    Init {
        /// Output file path
        #[arg(short, long, default_value = "pipeline.json")]
        output: PathBuf,
    },
}

fn build_runtime() -> Result<PipelineRuntime> {
    let mut definitions = DefinitionRegistry::new();
    let mut behaviors = BehaviorRegistry::new();
    pipenodes::register_builtin(&mut definitions, &mut behaviors, Arc::new(EchoInvoker))?;
    Ok(PipelineRuntime::new(definitions, behaviors))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            verbose,
        } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::WARN
            };
            tracing_subscriber::fmt().with_max_level(level).init();

            run_pipeline(file, input).await?;
        }

        Commands::Validate { file } => {
            validate_pipeline(file)?;
        }

        Commands::Kinds => {
            list_kinds()?;
        }

        Commands::Init { output } => {
            create_example_pipeline(output)?;
        }
    }

    Ok(())
}

async fn run_pipeline(file: PathBuf, input: Option<String>) -> Result<()> {
    println!("Loading pipeline from: {}", file.display());

    let graph: Graph = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
    println!("  {} nodes, {} edges", graph.nodes.len(), graph.edges.len());
    println!();

    let trigger = match input {
        Some(raw) => {
            let value: Value = serde_json::from_str(&raw)?;
            Some(DataValue::new(socket_types::JSON, value))
        }
        None => None,
    };

    let runtime = build_runtime()?;

    // Stream run events to stdout while the pipeline executes
    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RunEvent::RunStarted { run_id, .. } => {
                    println!("Run {run_id} started");
                }
                RunEvent::NodeStarted { node_id, kind, .. } => {
                    println!("  > {kind} ({node_id})");
                }
                RunEvent::NodeCompleted {
                    node_id,
                    duration_ms,
                    ..
                } => {
                    println!("  + {node_id} completed in {duration_ms}ms");
                }
                RunEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ! {node_id} failed: {error}");
                }
                RunEvent::NodeSkipped { node_id, .. } => {
                    println!("  - {node_id} skipped");
                }
                RunEvent::PortData { node_id, port, .. } => {
                    println!("  ~ {node_id}:{port} streaming");
                }
                RunEvent::RunCompleted {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("Run completed in {duration_ms}ms");
                    } else {
                        println!("Run failed after {duration_ms}ms");
                    }
                }
            }
        }
    });

    let outcome = runtime.run(&graph, trigger).await?;

    // Let the listener drain before tearing it down
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    event_task.abort();

    println!();
    println!("Summary (run {}):", outcome.snapshot.run_id);
    for node in &graph.nodes {
        let status = outcome.snapshot.status(node.id);
        println!("  {} [{:?}]", node.display_label(), status);
        if let Some(outputs) = outcome.snapshot.outputs(node.id) {
            for (port, value) in outputs {
                println!("    {}: {}", port, value.value.render());
            }
        }
    }

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_pipeline(file: PathBuf) -> Result<()> {
    println!("Validating pipeline: {}", file.display());

    let graph: Graph = serde_json::from_str(&std::fs::read_to_string(&file)?)?;

    let runtime = build_runtime()?;
    let definitions = runtime.definitions();
    let sockets = runtime.sockets();

    for node in &graph.nodes {
        definitions.definition(&node.kind)?;
    }

    // Replay every edge through admission control against an edge-less
    // copy, so occupancy and capacity checks see the same sequence the
    // editor produced.
    let mut replay = Graph {
        nodes: graph.nodes.clone(),
        edges: Vec::new(),
    };
    for edge in &graph.edges {
        piperuntime::connect(
            definitions,
            sockets,
            &mut replay,
            edge.source.clone(),
            edge.target.clone(),
        )?;
    }

    println!("Pipeline is valid:");
    println!("  Nodes: {}", graph.nodes.len());
    println!("  Edges: {}", graph.edges.len());
    Ok(())
}

fn list_kinds() -> Result<()> {
    let runtime = build_runtime()?;
    let definitions = runtime.definitions();

    println!("Available node kinds:");
    for category in definitions.categories() {
        println!();
        println!("  [{category}]");
        for definition in definitions.list_by_category(category) {
            let ports = definition
                .params
                .iter()
                .filter(|p| p.socket.is_some())
                .map(|p| p.id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            println!("    {} ({}) ports: {}", definition.kind, definition.label, ports);
        }
    }
    Ok(())
}

fn create_example_pipeline(output: PathBuf) -> Result<()> {
    let runtime = build_runtime()?;
    let definitions = runtime.definitions();
    let sockets = runtime.sockets();

    let mut graph = Graph::new();
    let chat = graph.add_node(
        definitions
            .instantiate("chat-start", None)?
            .with_label("Chat Start"),
    );
    let tools = graph.add_node(
        definitions
            .instantiate("toolset", None)?
            .with_label("Search Tools")
            .with_value("toolset", "web-search"),
    );
    let agent = graph.add_node(
        definitions
            .instantiate("agent", None)?
            .with_label("Assistant")
            .with_value("name", "Assistant")
            .with_value("instructions", "Answer using the attached tools."),
    );
    let template = graph.add_node(
        definitions
            .instantiate("template", None)?
            .with_label("Render Reply")
            .with_expression("template", "Reply: {{ $('Assistant').content }}"),
    );

    let mut add_edge = |source: PortRef, target: PortRef| {
        piperuntime::connect(definitions, sockets, &mut graph, source, target)
    };
    add_edge(PortRef::new(chat, "output"), PortRef::new(agent, "input"))?;
    add_edge(PortRef::new(tools, "tools"), PortRef::new(agent, "tools"))?;
    add_edge(
        PortRef::new(agent, "output"),
        PortRef::new(template, "input"),
    )?;

    let json = serde_json::to_string_pretty(&graph)?;
    std::fs::write(&output, json)?;

    println!("Created example pipeline: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  pipegraph run --file {} --input '\"hello there\"'",
        output.display()
    );
    Ok(())
}
