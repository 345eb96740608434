//! The exprtree sample host.
//!
//! Provides the `exprtreec` command with the following subcommands:
//!
//! - `exprtreec demo` - Round-trip the sample graphs and compare results
//! - `exprtreec encode <scenario>` - Write a sample graph as portable JSON
//! - `exprtreec decode <file>` - Rebuild a graph from portable JSON
//!
//! Options:
//! - `--config` - Path to the config file (default `exprtree.toml`)

mod config;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use exprtree_host::sample::{self, Scenario};
use exprtree_host::{Evaluator, LambdaExpr, TypeRegistry, Value};
use exprtree_portable::{from_json, to_json, PortableNode, WireOptions};
use exprtree_serializer::ExpressionSerializer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "exprtreec", version, about = "Portable expression graph host")]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serialize, transmit and rebuild the sample graphs, then evaluate both
    Demo {
        /// Scenario to run (a, b, c, d or all)
        #[arg(long, default_value = "all")]
        scenario: String,
    },
    /// Write a sample graph as portable JSON
    Encode {
        /// Scenario to encode (a, b, c or d)
        scenario: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rebuild a graph from portable JSON and print it
    Decode {
        /// File holding a portable node
        file: PathBuf,

        /// Evaluate the rebuilt graph against the sample inputs
        #[arg(long)]
        eval: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    init_logging(&config);

    let types = sample::sample_registry();
    let options = WireOptions { pretty: config.output.pretty };
    let result = match cli.command {
        Commands::Demo { scenario } => demo(&types, &scenario, options),
        Commands::Encode { scenario, output } => encode(&types, &scenario, output.as_deref(), options),
        Commands::Decode { file, eval } => decode(&types, &file, eval),
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

/// RUST_LOG wins over the config file; `warn` otherwise.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.logging.filter.as_deref().unwrap_or("warn"))
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn scenarios(name: &str) -> Result<Vec<Scenario>, String> {
    if name.eq_ignore_ascii_case("all") {
        return Ok(Scenario::ALL.to_vec());
    }
    Scenario::from_name(name)
        .map(|s| vec![s])
        .ok_or_else(|| format!("unknown scenario '{}' (expected a, b, c, d or all)", name))
}

fn build(types: &TypeRegistry, scenario: Scenario) -> Result<LambdaExpr, String> {
    scenario
        .build(types)
        .map_err(|e| format!("failed to build scenario {}: {}", scenario.name(), e))
}

fn demo(types: &TypeRegistry, name: &str, options: WireOptions) -> Result<(), String> {
    let serializer = ExpressionSerializer::new(types);
    for scenario in scenarios(name)? {
        let original = build(types, scenario)?;
        let node = serializer.serialize_lambda(&original).map_err(|e| e.to_string())?;
        let json = to_json(&node, options).map_err(|e| e.to_string())?;
        let received = from_json(&json).map_err(|e| e.to_string())?;
        let rebuilt = serializer.deserialize_lambda(&received).map_err(|e| e.to_string())?;
        info!(scenario = scenario.name(), bytes = json.len(), "round trip complete");

        println!("scenario {}: {}", scenario.name(), original.to_expr());
        println!("{}", json);
        println!("rebuilt: {}", rebuilt.to_expr());
        let mut evaluator = Evaluator::new(types);
        for args in scenario.inputs(types) {
            let before = evaluator.call_lambda(&original, &args).map_err(|e| e.to_string())?;
            let after = evaluator.call_lambda(&rebuilt, &args).map_err(|e| e.to_string())?;
            let verdict = if before == after { "ok" } else { "MISMATCH" };
            println!("  {} -> {} | {} [{}]", render(&args), before, after, verdict);
            if before != after {
                return Err(format!("scenario {} changed behaviour after the round trip", scenario.name()));
            }
        }
    }
    Ok(())
}

fn encode(
    types: &TypeRegistry,
    name: &str,
    output: Option<&Path>,
    options: WireOptions,
) -> Result<(), String> {
    let scenario = Scenario::from_name(name)
        .ok_or_else(|| format!("unknown scenario '{}' (expected a, b, c or d)", name))?;
    let lambda = build(types, scenario)?;
    let node = ExpressionSerializer::new(types)
        .serialize_lambda(&lambda)
        .map_err(|e| e.to_string())?;
    let json = to_json(&node, options).map_err(|e| e.to_string())?;
    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
            eprintln!("  Encoded: {} ({} nodes)", path.display(), node.node_count());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn decode(types: &TypeRegistry, file: &Path, eval: bool) -> Result<(), String> {
    let json = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
    let node = from_json(&json).map_err(|e| e.to_string())?;
    let serializer = ExpressionSerializer::new(types);

    let PortableNode::Lambda(_) = &node else {
        let expr = serializer.deserialize(&node).map_err(|e| e.to_string())?;
        println!("{}", expr);
        if eval {
            let value = Evaluator::new(types).evaluate(&expr).map_err(|e| e.to_string())?;
            println!("  -> {}", value);
        }
        return Ok(());
    };

    let lambda = serializer.deserialize_lambda(&node).map_err(|e| e.to_string())?;
    println!("{}", lambda.to_expr());
    if eval {
        let inputs = sample_inputs(types, &lambda)?;
        let mut evaluator = Evaluator::new(types);
        for args in inputs {
            let value = evaluator.call_lambda(&lambda, &args).map_err(|e| e.to_string())?;
            println!("  {} -> {}", render(&args), value);
        }
    }
    Ok(())
}

/// Arguments for a decoded lambda: none for a parameterless lambda,
/// otherwise the inputs of a sample whose delegate type matches.
fn sample_inputs(types: &TypeRegistry, lambda: &LambdaExpr) -> Result<Vec<Vec<Value>>, String> {
    if lambda.parameters().is_empty() {
        return Ok(vec![Vec::new()]);
    }
    for scenario in Scenario::ALL {
        if build(types, scenario)?.delegate_type() == lambda.delegate_type() {
            return Ok(scenario.inputs(types));
        }
    }
    Err(format!("no sample inputs for a lambda of type '{}'", lambda.delegate_type()))
}

fn render(args: &[Value]) -> String {
    let parts: Vec<String> = args.iter().map(Value::describe).collect();
    format!("({})", parts.join(", "))
}
