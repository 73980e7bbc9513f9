// BFT-EC churn simulation
//
// Usage:
//   cargo run --bin bft_ec_sim
//   cargo run --bin bft_ec_sim scenarios/default.yaml
//   cargo run --bin bft_ec_sim scenarios/default.yaml --seed 0x1234... --csv results.csv

use std::env;
use std::path::PathBuf;

use bft_ec::ec_config::seed_to_hex;
use bft_ec::{LogSink, Network, Report, SimConfig, Simulator};
use log::{info, LevelFilter};
use rand::rngs::StdRng;
use rand::SeedableRng;
use simple_logger::SimpleLogger;

struct Args {
    config_path: Option<PathBuf>,
    seed: Option<String>,
    csv_path: Option<PathBuf>,
    trace_events: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        config_path: None,
        seed: None,
        csv_path: None,
        trace_events: false,
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--seed" => args.seed = iter.next(),
            "--csv" => args.csv_path = iter.next().map(PathBuf::from),
            "--events" => args.trace_events = true,
            "-h" | "--help" => {
                eprintln!("Usage: bft_ec_sim [config.yaml] [--seed SEED_HEX] [--csv PATH] [--events]");
                std::process::exit(0);
            }
            other => args.config_path = Some(PathBuf::from(other)),
        }
    }

    args
}

fn main() {
    let args = parse_args();

    SimpleLogger::new()
        .with_level(if args.trace_events {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init()
        .unwrap();

    let mut config = match &args.config_path {
        Some(path) => SimConfig::load(path).unwrap_or_else(|e| {
            eprintln!("Error loading {}: {}", path.display(), e);
            std::process::exit(1);
        }),
        None => SimConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }

    // the traced run and the batch share one seed
    let seed = config.pin_seed().unwrap_or_else(|e| {
        eprintln!("Invalid seed: {}", e);
        std::process::exit(1);
    });

    println!("╔════════════════════════════════════════════════════════╗");
    println!("║        BFT-EC Churn Simulator                          ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    info!("Configuration:");
    info!("  Nodes: {}", config.num_nodes);
    info!("  Byzantine fraction: {}", config.byzantine_fraction);
    info!("  Block size: {} MB", config.block_size_mb);
    info!("  Runs: {}", config.simulation_runs);
    info!("  Recovery repetitions: {}", config.recovery_repetitions);
    info!(
        "  Exit step / max: {} / {}",
        config.exit_percentage_step, config.max_exit_percentage
    );

    if args.trace_events {
        // single traced run with every event on the debug log
        let mut network =
            Network::new(&config, StdRng::from_seed(seed)).with_sink(Box::new(LogSink));
        network.initial_block_distribution();
        let retrieval = network.retrieve_block(config.block_size_bytes());
        info!("traced retrieval: {:?}", retrieval);
    }

    let simulator = Simulator::new(config.clone());
    let (runs, _) = simulator.run_all().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let report = Report::aggregate(&runs, config.unrecoverable_latency);
    report.print();

    if let Some(path) = args.csv_path {
        match report.write_csv(&path) {
            Ok(()) => info!("CSV written to {}", path.display()),
            Err(e) => eprintln!("Error writing CSV {}: {}", path.display(), e),
        }
    }

    info!("seed = 0x{}", seed_to_hex(&seed));
    info!("✓ Simulation complete!");
}
