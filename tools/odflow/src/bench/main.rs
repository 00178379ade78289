//! Benchmark harness on synthetic grid networks
//!
//! Supports:
//! - Single-origin search timing with heap counters
//! - Full OD matrix runs (optionally bounded, optionally with trip distribution)
//!
//! Outputs: p50/p90/p99 times + counters

use std::time::Instant;

use clap::{Parser, Subcommand};
use hdrhistogram::Histogram;
use rand::prelude::*;

use odflow::options::{DecayFunction, Outputs};
use odflow::problem::{InteractionModel, Limits, Network, Problem, ZoneSide, ZoneValues};
use odflow::search::OriginSearch;
use odflow::{compute, CancellationToken, PreparedNetwork, SchedulerConfig, SearchOptions};

#[derive(Parser)]
#[command(name = "odflow-bench")]
#[command(about = "Benchmark harness for odflow performance testing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct GridArgs {
    /// Grid side length (side² nodes, bidirectional streets)
    #[arg(long, default_value = "200")]
    side: usize,

    /// Number of zones, each on a random node
    #[arg(long, default_value = "500")]
    zones: usize,

    /// Cutoff impedance (unbounded when absent)
    #[arg(long)]
    max_impedance: Option<f64>,

    /// Random seed for reproducibility
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Time single-origin searches on one thread
    Search {
        #[command(flatten)]
        grid: GridArgs,

        /// Number of origins to search
        #[arg(long, default_value = "200")]
        n_origins: usize,
    },

    /// Time complete OD matrix computations
    Matrix {
        #[command(flatten)]
        grid: GridArgs,

        /// Number of runs
        #[arg(long, default_value = "5")]
        runs: usize,

        /// Worker threads (0 = one per CPU)
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Also distribute trips with a power decay
        #[arg(long)]
        distribute: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search { grid, n_origins } => run_search_bench(&grid, n_origins),
        Commands::Matrix {
            grid,
            runs,
            threads,
            distribute,
        } => run_matrix_bench(&grid, runs, threads, distribute),
    }
}

/// Grid streets with random impedances, zones on random nodes
fn grid_problem(args: &GridArgs) -> Problem {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let side = args.side.max(2);
    let nr_nodes = side * side;
    let node = |r: usize, c: usize| (r * side + c) as u32;

    let mut network = Network {
        nr_nodes,
        ..Default::default()
    };
    for r in 0..side {
        for c in 0..side {
            if c + 1 < side {
                network.edge_from.push(node(r, c));
                network.edge_to.push(node(r, c + 1));
                network.impedance.push(rng.random_range(1.0..10.0));
            }
            if r + 1 < side {
                network.edge_from.push(node(r, c));
                network.edge_to.push(node(r + 1, c));
                network.impedance.push(rng.random_range(1.0..10.0));
            }
        }
    }

    let zone_nodes: Vec<u32> = (0..args.zones.max(1))
        .map(|_| rng.random_range(0..nr_nodes as u32))
        .collect();
    let side_of = |nodes: &[u32]| ZoneSide {
        nodes: Some(nodes.to_vec()),
        ..Default::default()
    };

    let mut options = SearchOptions {
        bidirectional: true,
        ..Default::default()
    };
    options.produce = Outputs {
        impedance: true,
        ..Default::default()
    };

    Problem {
        network,
        origins: side_of(&zone_nodes),
        destinations: side_of(&zone_nodes),
        limits: Limits {
            max_impedance: args.max_impedance.map(ZoneValues::Uniform),
            ..Default::default()
        },
        interaction: None,
        options,
    }
}

fn run_search_bench(grid: &GridArgs, n_origins: usize) -> anyhow::Result<()> {
    println!("═══════════════════════════════════════════════════════════════");
    println!("  SINGLE-ORIGIN SEARCH BENCHMARK");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Grid: {0}x{0}", grid.side);
    println!("  Zones: {}", grid.zones);
    println!("  Cutoff: {:?}", grid.max_impedance);
    println!("  Seed: {}", grid.seed);
    println!();

    let problem = grid_problem(grid);
    let options = &problem.options;
    let net = PreparedNetwork::new(&problem, options)?;
    let layout = options.resolve_layout(problem.limits.bounded());
    let search = OriginSearch::new(&net, options, layout, true);
    let mut scratch = search.make_scratch();

    let mut rng = StdRng::seed_from_u64(grid.seed ^ 0x5eed);
    let n_origins = n_origins.max(1);
    let origins: Vec<usize> = (0..n_origins)
        .map(|_| rng.random_range(0..net.nr_org_zones()))
        .collect();

    let mut hist = Histogram::<u64>::new(3)?;
    let mut settled = 0u64;
    let mut reached = 0u64;
    for &org in &origins {
        let start = Instant::now();
        settled += search.search(org, &mut scratch) as u64;
        hist.record(start.elapsed().as_micros() as u64)?;
        reached += scratch.accumulator.connected_count() as u64;
    }

    print_histogram_stats("Search", &hist);

    let stats = scratch.heap.stats();
    let n = n_origins as u64;
    println!();
    println!("───────────────────────────────────────────────────────────────");
    println!("  COUNTERS (averages)");
    println!("───────────────────────────────────────────────────────────────");
    println!("  Heap pushes:          {:>12}", format_number(stats.pushes as u64 / n));
    println!("  Heap pops:            {:>12}", format_number(stats.pops as u64 / n));
    println!("  Stale pops:           {:>12}", format_number(stats.stale_pops as u64 / n));
    println!("  Settled nodes:        {:>12}", format_number(settled / n));
    println!("  Reached zones:        {:>12}", format_number(reached / n));
    println!();

    Ok(())
}

fn run_matrix_bench(grid: &GridArgs, runs: usize, threads: usize, distribute: bool) -> anyhow::Result<()> {
    println!("═══════════════════════════════════════════════════════════════");
    println!("  OD MATRIX BENCHMARK");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Grid: {0}x{0}", grid.side);
    println!("  Zones: {}", grid.zones);
    println!("  Cutoff: {:?}", grid.max_impedance);
    println!("  Distribute: {}", distribute);
    println!("  Runs: {}", runs);
    println!();

    let mut problem = grid_problem(grid);
    if distribute {
        problem.interaction = Some(InteractionModel {
            decay: DecayFunction::Power { beta: 2.0 },
            org_mass: Some(ZoneValues::Uniform(100.0)),
            org_alpha: None,
            dst_mass: Some(ZoneValues::Uniform(1.0)),
            org_min_impedance: Some(ZoneValues::Uniform(1.0)),
            dst_min_impedance: None,
        });
        problem.options.produce.org_demand = true;
        problem.options.produce.dst_supply = true;
        problem.options.produce.link_flow = true;
    }

    let config = SchedulerConfig {
        worker_threads: threads,
        max_in_flight: 0,
        ..Default::default()
    };
    config.validate()?;
    let cancel = CancellationToken::new();

    let mut hist = Histogram::<u64>::new(3)?;
    let mut rows = 0usize;
    for i in 0..runs.max(1) {
        let start = Instant::now();
        let result = compute(&problem, &problem.options, &config, &cancel)?
            .ok_or_else(|| anyhow::anyhow!("run {i} cancelled"))?;
        hist.record(start.elapsed().as_millis() as u64)?;
        rows = result.result_count;
        print!("\r  Progress: {}/{}", i + 1, runs.max(1));
        std::io::Write::flush(&mut std::io::stdout())?;
    }
    println!();
    println!();

    println!("───────────────────────────────────────────────────────────────");
    println!("  Matrix timing (ms)");
    println!("───────────────────────────────────────────────────────────────");
    println!("    p50:    {:>10}", hist.value_at_quantile(0.50));
    println!("    p90:    {:>10}", hist.value_at_quantile(0.90));
    println!("    p99:    {:>10}", hist.value_at_quantile(0.99));
    println!("    max:    {:>10}", hist.max());
    println!();
    println!("  Rows per run: {}", format_number(rows as u64));
    let throughput = grid.zones as f64 / (hist.mean() / 1000.0);
    println!("  Throughput: {:.1} origins/sec", throughput);
    println!();

    Ok(())
}

fn print_histogram_stats(name: &str, hist: &Histogram<u64>) {
    println!("───────────────────────────────────────────────────────────────");
    println!("  {} timing (μs)", name);
    println!("───────────────────────────────────────────────────────────────");
    println!("    min:    {:>10.0}", hist.min() as f64);
    println!("    p50:    {:>10.0}", hist.value_at_quantile(0.50) as f64);
    println!("    p90:    {:>10.0}", hist.value_at_quantile(0.90) as f64);
    println!("    p99:    {:>10.0}", hist.value_at_quantile(0.99) as f64);
    println!("    max:    {:>10.0}", hist.max() as f64);
    println!("    mean:   {:>10.1}", hist.mean());
}

fn format_number(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        format!("{}", n)
    }
}
