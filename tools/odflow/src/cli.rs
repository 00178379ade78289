//! CLI commands for odflow

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use odflow::{compute, CancellationToken, OdResult, PreparedNetwork, Problem, SchedulerConfig};

#[derive(Parser)]
#[command(name = "odflow")]
#[command(about = "Origin-destination impedance matrices and trip distribution", long_about = None)]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Every produced column
    Json,
    /// OD rows only
    Csv,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute the OD matrix of a problem file
    Run {
        /// Problem JSON (network, zones, limits, interaction, options)
        problem: PathBuf,

        /// Output file (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Scheduler configuration TOML
        #[arg(long)]
        config: Option<PathBuf>,

        /// Worker threads (0 = one per CPU)
        #[arg(long)]
        threads: Option<usize>,

        /// Origins admitted concurrently (0 = one per worker)
        #[arg(long)]
        max_in_flight: Option<usize>,
    },

    /// Validate a problem file without computing
    Check {
        /// Problem JSON
        problem: PathBuf,
    },
}

impl Cli {
    /// Install the tracing subscriber on stderr
    pub fn init_logging(&self) {
        let default = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr);
        match self.log_format {
            LogFormat::Text => builder.init(),
            LogFormat::Json => builder.json().init(),
        }
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run {
                problem,
                output,
                format,
                config,
                threads,
                max_in_flight,
            } => {
                let config = match &config {
                    Some(path) => SchedulerConfig::load(path)
                        .with_context(|| format!("loading config {}", path.display()))?,
                    None => SchedulerConfig::default(),
                }
                .with_overrides(threads, max_in_flight);
                config.validate()?;

                let problem = load_problem(&problem)?;
                let result = run_cancellable(problem, config).await?;
                write_result(&result, output.as_deref(), format)
            }
            Commands::Check { problem } => {
                let problem = load_problem(&problem)?;
                let net = PreparedNetwork::new(&problem, &problem.options)?;
                let layout = problem.options.resolve_layout(problem.limits.bounded());
                println!("nodes:             {}", net.nr_nodes());
                println!("edges:             {}", net.nr_edges());
                println!("start points:      {}", net.start_points.len());
                println!("end points:        {}", net.end_points.len());
                println!("origin zones:      {}", net.nr_org_zones());
                println!("destination zones: {}", net.nr_dst_zones());
                println!("result layout:     {layout:?}");
                println!("problem is valid");
                Ok(())
            }
        }
    }
}

fn load_problem(path: &Path) -> Result<Problem> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Problem::from_json(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Compute on a blocking thread; Ctrl-C cancels the token
async fn run_cancellable(problem: Problem, config: SchedulerConfig) -> Result<OdResult> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        })
    };

    let start = Instant::now();
    let task_cancel = cancel.clone();
    let result = tokio::task::spawn_blocking(move || {
        compute(&problem, &problem.options, &config, &task_cancel)
    })
    .await
    .context("computation task failed")??;
    watcher.abort();

    match result {
        Some(result) => {
            tracing::info!(
                rows = result.result_count,
                elapsed_s = start.elapsed().as_secs_f64(),
                "done"
            );
            Ok(result)
        }
        None => bail!("cancelled"),
    }
}

fn write_result(result: &OdResult, output: Option<&Path>, format: OutputFormat) -> Result<()> {
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut w = BufWriter::new(sink);
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut w, result)?;
            writeln!(w)?;
        }
        OutputFormat::Csv => write_csv(&mut w, result)?,
    }
    w.flush()?;
    Ok(())
}

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One line per OD row; undefined cells are empty, link sets space-separated
pub fn write_csv<W: Write>(w: &mut W, result: &OdResult) -> io::Result<()> {
    let b = &result.buffers;

    let mut header = vec!["org_zone"];
    let columns = [
        ("dst_zone", b.dst_zone.is_some()),
        ("impedance", b.impedance.is_some()),
        ("alt_impedance", b.alt_impedance.is_some()),
        ("link_attribute_sum", b.link_attribute_sum.is_some()),
        ("start_point", b.start_point.is_some()),
        ("end_point", b.end_point.is_some()),
        ("link_set", b.link_set.is_some()),
    ];
    header.extend(columns.iter().filter(|(_, on)| *on).map(|(name, _)| *name));
    writeln!(w, "{}", header.join(","))?;

    for (row, org) in result.row_origins().enumerate() {
        let mut fields = vec![org.to_string()];
        if let Some(col) = &b.dst_zone {
            fields.push(col[row].to_string());
        }
        for col in [&b.impedance, &b.alt_impedance, &b.link_attribute_sum].into_iter().flatten() {
            fields.push(cell(col[row]));
        }
        for col in [&b.start_point, &b.end_point].into_iter().flatten() {
            fields.push(cell(col[row]));
        }
        if let Some(col) = &b.link_set {
            let links: Vec<String> = col[row].iter().map(|e| e.to_string()).collect();
            fields.push(links.join(" "));
        }
        writeln!(w, "{}", fields.join(","))?;
    }
    Ok(())
}
