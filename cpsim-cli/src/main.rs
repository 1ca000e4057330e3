//! `cpsim` — run a computational-pattern simulation experiment.
//!
//! Loads the model-input dictionaries, builds the runtime against the
//! built-in network model, drains the timeline, and writes measurement,
//! summary, and trace outputs.

use anyhow::{Context, Result};
use clap::Parser;
use cpsim_core::engine::{RunOptions, Runtime};
use cpsim_core::model::desc::{
    CompPatternDict, CpInitDict, DevExecDict, ExpParamsDesc, FuncExecDict, MappingDict,
    SharedCfgDict, TopoDesc,
};
use cpsim_core::model::load::load_file;
use cpsim_core::portal::SimpleNetwork;
use cpsim_core::report::{self, TimeUnits};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cpsim", about = "Discrete-event simulation of computational patterns")]
struct Args {
    /// Experiment name, stamped on every output file.
    #[arg(long)]
    name: String,

    /// Directory holding the model-input files.
    #[arg(long, env = "CPSIM_INPUTDIR")]
    inputdir: PathBuf,

    /// Directory the outputs are written into.
    #[arg(long, env = "CPSIM_OUTPUTDIR")]
    outputdir: PathBuf,

    /// Comp-pattern dictionary file name.
    #[arg(long)]
    cp: String,

    /// CP init-list dictionary file name.
    #[arg(long)]
    cpinit: String,

    /// Function exec-time list file name.
    #[arg(long)]
    funcexec: String,

    /// Shared cfg group file name.
    #[arg(long)]
    srdcfg: String,

    /// Function-to-host mapping file name.
    #[arg(long)]
    map: String,

    /// Topology file name.
    #[arg(long)]
    topo: String,

    /// Experiment parameters file name.
    #[arg(long)]
    exp: String,

    /// Device exec-time file name.
    #[arg(long)]
    devexec: String,

    /// Simulated stop time in seconds; the run otherwise drains the queue.
    #[arg(long)]
    stop: Option<f64>,

    /// Seed for every random stream in the run.
    #[arg(long, default_value_t = 0)]
    rngseed: u64,

    /// Write an event trace to this path.
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Write the tracking-group summary CSV to this path.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write the measurement file as JSON instead of YAML.
    #[arg(long)]
    json: bool,

    #[arg(long, short)]
    verbose: bool,

    /// Rebase input/output directories under this container-local root.
    #[arg(long)]
    container: Option<PathBuf>,

    /// Time unit for trace ticks: sec, msec, musec, nsec.
    #[arg(long, default_value = "sec")]
    tunits: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    run(args)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<()> {
    let tunits: TimeUnits = args
        .tunits
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let inputdir = rebase(&args.inputdir, args.container.as_deref());
    let outputdir = rebase(&args.outputdir, args.container.as_deref());
    std::fs::create_dir_all(&outputdir)
        .with_context(|| format!("creating output directory {}", outputdir.display()))?;

    let cp_dict: CompPatternDict = load_file(&inputdir.join(&args.cp))?;
    let init_dict: CpInitDict = load_file(&inputdir.join(&args.cpinit))?;
    let func_exec: FuncExecDict = load_file(&inputdir.join(&args.funcexec))?;
    let shared: SharedCfgDict = load_file(&inputdir.join(&args.srdcfg))?;
    let mapping: MappingDict = load_file(&inputdir.join(&args.map))?;
    let topo: TopoDesc = load_file(&inputdir.join(&args.topo))?;
    let exp: ExpParamsDesc = load_file(&inputdir.join(&args.exp))?;
    let dev_exec: DevExecDict = load_file(&inputdir.join(&args.devexec))?;

    let portal = SimpleNetwork::new(&topo, &exp, &dev_exec, args.rngseed);
    let mut rt = Runtime::build(
        &cp_dict,
        &init_dict,
        &func_exec,
        &shared,
        &mapping,
        Box::new(portal),
        RunOptions {
            seed: args.rngseed,
            stop_time: args.stop,
            trace: args.trace.is_some(),
        },
    )?;
    rt.run()?;

    for cpi in &rt.cpis {
        info!(
            pattern = %cpi.name,
            started = cpi.summary.started,
            completed = cpi.summary.completed,
            lost = cpi.summary.lost,
            abandoned = cpi.summary.abandoned,
            "pattern summary"
        );
    }

    write_outputs(&args, &outputdir, tunits, &rt)
}

fn write_outputs(args: &Args, outputdir: &Path, tunits: TimeUnits, rt: &Runtime) -> Result<()> {
    let measures = report::measure_file(&args.name, &rt.model_digest, &rt.tracker);
    let measure_path = if args.json {
        let path = outputdir.join(format!("{}-measure.json", args.name));
        std::fs::write(&path, serde_json::to_vec_pretty(&measures)?)?;
        path
    } else {
        let path = outputdir.join(format!("{}-measure.yaml", args.name));
        std::fs::write(&path, serde_yaml::to_string(&measures)?)?;
        path
    };
    info!(path = %measure_path.display(), "wrote measurements");

    if let Some(csv_path) = &args.csv {
        let path = resolve_out(outputdir, csv_path);
        let rows = report::tracking_rows(&rt.tracker);
        std::fs::write(&path, report::tracking_csv(&rows))?;
        info!(path = %path.display(), groups = rows.len(), "wrote tracking summary");
    }

    if let Some(trace_path) = &args.trace {
        let path = resolve_out(outputdir, trace_path);
        let trace = report::trace_file(&args.name, &rt.model_digest, tunits, rt.trace_mgr.log());
        std::fs::write(&path, serde_json::to_vec_pretty(&trace)?)?;
        info!(path = %path.display(), records = trace.records.len(), "wrote trace");
    }
    Ok(())
}

/// Under `--container`, absolute host paths relocate beneath the container
/// root; relative paths resolve against it.
fn rebase(dir: &Path, container: Option<&Path>) -> PathBuf {
    match container {
        Some(root) => match dir.strip_prefix("/") {
            Ok(stripped) => root.join(stripped),
            Err(_) => root.join(dir),
        },
        None => dir.to_path_buf(),
    }
}

fn resolve_out(outputdir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        outputdir.join(path)
    }
}
