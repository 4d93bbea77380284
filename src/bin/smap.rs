use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::info;
use std::fs;
use std::path::PathBuf;

use smap_rs::gtr::draw_weights;
use smap_rs::io::output::{OutputPaths, write_reduced, write_run_outputs};
use smap_rs::io::params::load_params;
use smap_rs::tree::Outgroup;
use smap_rs::{
    AccumulateOptions, GtrLikelihood, GtrParameters, LikelihoodOptions, ModelVariant,
    WindowAccumulator, reduce,
};

#[derive(Parser, Debug)]
#[command(name = "smap")]
#[command(
    about = "Sufficient statistics and GTR weights from per-site stochastic mappings",
    long_about = None
)]
struct Cli {
    /// First site of the scan (1-based)
    start: usize,
    /// Last site read; windows start at sites start..=end-2
    end: usize,
    /// Number of posterior draws per mapping file
    n_draws: usize,
    /// Mapping files are read from {prefix}_{site}.map
    prefix: String,
    outgroup_file: PathBuf,
    gtr_param_file: PathBuf,
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    #[arg(long, help = "Include the root-state term sum_l n_l ln(pi_l) in the GTR log-likelihood")]
    root_term: bool,
    #[arg(long, help = "Also write reduced GTR (12/4) and CpG (9/3) statistics")]
    write_reduced: bool,
    #[arg(long, help = "Abort on the first unusable mapping record instead of skipping it")]
    strict: bool,
    #[arg(long)]
    threads: Option<usize>,
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Some(n_threads) = cli.threads {
        if n_threads == 0 {
            bail!("--threads must be >= 1");
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
            .map_err(|e| anyhow!("failed to configure Rayon global thread pool: {e}"))?;
    }

    let params = GtrParameters::try_from(load_params(&cli.gtr_param_file)?)
        .with_context(|| format!("invalid GTR parameters in {:?}", cli.gtr_param_file))?;
    let outgroup = Outgroup::load(&cli.outgroup_file)?;
    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("failed to create output directory {:?}", cli.out_dir))?;

    let options = AccumulateOptions {
        strict: cli.strict,
        progress: !cli.no_progress,
    };
    let accumulator = WindowAccumulator::new(cli.prefix.clone(), outgroup, cli.n_draws, options)?;
    let acc = accumulator.accumulate(cli.start, cli.end)?;

    let gtr_stats = reduce(&acc.raw, ModelVariant::ContextFree);
    let likelihood = GtrLikelihood::new(
        params,
        LikelihoodOptions {
            include_root_term: cli.root_term,
        },
    );
    info!("exit rates (G, C, T, A): {:?}", likelihood.params().exit_rates());
    let loglike = likelihood.evaluate(&gtr_stats, &acc.raw.branch_lengths, &acc.root)?;

    let paths = OutputPaths::new(&cli.out_dir, cli.start, cli.end);
    write_run_outputs(&paths, &acc.raw, &acc.root, &loglike)?;
    if cli.write_reduced {
        write_reduced(&cli.out_dir, cli.start, cli.end, &gtr_stats)?;
        let cpg_stats = reduce(&acc.raw, ModelVariant::CpgAware);
        write_reduced(&cli.out_dir, cli.start, cli.end, &cpg_stats)?;
    }

    let (_, ess) = draw_weights(&loglike);
    info!(
        "{} windows, {} skipped records, draw weight ESS {:.2} of {}",
        acc.n_windows,
        acc.n_skipped(),
        ess,
        cli.n_draws
    );
    println!("GTR weights: {}", paths.gtr_weight.display());
    Ok(())
}
