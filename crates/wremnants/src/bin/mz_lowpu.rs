use anyhow::Result;
use clap::Parser;
use tracing::info;
use wremnants::{
    data::DiscoveryOptions,
    histmakers::{axes::pt_binning, datasets_lowpu, mz_lowpu::scale_and_aggregate, LeptonRecoil},
    output::{output_filename, write_analysis_output, MetaInfo},
    Flavor, MzLowPu, MzLowPuConfig,
};

#[derive(Parser, Debug)]
#[command(name = "mz_lowpu")]
#[command(about = "Z → ℓℓ W-like histograms for the low-pileup run")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,

    /// Lepton flavor of the selected pairs (mumu or ee)
    #[arg(long, default_value = "mumu")]
    flavor: Flavor,

    /// Folder the histograms are written to
    #[arg(short, long, default_value = ".")]
    outfolder: String,

    /// Folder holding one subfolder of Parquet files per sample
    #[arg(long, default_value = "~/data/lowPU")]
    data_path: String,

    /// Maximum number of files per sample
    #[arg(long)]
    max_files: Option<usize>,

    /// Only run these samples or sample groups
    #[arg(long, num_args = 1..)]
    filter_procs: Vec<String>,

    /// Skip these samples or sample groups
    #[arg(long, num_args = 1..)]
    exclude_procs: Vec<String>,

    /// Binning of the lepton transverse momentum, which also sets its acceptance
    #[arg(long, num_args = 3, value_names = ["NBINS", "MIN", "MAX"], default_values = ["34", "26", "60"])]
    pt: Vec<f64>,

    /// Split the signal into fiducial and out-of-acceptance parts and add generator-level axes
    #[arg(long)]
    unfolding: bool,

    /// Generator-level variables used with --unfolding
    #[arg(long, num_args = 1.., default_values = ["ptVGen"])]
    gen_vars: Vec<String>,

    /// Use the reconstructed MET without recoil corrections
    #[arg(long)]
    no_recoil: bool,

    /// Keep the simulation unnormalised
    #[arg(long)]
    no_scale_to_data: bool,

    /// Sample groups merged into a single entry of the output, only when scaling to data
    #[arg(long, num_args = 0.., default_values = ["Diboson", "Top", "Wtaunu", "Wmunu", "Wenu"])]
    aggregate_groups: Vec<String>,

    /// Skip the recoil uncertainty histograms
    #[arg(long)]
    only_main_histograms: bool,

    /// Appended to the output file name
    #[arg(long)]
    postfix: Option<String>,

    /// Threads (0 = one per core)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()?;
    }

    let (pt_bins, pt_min, pt_max) = pt_binning(&cli.pt)?;
    let mut config = MzLowPuConfig::new(cli.flavor)
        .pt(pt_bins, pt_min, pt_max)
        .only_main_histograms(cli.only_main_histograms);
    if cli.unfolding {
        config = config.unfolding(&cli.gen_vars);
    }
    if !cli.no_recoil {
        config = config.recoil(LeptonRecoil::new(&[cli.flavor.signal()]));
    }
    let producer = MzLowPu::new(config)?;

    let mut options = DiscoveryOptions::new()
        .filter(&cli.filter_procs)
        .exclude(&cli.exclude_procs);
    if let Some(max_files) = cli.max_files {
        options = options.max_files(max_files);
    }
    let datasets =
        producer.prepare_datasets(datasets_lowpu(&cli.data_path, cli.flavor, &options)?);
    let mut results = producer.run(&datasets)?;

    let groups: Vec<&str> = cli.aggregate_groups.iter().map(String::as_str).collect();
    if let Some(lumi) = scale_and_aggregate(&mut results, !cli.no_scale_to_data, &groups)? {
        info!(lumi, "scaled to data");
    }

    let command = std::env::args().collect::<Vec<_>>().join(" ");
    let meta = MetaInfo::new(&command)
        .option("flavor", cli.flavor)
        .option("pt", format!("{pt_bins} {pt_min} {pt_max}"))
        .option("unfolding", cli.unfolding)
        .option("gen_vars", cli.gen_vars.join(" "))
        .option("recoil", !cli.no_recoil)
        .option("scale_to_data", !cli.no_scale_to_data)
        .option(
            "aggregate_groups",
            if cli.no_scale_to_data {
                String::new()
            } else {
                groups.join(" ")
            },
        );
    let filename = output_filename(&producer.output_filename(), cli.postfix.as_deref());
    let path = write_analysis_output(&results, &cli.outfolder, &filename, meta)?;
    info!(path = %path.display(), datasets = results.len(), "done");
    Ok(())
}
