use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use wremnants::{
    combine::{add_wmass_systematics, WMassCardOptions},
    data::expand_path,
    CardTool, Datagroups,
};

#[derive(Parser, Debug)]
#[command(name = "setup_combine_wmass")]
#[command(about = "Write the W-mass card and shape file from a histogram producer's output")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,

    /// Folder the card and shape file are written to
    #[arg(short, long, default_value = ".")]
    outfolder: String,

    /// Histograms written by a producer
    #[arg(short, long)]
    input_file: String,

    /// Card template; the built-in W-mass template is used if not given
    #[arg(long)]
    template: Option<PathBuf>,

    /// Don't split the QCD scale uncertainty into helicity components
    #[arg(long)]
    no_scale_helicity_split: bool,

    /// Add the μR × μF scale variations
    #[arg(long)]
    qcd_scale: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    let outfolder = expand_path(&cli.outfolder)?;
    fs::create_dir_all(&outfolder)
        .with_context(|| format!("creating {}", outfolder.display()))?;
    let input = expand_path(&cli.input_file)?;
    info!(input = %input.display(), "reading histograms");
    let datagroups = Datagroups::wmass_2016_from_file(&input)
        .with_context(|| format!("reading {}", input.display()))?;

    let mut card = CardTool::new(outfolder.join("Wmass.txt"), datagroups)
        .outfile(outfolder.join("WMassCombineInput.bin"));
    if let Some(template) = cli.template {
        card = card.nominal_template(template);
    }
    add_wmass_systematics(
        &mut card,
        WMassCardOptions {
            qcd_by_helicity: !cli.no_scale_helicity_split,
            qcd_scale: cli.qcd_scale,
        },
    )?;
    card.write_output()?;
    Ok(())
}
