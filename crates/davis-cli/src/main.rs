use std::path::PathBuf;

use clap::Parser;
use davis_core::{DAVISeval, DAVIS};
use env_logger::Env;
use log::info;

#[derive(Parser)]
#[command(name = "davis-eval")]
#[command(
    about = "DAVIS evaluation tool: region (J) and boundary (F) similarity for video object segmentation"
)]
struct Cli {
    /// Path to ground truth annotations JSON file
    #[arg(long)]
    gt: PathBuf,

    /// Path to segmentation results JSON file
    #[arg(long)]
    dt: PathBuf,

    /// Measures to evaluate (comma-separated, any of J, F, T)
    #[arg(long, value_delimiter = ',', default_value = "J,F")]
    measures: Vec<String>,

    /// Filter to specific image IDs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    img_ids: Option<Vec<u64>>,

    /// Filter to specific category IDs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    cat_ids: Option<Vec<u64>>,

    /// Boundary tolerance: fraction of the image diagonal, or pixels if >= 1
    #[arg(long, default_value_t = davis_core::measures::DEFAULT_BOUND_TH)]
    bound_th: f64,

    /// Report every video (category run) separately
    #[arg(long)]
    per_sequence: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("Loading ground truth from {:?}...", cli.gt);
    let davis_gt = DAVIS::new(&cli.gt)?;

    info!("Loading results from {:?}...", cli.dt);
    let davis_dt = davis_gt.load_res(&cli.dt)?;

    let mut davis_eval = DAVISeval::new(davis_gt, davis_dt);
    davis_eval.params.measures = cli.measures;
    davis_eval.params.bound_th = cli.bound_th;
    if let Some(img_ids) = cli.img_ids {
        davis_eval.params.img_ids = img_ids;
    }
    if let Some(cat_ids) = cli.cat_ids {
        davis_eval.params.cat_ids = cat_ids;
    }

    if cli.per_sequence {
        info!("Evaluating per sequence...");
        davis_eval.evaluate_per_sequence()?;
        davis_eval.summarize_per_sequence();
        return Ok(());
    }

    info!("Evaluating...");
    davis_eval.evaluate()?;
    davis_eval.summarize();

    // Print machine-readable stats line for parity testing
    if let Some(stats) = davis_eval.stats() {
        let stats_strs: Vec<String> = stats.iter().map(|v| format!("{:.15}", v)).collect();
        println!("stats: [{}]", stats_strs.join(", "));
    }

    Ok(())
}
