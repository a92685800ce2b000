use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "boxcheck-server")]
#[command(
    author,
    version,
    about = "Self-improving box condition classifier",
    long_about = None
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "boxcheck.yaml")]
    pub config: PathBuf,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Directory for history and exports
    #[arg(short, long, env = "BOXCHECK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Minimum confidence for promotion into the training corpus
    #[arg(long, env = "BOXCHECK_CONFIDENCE_THRESHOLD")]
    pub confidence_threshold: Option<f64>,

    /// Drift score above which drift alerts fire
    #[arg(long, env = "BOXCHECK_DRIFT_THRESHOLD")]
    pub drift_threshold: Option<f64>,

    /// Corpus size required before retraining is recommended
    #[arg(long, env = "BOXCHECK_RETRAINING_SAMPLE_FLOOR")]
    pub retraining_sample_floor: Option<usize>,

    /// Vision API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
