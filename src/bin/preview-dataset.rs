use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use review_tools_rust::DatasetLoader;
use review_tools_rust::config::{DEFAULT_REVIEWS_PATH, init_environment};

#[derive(Parser, Debug)]
#[command(version, about = "Print the first records of a .jsonl.gz dump")]
struct Cli {
    #[arg(default_value = DEFAULT_REVIEWS_PATH)]
    path: PathBuf,

    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,
}

fn main() -> Result<()> {
    init_environment();
    let cli = Cli::parse();
    let loader = DatasetLoader::new(&cli.path);

    println!("Previewing first {} reviews from {}:", cli.count, loader.path().display());
    for (i, record) in loader.preview(cli.count)?.iter().enumerate() {
        println!("\nReview #{}:", i + 1);
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    Ok(())
}
