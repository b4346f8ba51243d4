use std::fs::File;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{error, info};

use bookshelf::importer;
use bookshelf::Backend;

/// Bulk-load book records into the catalog.
#[derive(Parser, Debug)]
struct Args {
    /// The file to load: four comma-separated columns, no header,
    /// in isbn, title, author, year order.
    #[arg(default_value = "books.csv")]
    file: PathBuf,

    /// Connection string for the catalog database,
    /// e.g. sqlite://bookshelf.db
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() {
    // per-row progress goes to info, so default the filter up from error
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let file = match File::open(&args.file) {
        Ok(file) => file,
        Err(e) => {
            error!("couldn't open {}: {e}", args.file.display());
            process::exit(1);
        }
    };

    let backend = Backend::new(&args.database_url).await;

    match importer::import(&backend, file).await {
        Ok(added) => info!("imported {added} books"),
        Err(e) => {
            error!("import failed, nothing committed: {e:?}");
            process::exit(1);
        }
    }
}
