use clap::Parser;
use json_db_loader::config::LoadOptionsBuilder;
use json_db_loader::runner::{LoadArgs, run_load};
use std::path::PathBuf;

/// Load JSON files into database tables as described by a mapping file
#[derive(Parser, Clone)]
#[command(version)]
struct Args {
    /// Path to the mapping file
    mapping_file: PathBuf,

    /// Load run identifier stored with every record (random UUID if omitted)
    load_id: Option<String>,

    /// Parse files without a .json extension instead of skipping them
    #[arg(long)]
    parse_non_json: bool,

    /// Write each file's documents in a single transaction
    #[arg(long)]
    transaction_per_file: bool,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if args.quiet {
        EnvFilter::new("json_db_loader=warn,sqlx=off")
    } else {
        EnvFilter::new("json_db_loader=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let options = LoadOptionsBuilder::default()
        .strict_extension_check(!args.parse_non_json)
        .transaction_per_file(args.transaction_per_file)
        .build()?;

    let result = run_load(LoadArgs {
        mapping_file: args.mapping_file,
        load_id: args.load_id,
        options,
    })
    .await?;

    println!();
    println!("Load Summary");
    println!("============");
    println!("Load ID: {}", result.load_id);
    println!("Mappings: {}", result.mappings);
    println!("Total files processed: {}", result.files_processed);
    println!("Files skipped: {}", result.stats.files_skipped);
    println!("Documents written: {}", result.documents_written);
    println!("Sessions opened: {}", result.sessions_opened);
    println!("Duration: {:.2}s", result.duration.as_secs_f64());

    if let (Some(p50), Some(p90), Some(p99)) = result.stats.get_percentiles() {
        println!("Write latency: p50={}ms p90={}ms p99={}ms", p50, p90, p99);
    }

    Ok(())
}
