use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod s3;

use s3::{Connection, DEFAULT_RETRIES};

#[derive(Parser)]
#[command(name = "s3fetch")]
#[command(version, about = "Fetch S3 objects with SigV2 signing and bounded retry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (falls back to AWS_ACCESS_ID / AWS_SECRET_KEY)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Attempts before giving up
    #[arg(long, global = true, default_value_t = DEFAULT_RETRIES)]
    retries: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Print an object to stdout
    Cat {
        /// S3 path (s3://bucket/key)
        path: String,
    },

    /// Download an object to a local file
    Get {
        /// S3 path (s3://bucket/key)
        path: String,

        /// Output file (defaults to the object's file name)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Split `s3://bucket/key` into `(bucket, /key)`.
fn parse_s3_path(path: &str) -> Result<(&str, &str)> {
    let rest = path
        .strip_prefix("s3://")
        .with_context(|| format!("not an s3:// path: {}", path))?;
    match rest.find('/') {
        Some(pos) if pos > 0 && pos + 1 < rest.len() => Ok((&rest[..pos], &rest[pos..])),
        _ => bail!("expected s3://bucket/key, got: {}", path),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Sequential single-object I/O; one thread is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let credentials = config::load_credentials(cli.config.as_deref(), cli.profile.as_deref())?;
    let connection = Connection::new(credentials);

    match cli.command {
        Commands::Cat { path } => {
            let (bucket, key) = parse_s3_path(&path)?;
            let body = connection.get_string(bucket, key, cli.retries).await?;
            print!("{}", body);
        }
        Commands::Get { path, output } => {
            let (bucket, key) = parse_s3_path(&path)?;
            let file_name = match output {
                Some(name) => name,
                None => key
                    .rsplit('/')
                    .next()
                    .filter(|n| !n.is_empty())
                    .context("cannot derive a file name from the object path; use --output")?
                    .to_string(),
            };

            let mut file = std::fs::File::create(&file_name)
                .with_context(|| format!("Failed to create {}", file_name))?;
            let ok = connection.get(bucket, key, &mut file, cli.retries).await?;
            if !ok {
                bail!("failed to fetch {} after {} attempts", path, cli.retries);
            }
            tracing::info!(%path, %file_name, "downloaded");
        }
    }

    Ok(())
}
