use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use dirpush::config::{DEFAULT_MAX_CONCURRENT, DEFAULT_PART_SIZE};
use dirpush::s3::display_objects;
use dirpush::tree::DEFAULT_FILE_CONCURRENCY;
use dirpush::{upload_tree, MultipartUploader, S3Store, UploadConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dirpush")]
#[command(version, about = "Upload a directory tree to an S3 bucket", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    target: Target,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Args)]
struct Target {
    /// Destination bucket
    #[arg(long, global = true, env = "AWSBUCKET")]
    bucket: Option<String>,

    /// AWS region; falls back to the default provider chain
    #[arg(long, global = true, env = "AWSREGION")]
    region: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload every file under a directory
    Upload {
        /// Directory (or single file) to upload
        source: PathBuf,

        /// Key prefix for uploaded objects
        #[arg(long)]
        prefix: Option<String>,

        /// Part size in bytes for multipart uploads
        #[arg(long, default_value_t = DEFAULT_PART_SIZE)]
        part_size: usize,

        /// Parts uploaded together per file
        #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT)]
        concurrency: usize,

        /// Files uploaded at the same time
        #[arg(long, default_value_t = DEFAULT_FILE_CONCURRENCY)]
        files: usize,
    },

    /// List objects in the bucket
    Ls {
        /// Only list keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[::tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(bucket) = cli.target.bucket else {
        bail!("no bucket given; pass --bucket or set AWSBUCKET");
    };
    let store = S3Store::connect(cli.target.region).await;

    match cli.command {
        Commands::Upload {
            source,
            prefix,
            part_size,
            concurrency,
            files,
        } => {
            let uploader =
                MultipartUploader::new(Arc::new(store), UploadConfig::new(part_size, concurrency));
            let report =
                upload_tree(&uploader, &source, &bucket, prefix.as_deref(), files).await?;

            for (key, err) in &report.failed {
                eprintln!("error: {key}: {err}");
            }
            println!(
                "uploaded {} file(s), {} bytes -> {bucket}",
                report.uploaded.len(),
                report.bytes()
            );
            if !report.is_success() {
                bail!("{} file(s) failed to upload", report.failed.len());
            }
        }
        Commands::Ls { prefix } => {
            let objects = store.list_objects(&bucket, prefix.as_deref()).await?;
            display_objects(&objects);
        }
    }
    Ok(())
}
