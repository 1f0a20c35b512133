use bundlefs::bundle::{Bundle, BundleOptions};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bundle", about = "Inspect and edit single-file bundles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty bundle (truncates an existing file)
    Init {
        bundle: PathBuf,
        /// Hash bucket count; fixed for the lifetime of the bundle
        #[arg(short, long, conflicts_with = "expected")]
        buckets: Option<u32>,
        /// Derive the bucket count from the expected number of entries
        #[arg(short, long)]
        expected: Option<u64>,
    },
    /// Store a local file under NAME (created with default options if missing)
    Put {
        bundle: PathBuf,
        name:   String,
        input:  PathBuf,
    },
    /// Write an entry to OUTPUT, or stdout when omitted
    Get {
        bundle: PathBuf,
        name:   String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List entries, optionally below PREFIX
    Ls {
        bundle: PathBuf,
        prefix: Option<String>,
        /// List directories instead of files
        #[arg(short, long)]
        dirs:   bool,
        /// Show size and modification time
        #[arg(short, long)]
        long:   bool,
    },
    /// Create a directory entry
    Mkdir {
        bundle: PathBuf,
        name:   String,
    },
    /// Delete an entry
    Rm {
        bundle: PathBuf,
        name:   String,
    },
    /// Set an entry's modification time (RFC 3339, default now)
    Touch {
        bundle: PathBuf,
        name:   String,
        #[arg(short, long)]
        time:   Option<DateTime<Utc>>,
    },
    /// Show header and space usage
    Info {
        bundle: PathBuf,
        #[arg(long)]
        json:   bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("BUNDLE_LOG")
                .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {

        // ── Init ─────────────────────────────────────────────────────────────
        Commands::Init { bundle, buckets, expected } => {
            let opts = match (buckets, expected) {
                (Some(n), _)    => BundleOptions { bucket_count: n },
                (None, Some(e)) => BundleOptions::for_expected_entries(e),
                (None, None)    => BundleOptions::default(),
            };
            let b = Bundle::create(&bundle, opts)?;
            println!("Created: {} ({} buckets)", bundle.display(), b.bucket_count());
        }

        // ── Put ──────────────────────────────────────────────────────────────
        Commands::Put { bundle, name, input } => {
            let data = std::fs::read(&input)?;
            let mut b = Bundle::open_or_create(&bundle, BundleOptions::default())?;
            let Some(mut w) = b.create_file(&name)? else {
                return Err(format!("'{name}' is a directory").into());
            };
            if let Ok(mtime) = std::fs::metadata(&input).and_then(|m| m.modified()) {
                w.set_modified(DateTime::<Utc>::from(mtime));
            }
            w.write_all(&data)?;
            let info = w.finish()?;
            println!("  stored  {} ({} B)", info.name, info.size);
        }

        // ── Get ──────────────────────────────────────────────────────────────
        Commands::Get { bundle, name, output } => {
            let mut b = Bundle::open(&bundle)?;
            let mut reader = b.open_file(&name)?
                .ok_or_else(|| format!("File not found: {name}"))?;
            match output {
                Some(path) => {
                    let mut out = std::fs::File::create(&path)?;
                    std::io::copy(&mut reader, &mut out)?;
                }
                None => {
                    let mut out = std::io::stdout().lock();
                    std::io::copy(&mut reader, &mut out)?;
                    out.flush()?;
                }
            }
        }

        // ── Ls ───────────────────────────────────────────────────────────────
        Commands::Ls { bundle, prefix, dirs, long } => {
            let mut b = Bundle::open(&bundle)?;
            let mut names = if dirs {
                b.list_directories(prefix.as_deref())?
            } else {
                b.list_files(prefix.as_deref())?
            };
            names.sort();
            for name in names {
                if !long {
                    println!("{name}");
                    continue;
                }
                match b.stat(&name)? {
                    Some(info) if info.is_directory() => println!("{:>12}  {:<25}  {}", "-", "-", name),
                    Some(info) => println!("{:>12}  {:<25}  {}", info.size, info.modified.to_rfc3339(), name),
                    None => {}
                }
            }
        }

        // ── Mkdir ────────────────────────────────────────────────────────────
        Commands::Mkdir { bundle, name } => {
            let mut b = Bundle::open(&bundle)?;
            if !b.create_directory(&name)? {
                return Err(format!("'{name}' already exists").into());
            }
        }

        // ── Rm ───────────────────────────────────────────────────────────────
        Commands::Rm { bundle, name } => {
            let mut b = Bundle::open(&bundle)?;
            if !b.delete(&name)? {
                return Err(format!("File not found: {name}").into());
            }
        }

        // ── Touch ────────────────────────────────────────────────────────────
        Commands::Touch { bundle, name, time } => {
            let mut b = Bundle::open(&bundle)?;
            if !b.set_modified(&name, time.unwrap_or_else(Utc::now))? {
                return Err(format!("Not a file: {name}").into());
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { bundle, json } => {
            let mut b = Bundle::open(&bundle)?;
            let stats = b.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }
            println!("── Bundle ───────────────────────────────────────────────");
            println!("  Path           {}", bundle.display());
            println!("  Format version {}", stats.version);
            println!("  Buckets        {} ({} used, longest chain {})",
                     stats.bucket_count, stats.used_buckets, stats.longest_chain);
            println!("  Files          {}", stats.files);
            println!("  Directories    {}", stats.directories);
            println!("  Live bytes     {} B", stats.live_bytes);
            println!("  Free regions   {} ({} B)", stats.free_regions, stats.free_bytes);
            println!("  File length    {} B", stats.file_len);
        }
    }

    Ok(())
}
