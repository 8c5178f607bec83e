use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shadowrelay::controller::{Controller, Role};
use shadowrelay::profile::{Profile, ProfileFile};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "shadowrelay")]
#[command(author, version, about = "Shadowsocks-compatible SOCKS5 relay")]
struct Args {
    /// Path to a YAML profile-list file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// A ss:// URI, as an alternative to --config.
    #[arg(long)]
    uri: Option<String>,

    /// Run server role instead of client role.
    #[arg(long)]
    server: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("shadowrelay-worker")
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_directive = match args.verbose {
        0 => "shadowrelay=info",
        1 => "shadowrelay=debug",
        _ => "shadowrelay=trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .init();

    let profile = match load_profile(&args) {
        Ok(p) => p,
        Err(e) => {
            error!("failed to load profile: {e}");
            std::process::exit(1);
        }
    };
    let role = if args.server { Role::Server } else { Role::Client };

    let mut controller = match Controller::new(profile, role) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to construct controller: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.start().await {
        error!("failed to start controller: {e}");
        std::process::exit(1);
    }

    info!("shadowrelay running ({:?} role), press ctrl-c to stop", role);
    tokio::signal::ctrl_c().await?;
    controller.stop();
    Ok(())
}

fn load_profile(args: &Args) -> anyhow::Result<Profile> {
    if let Some(uri) = &args.uri {
        return Ok(Profile::from_uri(uri)?);
    }
    if let Some(path) = &args.config {
        let yaml = std::fs::read_to_string(path)?;
        let file = ProfileFile::parse(&yaml)?;
        let entry = file
            .profiles
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("profile file has no entries"))?;
        return Ok(entry.into());
    }
    anyhow::bail!("must pass either --config or --uri")
}
