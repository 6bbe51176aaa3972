use clap::{Args, Parser, Subcommand};
use distrishare::core::Config;
use distrishare::network::BootstrapServer;
use distrishare::utils::setup_logging;
use distrishare::{Peer, Result};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "distrishare")]
#[command(about = "Hybrid P2P file sharing: bootstrap registry + multicast discovery")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PeerOpts {
    /// IP this peer advertises and listens on
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,
    /// TCP port for search/download requests
    #[arg(short, long, default_value = "9000")]
    port: u16,
    /// Bootstrap registry address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    bootstrap: String,
    /// Directory with files offered to other peers
    #[arg(long, default_value = "./shared_files")]
    shared_dir: PathBuf,
    /// Directory downloads are written to
    #[arg(long, default_value = "./downloads")]
    download_dir: PathBuf,
    /// Pre-shared secret embedded in every transfer request
    #[arg(long, default_value = "distrishare_2025")]
    secret: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bootstrap registry service
    Bootstrap {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
    /// Run a peer: transfer server, bootstrap registration and
    /// multicast discovery, until ctrl-c
    Start {
        #[command(flatten)]
        opts: PeerOpts,
    },
    /// Ask every known node for a file and print who has it
    Search {
        #[command(flatten)]
        opts: PeerOpts,
        filename: String,
    },
    /// Download a file from a specific peer (host:port)
    Download {
        #[command(flatten)]
        opts: PeerOpts,
        peer: String,
        filename: String,
    },
    /// Copy a file into the share directory
    Share {
        #[command(flatten)]
        opts: PeerOpts,
        path: PathBuf,
    },
    /// List shared and downloaded files
    Files {
        #[command(flatten)]
        opts: PeerOpts,
    },
}

/// One-shot commands take an ephemeral transfer port so they never
/// collide with a long-lived peer on the same host.
fn one_shot_config(opts: &PeerOpts) -> Result<Config> {
    let mut config = build_config(opts)?;
    config.port = 0;
    Ok(config)
}

fn build_config(opts: &PeerOpts) -> Result<Config> {
    let bootstrap = distrishare::PeerAddress::parse(&opts.bootstrap).ok_or_else(|| {
        distrishare::P2pError::Config(format!("Invalid bootstrap address '{}'", opts.bootstrap))
    })?;

    Ok(Config {
        ip: opts.ip.clone(),
        port: opts.port,
        bootstrap_host: bootstrap.host,
        bootstrap_port: bootstrap.port,
        shared_dir: opts.shared_dir.clone(),
        download_dir: opts.download_dir.clone(),
        shared_secret: opts.secret.clone(),
        ..Config::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Bootstrap { host, port } => {
            let server = BootstrapServer::bind(&host, port).await?;
            server.run().await;
        }
        Commands::Start { opts } => {
            let mut peer = Peer::new(build_config(&opts)?).await?;
            if let Err(e) = peer.connect_to_bootstrap().await {
                log::warn!("Bootstrap registration failed: {}", e);
            }
            peer.start_multicast().await?;

            tokio::signal::ctrl_c().await.map_err(|e| {
                distrishare::P2pError::Io(format!("Failed to wait for ctrl-c: {}", e))
            })?;
            peer.stop_multicast().await?;
        }
        Commands::Search { opts, filename } => {
            let peer = Peer::new(one_shot_config(&opts)?).await?;
            if let Err(e) = peer.connect_to_bootstrap().await {
                log::warn!("Bootstrap registration failed: {}", e);
            }

            let found = peer.search_file(&filename).await;
            if found.is_empty() {
                println!("'{}' was not found on any known node", filename);
            } else {
                println!("'{}' is available from:", filename);
                for addr in found {
                    println!("  {}", addr);
                }
            }
        }
        Commands::Download {
            opts,
            peer: remote,
            filename,
        } => {
            let remote = distrishare::PeerAddress::parse(&remote).ok_or_else(|| {
                distrishare::P2pError::Config(format!("Invalid peer address '{}'", remote))
            })?;
            let peer = Peer::new(one_shot_config(&opts)?).await?;
            let dest = peer
                .download_file(&remote.host, remote.port, &filename)
                .await?;
            println!("Downloaded to {:?}", dest);
        }
        Commands::Share { opts, path } => {
            let peer = Peer::new(one_shot_config(&opts)?).await?;
            let name = peer.share_file(&path).await?;
            println!("Now sharing '{}'", name);
        }
        Commands::Files { opts } => {
            let peer = Peer::new(one_shot_config(&opts)?).await?;
            println!("Shared files:");
            for name in peer.list_local_files().await? {
                println!("  {}", name);
            }
            println!("Downloaded files:");
            for name in peer.list_downloaded_files().await? {
                println!("  {}", name);
            }
        }
    }

    Ok(())
}
