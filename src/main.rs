use std::path::{Path, PathBuf};

use clap::Parser;
use fdfs_client::config::DEFAULT_CONFIG_FILE;
use fdfs_client::file_id::extension_of;
use fdfs_client::utils::crc::crc32_reader;
use fdfs_client::{AsyncClient, ClientConfig, Metadata, MetadataMode};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fdfs")]
#[command(about = "Upload, download and manage files on a FastDFS cluster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, help = "Config file path (.toml or client.conf)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Tracker host[:port] (overrides config, repeatable)")]
    tracker: Vec<String>,

    #[arg(long, help = "Output as JSON")]
    json: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    Upload {
        file: PathBuf,
        #[arg(long, help = "Target group")]
        group: Option<String>,
        #[arg(long, help = "Print the public URL instead of the file id")]
        url: bool,
    },
    Download {
        file_id: String,
        dest: PathBuf,
        #[arg(long, help = "Check the CRC32 reported by the storage node")]
        verify: bool,
    },
    Delete {
        file_id: String,
    },
    Info {
        file_id: String,
    },
    MetaGet {
        file_id: String,
    },
    MetaSet {
        file_id: String,
        /// key=value pairs
        #[arg(required = true)]
        pairs: Vec<String>,
        #[arg(long, help = "Merge with existing metadata instead of replacing it")]
        merge: bool,
    },
    /// Capacity of every group, or of one
    Groups {
        group: Option<String>,
    },
    /// Storage nodes of a group
    Servers {
        group: String,
        #[arg(long, help = "Only the node with this address")]
        ip: Option<String>,
    },
    GenerateConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE, help = "Config file path")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fdfs=info,fdfs_client=info")),
        )
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    if let Commands::GenerateConfig { output } = &cli.command {
        ClientConfig::default().save(output)?;
        if json {
            println!("{}", serde_json::json!({
                "success": true,
                "config_file": output,
            }));
        } else {
            println!("⚙️  Generate Configuration");
            println!("========================");
            println!("✅ Default configuration saved to: {}", output.display());
            println!("   Edit the trackers list before use");
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_deref(), cli.tracker)?;
    let client = AsyncClient::new(config)?;

    let result = run(&client, cli.command, json).await;
    if let Err(e) = &result {
        if json {
            println!("{}", serde_json::json!({"error": e.to_string()}));
        } else {
            eprintln!("❌ {}", e);
        }
    }
    result
}

fn load_config(path: Option<&Path>, trackers: Vec<String>) -> anyhow::Result<ClientConfig> {
    let mut config = match path {
        Some(path) => ClientConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => ClientConfig::load(DEFAULT_CONFIG_FILE)?,
        None => ClientConfig::default(),
    };
    if !trackers.is_empty() {
        config.trackers = trackers;
    }
    debug!("Using trackers {:?}", config.trackers);
    Ok(config)
}

async fn run(client: &AsyncClient, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Upload { file, group, url } => {
            let result = match group {
                Some(group) => {
                    let data = tokio::fs::read(&file).await?;
                    let name = file
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    client.upload_to_group(&group, &data, extension_of(&name)).await?
                }
                None => client.upload_file(&file).await?,
            };
            let public_url = url.then(|| {
                let base = client.config().public_base(&result.storage_ip);
                result.file_id.format(Some(&base))
            });

            if json {
                println!("{}", serde_json::json!({
                    "file_id": result.file_id.to_string(),
                    "size": result.size,
                    "storage_ip": result.storage_ip,
                    "url": public_url,
                }));
            } else {
                println!("📤 Upload");
                println!("=========");
                println!("✅ {}", public_url.unwrap_or_else(|| result.file_id.to_string()));
                println!("   Size: {} bytes", result.size);
                println!("   Storage: {}", result.storage_ip);
            }
        }
        Commands::Download { file_id, dest, verify } => {
            let size = client.download_to_file(file_id.as_str(), &dest).await?;
            let checked = if verify {
                let info = client.file_info(file_id.as_str()).await?;
                let local = {
                    let dest = dest.clone();
                    tokio::task::spawn_blocking(move || crc32_reader(std::fs::File::open(dest)?))
                        .await??
                };
                if local != info.crc32 {
                    anyhow::bail!(
                        "CRC32 mismatch for {}: expected {:08x}, got {:08x}",
                        file_id,
                        info.crc32,
                        local
                    );
                }
                Some(local)
            } else {
                None
            };

            if json {
                println!("{}", serde_json::json!({
                    "file_id": file_id,
                    "dest": dest,
                    "size": size,
                    "crc32": checked,
                }));
            } else {
                println!("📥 Download");
                println!("===========");
                println!("✅ {} bytes written to {}", size, dest.display());
                if let Some(crc) = checked {
                    println!("   CRC32 verified: {:08x}", crc);
                }
            }
        }
        Commands::Delete { file_id } => {
            let receipt = client.delete(file_id.as_str()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            } else {
                println!("🗑️  Delete");
                println!("=========");
                println!("✅ {}", receipt.status);
                println!("   File: {}", receipt.file_id);
                println!("   Storage: {}", receipt.storage_ip);
            }
        }
        Commands::Info { file_id } => {
            let info = client.file_info(file_id.as_str()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("📄 File Info");
                println!("============");
                println!("   File: {}", file_id);
                println!("   Size: {} bytes", info.size);
                println!("   Created: {} (unix)", info.created);
                println!("   CRC32: {:08x}", info.crc32);
                println!("   Source: {}", info.source_ip);
            }
        }
        Commands::MetaGet { file_id } => {
            let metadata = client.get_metadata(file_id.as_str()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                println!("🏷️  Metadata");
                println!("===========");
                if metadata.is_empty() {
                    println!("   No metadata");
                }
                for (key, value) in &metadata {
                    println!("   {} = {}", key, value);
                }
            }
        }
        Commands::MetaSet { file_id, pairs, merge } => {
            let metadata = parse_pairs(&pairs)?;
            let mode = if merge {
                MetadataMode::Merge
            } else {
                MetadataMode::Overwrite
            };
            client.set_metadata(file_id.as_str(), &metadata, mode).await?;
            if json {
                println!("{}", serde_json::json!({
                    "success": true,
                    "file_id": file_id,
                    "entries": metadata.len(),
                }));
            } else {
                println!("🏷️  Metadata");
                println!("===========");
                println!("✅ Stored {} entries on {}", metadata.len(), file_id);
            }
        }
        Commands::Groups { group } => {
            let groups = match group {
                Some(group) => vec![client.list_one_group(&group).await?],
                None => client.list_all_groups().await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                println!("🗂️  Groups");
                println!("=========");
                for group in &groups {
                    println!(
                        "   {}: {}/{} MB free, {}/{} storage nodes active",
                        group.name, group.free_mb, group.total_mb, group.active_count, group.storage_count
                    );
                }
            }
        }
        Commands::Servers { group, ip } => {
            let servers = client.list_servers(&group, ip.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&servers)?);
            } else {
                println!("🖥️  Storage Servers ({})", group);
                println!("===================");
                for server in &servers {
                    let state = if server.is_active() { "active" } else { "inactive" };
                    println!(
                        "   {}:{} {} v{}, {}/{} MB free",
                        server.ip_addr,
                        server.storage_port,
                        state,
                        server.version,
                        server.free_mb,
                        server.total_mb
                    );
                }
            }
        }
        Commands::GenerateConfig { .. } => {}
    }
    Ok(())
}

fn parse_pairs(pairs: &[String]) -> anyhow::Result<Metadata> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(anyhow::anyhow!("Expected key=value, got '{}'", pair)),
        })
        .collect()
}
