mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use stm_av::{FfprobeProbe, MetadataProbe, ToolRegistry};
use stm_core::config::Config;
use stm_core::rates::fit_resolution;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting servetome");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );
    for share in &config.library.shares {
        tracing::info!("Share '{}' -> {}", share.name, share.path.display());
    }

    stm_server::start(config).await?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "servetome=trace,stm_core=trace,stm_av=trace,stm_stream=trace,stm_server=trace,tower_http=debug".to_string()
        } else {
            "servetome=debug,stm_core=debug,stm_av=debug,stm_stream=debug,stm_server=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("servetome {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let probe = FfprobeProbe::new(tools.require("ffprobe")?.to_path_buf())
        .with_timeout(Duration::from_secs(config.tools.probe_timeout_secs));
    let meta = probe.probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(());
    }

    let secs = meta.duration as u64;
    println!("File: {}", file.display());
    println!(
        "Duration: {:02}:{:02}:{:02} ({:.3}s)",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        meta.duration
    );
    println!("Frame: {}x{}", meta.width, meta.height);
    if let Some(ref title) = meta.title {
        println!("Title: {title}");
    }
    if let Some(ref show) = meta.show_or_artist {
        println!("Show/artist: {show}");
    }
    if let Some(ref description) = meta.description {
        println!("Description: {description}");
    }

    let segment_seconds = config.transcode.segment_seconds;
    println!(
        "\nSegments: {} x {segment_seconds}s",
        meta.segment_count(segment_seconds)?
    );
    println!("Rates:");
    for profile in config.transcode.rates.by_descending_bandwidth() {
        let frame = match fit_resolution(meta.resolution(), profile) {
            Some(fit) => format!("scaled to {}x{}", fit.width, fit.height),
            None => "source size".to_string(),
        };
        println!("  {:<10} {:>8} bps  {frame}", profile.name, profile.bandwidth);
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. servetome needs both ffmpeg and ffprobe.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("reading {}", p.display()))?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration has {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  ! {warning}");
        }
    }

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Shares: {}", config.library.shares.len());
    println!(
        "  Transcode: {} ({}s segments, {} ahead)",
        config.transcode.root_dir.display(),
        config.transcode.segment_seconds,
        config.transcode.readahead_segments
    );
    println!("  Rates: {}", config.transcode.rates.len());

    Ok(())
}
