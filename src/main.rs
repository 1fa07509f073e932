mod cli;

use mp4forge::{config, conversion, layout, options, selection};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mp4forge=trace,mp4forge_encode=debug,mp4forge_probe=debug".to_string()
        } else {
            "mp4forge=info,mp4forge_encode=info,mp4forge_probe=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Convert {
            inputs,
            dry_run,
            force,
            jobs,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_convert(
                inputs,
                cli.config.as_deref(),
                dry_run,
                force,
                jobs,
            ))
        }
        Commands::Probe { file, json } => probe_file(&file, cli.config.as_deref(), json),
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mp4forge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_convert(
    inputs: Vec<std::path::PathBuf>,
    config_path: Option<&std::path::Path>,
    dry_run: bool,
    force: bool,
    jobs: Option<usize>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if force {
        config.output.force_convert = true;
    }
    let jobs = jobs
        .or(config.process.jobs)
        .unwrap_or_else(num_cpus::get)
        .max(1);
    let config = Arc::new(config);

    if dry_run {
        for input in &inputs {
            dry_run_file(&config, input)?;
        }
        return Ok(());
    }

    let manager = Arc::new(conversion::ConversionManager::new(Arc::clone(&config))?);
    let cancel = Arc::new(AtomicBool::new(false));

    // Ctrl-C flips the cooperative cancellation signal; running encoders
    // observe it within their poll interval.
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping conversions");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    // A single foreground conversion gets a live progress line; batches
    // go through the bounded pool with logged progress.
    let results = if inputs.len() == 1 {
        let input = inputs[0].clone();
        let manager = Arc::clone(&manager);
        let cancel = Arc::clone(&cancel);
        let result = tokio::task::spawn_blocking(move || {
            manager.process_file(&input, cancel, |event| {
                eprint!(
                    "\r{:>8.1}s  fps {:>5.1}  q {:>5.1}  {:>8}  {}   ",
                    event.timecode, event.fps, event.quality, event.bitrate, event.speed
                );
                let _ = std::io::stderr().flush();
            })
        })
        .await?;
        eprintln!();
        vec![(inputs[0].clone(), result)]
    } else {
        conversion::process_batch(manager, inputs, jobs, cancel).await
    };

    let mut failures = 0usize;
    for (input, result) in results {
        match result {
            Ok(conversion::ProcessOutcome::Converted(report)) => {
                println!(
                    "converted: {} -> {} ({}x{}{})",
                    input.display(),
                    report.output.display(),
                    report.width,
                    report.height,
                    if report.input_deleted {
                        ", source deleted"
                    } else {
                        ""
                    }
                );
            }
            Ok(conversion::ProcessOutcome::Skipped { reason }) => {
                println!("skipped: {reason}");
            }
            Ok(conversion::ProcessOutcome::Cancelled) => {
                println!("cancelled: {}", input.display());
            }
            Err(e) => {
                failures += 1;
                eprintln!("failed: {}: {e:#}", input.display());
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} conversion(s) failed");
    }
    Ok(())
}

/// Print the decision set and the encoder invocation without running it.
fn dry_run_file(config: &config::Config, input: &std::path::Path) -> Result<()> {
    let layout = layout::FileLayout::new(input)?;
    let ffprobe = mp4forge_encode::get_tool_path("ffprobe", config.tools.ffprobe.as_deref())?;
    let info = mp4forge_probe::probe_file(&ffprobe, &layout.input)?;

    let policy = config.policy();
    let decisions = selection::select(&info, &policy, &layout)?;
    let spec = options::synthesize(&decisions, &policy);
    let output = layout.output_path(config.output.dir.as_deref(), &config.output.extension);

    println!("{}", serde_json::to_string_pretty(&decisions)?);
    println!();
    println!("ffmpeg {}", spec.to_args(&layout.input, &output).join(" "));
    Ok(())
}

fn probe_file(
    file: &std::path::Path,
    config_path: Option<&std::path::Path>,
    json: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let ffprobe = mp4forge_encode::get_tool_path("ffprobe", config.tools.ffprobe.as_deref())?;
    let info = mp4forge_probe::probe_file(&ffprobe, file)?;

    if json {
        let json_str = serde_json::to_string_pretty(&info)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", file.display());
    if let Some(ref name) = info.format.name {
        println!("Container: {}", name);
    }
    if let Some(duration) = info.format.duration {
        let secs = duration as u64;
        println!(
            "Duration: {:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        );
    }
    if let Some(bit_rate) = info.format.bit_rate {
        println!("Bitrate: {:.0} kb/s", bit_rate / 1000.0);
    }

    println!("\nStreams: {}", info.streams.len());
    for stream in &info.streams {
        match stream {
            mp4forge_probe::Stream::Video(v) => {
                print!("  [{}] video {} {}x{}", v.index, v.codec, v.width, v.height);
                if let Some(fps) = v.fps {
                    print!(" {:.3} fps", fps);
                }
                if let Some(ref profile) = v.profile {
                    print!(" ({profile})");
                }
                if v.attached_pic {
                    print!(" [poster]");
                }
                println!();
            }
            mp4forge_probe::Stream::Audio(a) => {
                print!("  [{}] audio {} {}ch", a.index, a.codec, a.channels);
                if let Some(ref lang) = a.language {
                    print!(" ({})", lang);
                }
                if a.default {
                    print!(" [default]");
                }
                println!();
            }
            mp4forge_probe::Stream::Subtitle(s) => {
                print!("  [{}] subtitle {}", s.index, s.codec);
                if let Some(ref lang) = s.language {
                    print!(" ({})", lang);
                }
                if s.forced.is_forced() {
                    print!(" [forced]");
                }
                if s.default {
                    print!(" [default]");
                }
                println!();
            }
        }
    }

    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = mp4forge_encode::check_tools();
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
            print!(" ({})", version.lines().next().unwrap_or(""));
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
        println!("Some tools are missing. Install them to enable conversions.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Output: {} (.{})", config.output.format, config.output.extension);
            println!("  Video codecs: {}", config.video.codecs.join(", "));
            println!("  Audio codecs: {}", config.audio.codecs.join(", "));
            println!("  Bitrate tiers: {}", config.video.bitrate_ceilings.len());
            println!(
                "  Audio languages: {}",
                if config.audio.languages.is_empty() {
                    "any".to_string()
                } else {
                    config.audio.languages.join(", ")
                }
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Output: {} (.{})", config.output.format, config.output.extension);
        }
    }

    Ok(())
}
