mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

use beatscan::audio::decode::decode_audio;
use beatscan::audio::filter::FilterConfig;
use beatscan::config::{self, Config, DEFAULT_LOWEST_HEARD_FREQUENCY, DEFAULT_SAMPLE_DEPTH};
use beatscan::{AnalysisResult, Analyser, Channel};
use cli::Cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let channels = cli.selected_channels()?;

    // Load config: explicit --config path, or auto-detect beatscan.toml / global config
    let config_path = cli.config.clone().or_else(find_config);
    let mut file_config = Config::default();
    if let Some(ref path) = config_path {
        match config::load_config(path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                file_config = cfg;
            }
            Err(err) => log::warn!("{:#}", err),
        }
    }
    merge_cli(&cli, &mut file_config);

    let analyser = Analyser::new(file_config.settings().context("Invalid analysis settings")?);
    let settings = analyser.settings();

    log::info!("beatscan - per-window audio features");
    log::info!(
        "Wave: {} points ({} samples x {} points)",
        settings.wave_len(),
        settings.lowest_heard_frequency(),
        settings.sample_depth()
    );
    if let Some(timeout) = settings.timeout() {
        log::info!("Per-task timeout: {:.2?}", timeout);
    }

    // 1. Decode every clip up front
    let mut clips = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
        log::info!("Decoding {}...", input.display());
        let audio = decode_audio(input, !cli.keep_channels)?;
        let name = audio.name.clone();
        clips.push((name, Arc::new(audio.into_signal()?)));
    }

    // 2. Analyse clips concurrently, one scheduler each
    let handles: Vec<_> = clips
        .into_iter()
        .map(|(name, signal)| analyser.analyse(name, signal))
        .collect();

    let pb = ProgressBar::new(handles.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} clips")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let clip = handle.clip().to_string();
        let result = handle
            .wait()
            .with_context(|| format!("Analysis of '{}' failed", clip))?;
        results.push(result);
        pb.inc(1);
    }
    pb.finish_with_message("Analysis complete");

    // 3. Report
    for result in &results {
        print_report(result, &channels, cli.rows);
    }

    Ok(())
}

fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("beatscan.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("beatscan").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("beatscan").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// CLI values apply only when moved away from their defaults.
fn merge_cli(cli: &Cli, config: &mut Config) {
    if cli.sample_depth != DEFAULT_SAMPLE_DEPTH {
        config.analysis.sample_depth = cli.sample_depth;
    }
    if cli.lowest_heard_frequency != DEFAULT_LOWEST_HEARD_FREQUENCY {
        config.analysis.lowest_heard_frequency = cli.lowest_heard_frequency;
    }
    if cli.timeout.is_some() {
        config.analysis.timeout = cli.timeout;
    }
    if cli.average_split != 0 || cli.range != 0.0 {
        let filters = &mut config.filters;
        for filter in [&mut filters.frequency, &mut filters.volume, &mut filters.pitch] {
            override_filter(filter, cli);
        }
    }
}

fn override_filter(filter: &mut FilterConfig, cli: &Cli) {
    if cli.average_split != 0 {
        filter.average_split = cli.average_split;
    }
    if cli.range != 0.0 {
        filter.range = cli.range;
    }
}

fn print_report(result: &AnalysisResult, channels: &[Channel], rows: usize) {
    let windows = result.window_count();
    println!();
    println!(
        "{}: {:.2}s, {}Hz, {} window(s)",
        result.clip, result.info.duration, result.info.sample_rate, windows
    );
    if windows == 0 {
        println!("  clip is shorter than one wave");
        return;
    }

    let mut header = format!("{:>6} {:>9}", "window", "time");
    for channel in channels {
        header.push_str(&format!(" {:>12}", channel.name()));
    }
    println!("{}", header);

    let shown = if rows == 0 { windows } else { rows.min(windows) };
    for index in 0..shown {
        let mut line = format!("{:>6} {:>8.3}s", index, result.window_time(index));
        for &channel in channels {
            line.push_str(&format!(" {:>12.4}", result.channel(channel)[index]));
        }
        println!("{}", line);
    }
    if shown < windows {
        println!("  ... {} more window(s)", windows - shown);
    }

    for &channel in channels {
        if let Some(summary) = result.summary(channel) {
            println!(
                "  {:<9} mean={:.4} min={:.4} max={:.4}",
                channel.name(),
                summary.mean,
                summary.min,
                summary.max
            );
        }
    }
}
