mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use cli::{Cli, OutputFormat};
use config::Config;
use fluxbeat::audio::decode::decode_audio;
use fluxbeat::observer::{self, FlashTrigger, LogObserver, PeakObserver};
use fluxbeat::{AnalysisRunner, ClipAnalysis, SpectralFluxSample, WindowKind};

#[derive(Serialize)]
struct BandReport<'a> {
    name: &'a str,
    min_frequency: Option<f32>,
    max_frequency: Option<f32>,
    frames: usize,
    peaks: usize,
    samples: Vec<IndexedSample<'a>>,
}

#[derive(Serialize)]
struct IndexedSample<'a> {
    index: usize,
    #[serde(flatten)]
    sample: &'a SpectralFluxSample,
}

#[derive(Serialize)]
struct Report<'a> {
    duration: f32,
    sample_rate: u32,
    fft_size: usize,
    frame_count: usize,
    bands: Vec<BandReport<'a>>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = config::find_config(cli.config.clone()) {
        if let Some(loaded) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }
    // Merge: CLI values win whenever they differ from their defaults
    if cli.fft_size != 1024 { cfg.analysis.fft_size = cli.fft_size; }
    if cli.window != WindowKind::Hamming { cfg.analysis.window = cli.window; }
    if cli.threshold_multiplier != 1.5 { cfg.analysis.threshold_multiplier = cli.threshold_multiplier; }
    if cli.threshold_window != 50 { cfg.analysis.threshold_window_size = cli.threshold_window; }

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    log::info!("fluxbeat - spectral flux onset detection");
    log::info!("Input: {}", cli.input.display());

    log::info!("Decoding audio...");
    let clip = Arc::new(decode_audio(&cli.input)?);

    let bands = cfg.band_configs(clip.sample_rate);
    for band in &bands {
        log::info!(
            "Band '{}': {:?}..{:?} Hz, window {}, multiplier {:.2}",
            band.name,
            band.min_frequency,
            band.max_frequency,
            band.threshold_window_size,
            band.threshold_multiplier
        );
    }

    let runner = AnalysisRunner::new(cli.threads)?;
    let handle = runner
        .submit(Arc::clone(&clip), cfg.analysis.window, bands)
        .context("Failed to start analysis")?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );
    while !handle.is_finished() {
        let (done, total) = handle.progress();
        pb.set_length(total as u64);
        pb.set_position(done as u64);
        std::thread::sleep(Duration::from_millis(50));
    }
    let (done, total) = handle.progress();
    pb.set_length(total as u64);
    pb.set_position(done as u64);
    pb.finish_with_message("Analysis complete");

    let analysis = handle.wait().context("Analysis failed")?;
    log::info!(
        "Analyzed {} frames, duration {:.1}s",
        analysis.frame_count,
        analysis.duration
    );

    if let Some(fps) = cli.replay_fps {
        replay_host_loop(&analysis, fps, cli.peaks_only);
        return Ok(());
    }

    if let Some(time) = cli.at {
        for (band, sample) in analysis.samples_at(time) {
            println!(
                "{:<8} t={:.3}s flux={:.4} threshold={:.4} pruned={:.4} peak={}",
                band,
                sample.time,
                sample.spectral_flux,
                sample.threshold,
                sample.pruned_spectral_flux,
                sample.is_peak
            );
        }
        return Ok(());
    }

    match cli.format {
        OutputFormat::Json => {
            let report = build_report(&analysis, cli.peaks_only);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_text(&analysis, cli.peaks_only),
    }

    Ok(())
}

fn build_report(analysis: &ClipAnalysis, peaks_only: bool) -> Report<'_> {
    Report {
        duration: analysis.duration,
        sample_rate: analysis.sample_rate,
        fft_size: analysis.fft_size,
        frame_count: analysis.frame_count,
        bands: analysis
            .bands
            .iter()
            .map(|band| BandReport {
                name: band.name(),
                min_frequency: band.config().min_frequency,
                max_frequency: band.config().max_frequency,
                frames: band.len(),
                peaks: band.peak_count(),
                samples: band
                    .samples()
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| !peaks_only || s.is_peak)
                    .map(|(index, sample)| IndexedSample { index, sample })
                    .collect(),
            })
            .collect(),
    }
}

fn print_text(analysis: &ClipAnalysis, peaks_only: bool) {
    for band in &analysis.bands {
        println!(
            "{} ({} frames, {} peaks, resolved {:?})",
            band.name(),
            band.len(),
            band.peak_count(),
            band.resolved_range()
        );
        for (index, sample) in band.samples().iter().enumerate() {
            if peaks_only && !sample.is_peak {
                continue;
            }
            println!(
                "  [{:5}] {:8.3}s flux={:10.4} threshold={:10.4} pruned={:10.4}{}",
                index,
                sample.time,
                sample.spectral_flux,
                sample.threshold,
                sample.pruned_spectral_flux,
                if sample.is_peak { "  PEAK" } else { "" }
            );
        }
    }
}

fn replay_host_loop(analysis: &ClipAnalysis, fps: u32, peaks_only: bool) {
    let mut flashes = FlashTrigger::default();
    let mut logger = LogObserver { peaks_only };

    struct Both<'a>(&'a mut FlashTrigger, &'a mut LogObserver);
    impl PeakObserver for Both<'_> {
        fn on_sample(&mut self, band: &str, index: usize, sample: &SpectralFluxSample) {
            self.0.on_sample(band, index, sample);
            self.1.on_sample(band, index, sample);
        }
    }

    observer::replay(
        analysis,
        observer::host_frame_times(analysis.duration, fps),
        &mut Both(&mut flashes, &mut logger),
    );

    for band in &analysis.bands {
        log::info!("Band '{}': {} flashes", band.name(), flashes.flashes(band.name()));
    }
}
