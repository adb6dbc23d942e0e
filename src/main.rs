use anyhow::{Context, Result};
use cadence::args::Cli;
use cadence::audio;
use cadence::config::CadenceConfig;
use cadence::functionals::Functionals;
use cadence::pipeline::Pipeline;
use clap::Parser;
use std::process;

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        log::error!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CadenceConfig::load(path)?,
        None => CadenceConfig::default(),
    };

    let (samples, sample_rate) = audio::load_audio(&cli.in_file)
        .with_context(|| format!("Failed to load audio from {}", cli.in_file))?;

    let mut pipeline = Pipeline::new(config.pipeline, sample_rate)
        .context("Failed to build analysis pipeline")?;

    let frames = pipeline.feed(&samples)?;
    log::info!("Analyzed {} frames", frames.len());

    let f0: Vec<f64> = frames.iter().map(|f| pipeline.f0_of(f)).collect();

    if cli.prints_frames() {
        for (i, frame) in frames.iter().enumerate() {
            let mut line = format!("{:6} {:8.3}", i, frame.time);
            if cli.pitch {
                line.push_str(&format!(" f0={:7.2}", f0[i]));
            }
            if cli.vad {
                let cols: Vec<String> =
                    frame.vad.iter().map(|v| format!("{:6.3}", v)).collect();
                line.push_str(&format!(" vad=[{}]", cols.join(" ")));
            }
            if cli.mfcc {
                let cols: Vec<String> =
                    frame.mfcc.iter().map(|v| format!("{:7.3}", v)).collect();
                line.push_str(&format!(" mfcc=[{}]", cols.join(" ")));
            }
            if cli.plp {
                let cols: Vec<String> =
                    frame.plp.iter().map(|v| format!("{:7.3}", v)).collect();
                line.push_str(&format!(" plp=[{}]", cols.join(" ")));
            }
            println!("{}", line);
        }
    }

    if cli.events {
        for frame in &frames {
            for event in &frame.events {
                println!(
                    "event {} at {:.0}ms (duration {:.0}ms)",
                    event.name, event.time_ms, event.duration_ms
                );
            }
        }
    }

    if cli.functionals {
        let mut func_config = config.functionals;
        if Functionals::new(func_config.clone(), pipeline.frame_step())?.n_features() == 0 {
            log::info!("No functional categories configured, using summary defaults");
            func_config.means.enabled = true;
            func_config.extremes.enabled = true;
            func_config.moments.enabled = true;
            func_config.percentiles.enabled = true;
        }
        let funcs = Functionals::new(func_config, pipeline.frame_step())
            .context("Invalid functionals configuration")?;
        let voiced: Vec<f64> = f0.iter().copied().filter(|&v| v > 0.0).collect();
        let mut out = Vec::new();
        funcs.apply_contour(&voiced, &mut out);
        println!("functionals over {} voiced frames:", voiced.len());
        for (i, v) in out.iter().enumerate() {
            println!("  [{:3}] {:12.6}", i, v);
        }
    }

    Ok(())
}
