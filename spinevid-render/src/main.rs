use anyhow::Context;
use spinevid_render::cli::{self, Command, Options, USAGE};
use spinevid_render::{CancellationToken, FfmpegEncoder, RenderError, RendererPool, run_jobs};
use spinevid_wgpu::FrameRasterizer;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = match cli::parse_args(std::env::args().skip(1)) {
        Ok(Command::Help) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Ok(Command::Run(options)) => options,
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };
    if let Some(missing) = options.indexes.iter().find(|p| !p.is_file()) {
        eprintln!("error: file not found: {}", missing.display());
        return ExitCode::from(2);
    }

    match run(options) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every job succeeded.
fn run(options: Options) -> anyhow::Result<bool> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("cancelling, waiting for encoders to finish");
        on_signal.cancel();
    })
    .context("failed to install the Ctrl-C handler")?;

    let pool = RendererPool::new(options.render_threads, |_| {
        FrameRasterizer::new().map_err(RenderError::from)
    })
    .context("failed to start the rasterizer")?;
    let encoder = FfmpegEncoder::new(&options.ffmpeg);

    log::info!("Beginning render");
    let reports = run_jobs(&options.indexes, &options.job, &pool, &encoder, &cancel)?;

    let mut ok = true;
    for report in &reports {
        match &report.result {
            Ok(outcome) if outcome.is_success() => {}
            Ok(outcome) => {
                ok = false;
                log::error!("{}: {outcome:?}", report.index.display());
            }
            Err(e) => {
                ok = false;
                log::error!("{}: {e}", report.index.display());
            }
        }
    }
    Ok(ok)
}
