use std::{
    collections::HashMap,
    sync::{Arc, LazyLock, Mutex},
    time::Duration,
};

use driverman_core::pipeline::ProgressHandler;
use driverman_dl::types::Progress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nu_ansi_term::Color::Cyan;

use crate::utils::{progress_enabled, Colored};

static MULTI: LazyLock<MultiProgress> = LazyLock::new(MultiProgress::new);

/// Pause progress display, run the closure, then resume.
pub fn suspend<F: FnOnce()>(f: F) {
    MULTI.suspend(f);
}

/// Stop and clear all progress bars.
pub fn stop() {
    MULTI.clear().ok();
}

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix}  {wide_bar:.cyan/dim}  {bytes}/{total_bytes}  {bytes_per_sec}  {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━━─")
}

pub fn create_download_job(prefix: &str) -> ProgressBar {
    let pb = if progress_enabled() {
        MULTI.add(ProgressBar::new(0))
    } else {
        MULTI.add(ProgressBar::hidden())
    };
    pb.set_style(download_style());
    pb.set_prefix(Colored(Cyan, prefix).to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn handle_download_progress(state: Progress, pb: &ProgressBar) {
    match state {
        Progress::Starting {
            total,
        } => {
            pb.set_length(total);
            pb.set_position(0);
        }
        Progress::Chunk {
            current, ..
        } => {
            pb.set_position(current);
        }
        Progress::Complete {
            ..
        } => {
            pb.finish_and_clear();
        }
    }
}

/// One progress bar per driver, dropped once its download completes. A retried download
/// restarts its bar.
pub fn download_handler() -> ProgressHandler {
    let bars: Mutex<HashMap<String, ProgressBar>> = Mutex::default();

    Arc::new(move |driver: &str, state: Progress| {
        let Ok(mut bars) = bars.lock() else {
            return;
        };
        let pb = bars
            .entry(driver.to_string())
            .or_insert_with(|| create_download_job(driver));
        handle_download_progress(state, pb);

        if matches!(state, Progress::Complete { .. }) {
            bars.remove(driver);
        }
    })
}
