//! Progress bar fed by run snapshots

use crate::display::format_duration;
use batchpress_engine::ChannelSink;
use batchpress_types::{Phase, ProgressSink, RunSnapshot};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Renders published snapshots on a progress bar
///
/// Snapshots arrive over a channel and are coalesced, so a slow terminal never
/// holds up the aggregator.
pub struct ProgressRenderer {
    sink: ChannelSink,
    task: JoinHandle<()>,
}

impl ProgressRenderer {
    /// Start rendering; with `enabled == false` snapshots are only drained
    pub fn spawn(enabled: bool) -> Self {
        let (sink, rx) = ChannelSink::channel();
        let bar = enabled.then(new_bar);
        let task = tokio::spawn(render(rx, bar));
        Self { sink, task }
    }

    /// Sink to hand to the processor
    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        Arc::new(self.sink.clone())
    }

    /// Wait until the final snapshot was rendered
    pub async fn finish(self) {
        drop(self.sink);
        let _ = self.task.await;
    }
}

fn new_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{wide_bar:.cyan/blue}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn render(mut rx: mpsc::UnboundedReceiver<RunSnapshot>, bar: Option<ProgressBar>) {
    let mut last_update: Option<Instant> = None;
    let mut failures_shown = 0;

    while let Some(mut snapshot) = rx.recv().await {
        while let Ok(next) = rx.try_recv() {
            snapshot = next;
        }

        let Some(pb) = &bar else {
            if snapshot.is_complete {
                break;
            }
            continue;
        };

        if snapshot.fail_count > failures_shown {
            if let Some(error) = &snapshot.last_error {
                pb.suspend(|| {
                    eprintln!("{} {}", style("✗").red().bold(), style(error).red());
                });
            }
            failures_shown = snapshot.fail_count;
        }

        if snapshot.is_complete {
            pb.finish_and_clear();
            break;
        }

        if last_update.is_some_and(|t| t.elapsed() < UPDATE_INTERVAL) {
            continue;
        }
        last_update = Some(Instant::now());

        pb.set_length(snapshot.total_files);
        pb.set_position(snapshot.processed_files);
        pb.set_message(status_message(&snapshot));
    }

    if let Some(pb) = bar {
        if !pb.is_finished() {
            pb.finish_and_clear();
        }
    }
}

/// One-line description of a snapshot for the progress bar
pub fn status_message(snapshot: &RunSnapshot) -> String {
    match snapshot.phase {
        Phase::Processing => {
            let file = snapshot
                .current_file
                .as_ref()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or("starting");
            if snapshot.processed_files > 0 {
                format!(
                    "Compressing: {} - {:.1}% saved - ETA: {}",
                    file,
                    snapshot.average_ratio,
                    format_duration(snapshot.estimated_remaining)
                )
            } else {
                format!("Compressing: {}", file)
            }
        }
        phase => {
            let mut label = phase.to_string();
            if let Some(first) = label.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            label
        }
    }
}
