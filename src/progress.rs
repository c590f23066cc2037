use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use crate::health::ProgressObserver;

/// Create a progress bar for a health check over `total` bookmarks
pub fn create_health_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb.set_message("🩺 checking links");
    pb
}

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// 把健康检查的批次回调接到进度条上
pub fn health_observer(pb: &ProgressBar) -> ProgressObserver {
    let pb = pb.clone();
    Arc::new(move |completed: usize, total: usize| {
        pb.set_length(total as u64);
        pb.set_position(completed as u64);
    })
}

/// Finish progress bar with success message
pub fn finish_with_success(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("✅ {}", message));
}

/// Finish progress bar with error message
pub fn finish_with_error(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("❌ {}", message));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_moves_bar() {
        let pb = create_health_progress_bar(10);
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        let observer = health_observer(&pb);
        observer(5, 12);
        assert_eq!(pb.position(), 5);
    }
}
