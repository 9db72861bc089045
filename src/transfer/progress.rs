// Progress display
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

const TEMPLATE: &str = "{percent:>3}% [{bar:40}] {eta} {binary_bytes_per_sec} {msg}";

pub struct ProgressTracker {
    progress_bar: ProgressBar,
    transferred_bytes: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total_size: u64) -> Self {
        let progress_bar = ProgressBar::new(total_size);
        let style = ProgressStyle::with_template(TEMPLATE)
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style);

        Self {
            progress_bar,
            transferred_bytes: 0,
            start_time: Instant::now(),
        }
    }

    pub fn update(&mut self, bytes_transferred: u64) {
        self.transferred_bytes = bytes_transferred;
        self.progress_bar.set_position(bytes_transferred);
    }

    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let avg_speed = if elapsed > 0.0 {
            (self.transferred_bytes as f64 / elapsed) as u64
        } else {
            self.transferred_bytes
        };

        self.progress_bar
            .finish_with_message(format!("done (avg speed: {})", format_speed(avg_speed)));
    }

    pub fn abandon(&self) {
        self.progress_bar.abandon_with_message("aborted");
    }
}

fn format_speed(bytes_per_sec: u64) -> String {
    if bytes_per_sec < 1024 {
        format!("{} B/s", bytes_per_sec)
    } else if bytes_per_sec < 1024 * 1024 {
        format!("{:.2} KB/s", bytes_per_sec as f64 / 1024.0)
    } else if bytes_per_sec < 1024 * 1024 * 1024 {
        format!("{:.2} MB/s", bytes_per_sec as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB/s", bytes_per_sec as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_units() {
        assert_eq!(format_speed(512), "512 B/s");
        assert_eq!(format_speed(1536), "1.50 KB/s");
        assert_eq!(format_speed(3 * 1024 * 1024), "3.00 MB/s");
        assert_eq!(format_speed(2 * 1024 * 1024 * 1024), "2.00 GB/s");
    }
}
