use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub static PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {human_pos:>7}/{human_len:7} {msg}";
pub static SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:2.cyan/blue} {msg}";
pub static SPINNER_TOTALS_TEMPLATE: &str = "{spinner:2.cyan/blue} {msg}: {human_pos}";
pub static BYTES_PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {decimal_bytes:>7}/{decimal_total_bytes:7} @ {decimal_bytes_per_sec} [eta: {eta}] {msg}";

pub fn new_spinner(message: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(SPINNER_TEMPLATE).expect("Invalid spinner template");
    ProgressBar::new_spinner().with_message(message.to_string()).with_style(style)
}

pub fn new_progress_bar(total: usize, message: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE).expect("Invalid progress bar template");
    ProgressBar::new(total as u64).with_message(message.to_string()).with_style(style)
}

pub fn new_progress_bar_bytes(total: usize, message: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(BYTES_PROGRESS_TEMPLATE).expect("Invalid progress bar template");
    ProgressBar::new(total as u64).with_message(message.to_string()).with_style(style)
}

pub fn new_spinner_totals(message: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(SPINNER_TOTALS_TEMPLATE).expect("Invalid spinner template");
    ProgressBar::new_spinner().with_message(message.to_string()).with_style(style)
}

/// Progress surface for one transform-and-load run: bytes consumed from the
/// compressed source, entries the parser handed to the worker pool, entries
/// it rejected as invalid, and rows the writer has spooled to disk.
#[derive(Clone)]
pub struct PipelineBars {
    _bars: MultiProgress,
    pub bytes_read: ProgressBar,
    pub entries_processed: ProgressBar,
    pub entries_invalid: ProgressBar,
    pub rows_written: ProgressBar,
}

impl PipelineBars {
    pub fn new(total_bytes: usize) -> PipelineBars {
        let bars = MultiProgress::new();
        let bytes_read = new_progress_bar_bytes(total_bytes, "Reading source");
        let entries_processed = new_spinner_totals("Entries processed");
        let entries_invalid = new_spinner_totals("Entries rejected");
        let rows_written = new_spinner_totals("Rows spooled");

        bars.add(bytes_read.clone());
        bars.add(entries_processed.clone());
        bars.add(entries_invalid.clone());
        bars.add(rows_written.clone());

        // the tick has to start after adding to the MultiProgress, otherwise
        // the first render happens before the bar has a target to draw into
        bytes_read.enable_steady_tick(Duration::from_millis(200));
        entries_processed.enable_steady_tick(Duration::from_millis(200));
        entries_invalid.enable_steady_tick(Duration::from_millis(200));
        rows_written.enable_steady_tick(Duration::from_millis(200));

        PipelineBars { _bars: bars, bytes_read, entries_processed, entries_invalid, rows_written }
    }

    pub fn finish(&self) {
        self.bytes_read.finish();
        self.entries_processed.finish();
        self.entries_invalid.finish();
        self.rows_written.finish();
    }
}
