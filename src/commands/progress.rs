//! Terminal progress rendering.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

use jellydl::download::ProgressSink;

/// Renders one progress bar per transfer on stderr.
///
/// Holds at most one live bar; batches reuse the sink sequentially.
pub struct BarSink {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn style(total: Option<u64>) -> ProgressStyle {
        let template = if total.is_some() {
            "{msg:.bold}\n[{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}"
        } else {
            "{msg:.bold}\n{bytes} {bytes_per_sec} {spinner}"
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarSink {
    fn begin(&self, label: &str, total: Option<u64>, offset: u64) {
        let bar = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        bar.set_style(Self::style(total));
        bar.set_message(label.to_string());
        bar.set_position(offset);
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn update(&self, bytes_done: u64) {
        if let Ok(slot) = self.bar.lock()
            && let Some(bar) = slot.as_ref()
        {
            bar.set_position(bytes_done);
        }
    }

    fn finish(&self, label: &str, bytes_done: u64) {
        if let Ok(mut slot) = self.bar.lock()
            && let Some(bar) = slot.take()
        {
            bar.set_position(bytes_done);
            bar.finish_and_clear();
        }
        println!("done: {label}");
    }

    fn note(&self, text: &str) {
        if let Ok(slot) = self.bar.lock()
            && let Some(bar) = slot.as_ref()
        {
            bar.println(text);
            return;
        }
        println!("{text}");
    }
}
