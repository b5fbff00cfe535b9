//! Progress reporting from long-running stages.

use std::sync::Mutex;

/// Receives progress from a stage's inner loop.
///
/// Called synchronously from the loop that does the work (per slide, per
/// archive entry, per uploaded chunk). Implementations must be cheap.
pub trait ProgressSink {
    fn on_progress(&self, current: u64, total: u64, label: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u64, u64, &str),
{
    fn on_progress(&self, current: u64, total: u64, label: &str) {
        self(current, total, label)
    }
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _current: u64, _total: u64, _label: &str) {}
}

/// Reports progress through the `log` facade, once per whole percent.
#[derive(Debug, Default)]
pub struct LogSink {
    last: Mutex<Option<(String, u64)>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for LogSink {
    fn on_progress(&self, current: u64, total: u64, label: &str) {
        let percent = percent(current, total);
        if let Ok(mut last) = self.last.lock() {
            if let Some((prev_label, prev_percent)) = last.as_ref() {
                if prev_label == label && *prev_percent == percent {
                    return;
                }
            }
            *last = Some((label.to_string(), percent));
        }
        log::info!("{}: {}/{} ({}%)", label, current, total, percent);
    }
}

/// Integer percentage, 0 when `total` is 0.
pub fn percent(current: u64, total: u64) -> u64 {
    if total == 0 {
        0
    } else {
        (current.min(total) * 100) / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_closure_sink() {
        let seen = RefCell::new(Vec::new());
        let sink = |c: u64, t: u64, l: &str| seen.borrow_mut().push((c, t, l.to_string()));
        sink.on_progress(1, 4, "slide");
        sink.on_progress(4, 4, "slide");
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[1], (4, 4, "slide".to_string()));
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(5, 4), 100);
    }
}
