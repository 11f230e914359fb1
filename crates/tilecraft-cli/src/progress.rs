use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

/// Throttled percent reporter. Fractions are rounded up to whole percents and
/// a line is printed only when the value has grown by at least `step` since
/// the last line.
#[derive(Debug)]
pub struct Throttle {
    step: u32,
    last: Option<u32>,
}

impl Throttle {
    pub fn new(step: u32) -> Self {
        Self {
            step: step.max(1),
            last: None,
        }
    }

    /// Returns the percent to display, if any. Values never go down.
    pub fn advance(&mut self, fraction: f64) -> Option<u32> {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).ceil() as u32;

        match self.last {
            Some(last) if percent < last.saturating_add(self.step) => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }
}

/// Completion counter for `total` units of work, safe to tick from worker threads.
#[derive(Debug)]
pub struct Progress {
    total: usize,
    done: AtomicUsize,
    throttle: Option<Mutex<Throttle>>,
}

impl Progress {
    /// `enabled = false` counts silently.
    pub fn new(total: usize, step: u32, enabled: bool) -> Self {
        let progress = Self {
            total,
            done: AtomicUsize::new(0),
            throttle: enabled.then(|| Mutex::new(Throttle::new(step))),
        };
        progress.report(0.0);
        progress
    }

    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let fraction = if self.total == 0 { 1.0 } else { done as f64 / self.total as f64 };
        self.report(fraction);
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    fn report(&self, fraction: f64) {
        let Some(throttle) = &self.throttle else {
            return;
        };
        let Ok(mut throttle) = throttle.lock() else {
            return;
        };
        if let Some(percent) = throttle.advance(fraction) {
            eprintln!("{percent}%");
        }
    }
}
