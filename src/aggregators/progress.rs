//! `ProgressBar` (C5).
//!
//! Ported from `cljob/handler.py`'s `ProgressBar`, which wraps a `pbar`
//! collaborator with `start`/`update`/`finish`. `indicatif::ProgressBar`
//! implements that shape directly; this crate is added here, grounded on
//! its use in `examples/hoffmang9-WesoForge`'s `Cargo.toml`.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};

use crate::aggregate::Aggregator;
use crate::job::Job;

/// Advances a terminal progress bar by one tick per consumed job.
pub struct ProgressBar {
    bar: IndicatifBar,
    done: u64,
}

impl ProgressBar {
    pub fn new(total: u64) -> Self {
        let bar = IndicatifBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        ProgressBar { bar, done: 0 }
    }
}

impl Aggregator for ProgressBar {
    fn consume(&mut self, _job: &Job) {
        self.done += 1;
        self.bar.set_position(self.done);
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.bar.finish_and_clear();
        Ok(())
    }
}
