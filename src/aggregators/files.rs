//! `DoneJobsToFile` / `FailedJobsAppendFile` (C5).
//!
//! Ported from `cljob/handler.py`'s aggregators of the same name: plain
//! per-job identifier lists, meant for resuming a batch against only the
//! hosts that didn't finish cleanly last time.

use std::io::Write;

use crate::aggregate::Aggregator;
use crate::job::{Job, JobToStr, job_to_str};

/// Writes one formatted identifier per job that finished cleanly
/// (`exception == None && retcode == 0`), truncating any prior contents.
pub struct DoneJobsToFile {
    out: Box<dyn Write + Send>,
    job_to_str: JobToStr,
}

impl DoneJobsToFile {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        DoneJobsToFile { out, job_to_str }
    }

    pub fn with_job_to_str(mut self, f: JobToStr) -> Self {
        self.job_to_str = f;
        self
    }
}

impl Aggregator for DoneJobsToFile {
    fn consume(&mut self, job: &Job) {
        if job.exception.is_some() || job.retcode != Some(0) {
            return;
        }
        let _ = writeln!(self.out, "{}", (self.job_to_str)(job));
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Appends one formatted identifier per job that did not finish cleanly
/// (non-zero retcode, timeout, or exception).
pub struct FailedJobsAppendFile {
    out: Box<dyn Write + Send>,
    job_to_str: JobToStr,
}

impl FailedJobsAppendFile {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        FailedJobsAppendFile { out, job_to_str }
    }

    pub fn with_job_to_str(mut self, f: JobToStr) -> Self {
        self.job_to_str = f;
        self
    }
}

impl Aggregator for FailedJobsAppendFile {
    fn consume(&mut self, job: &Job) {
        if job.exception.is_none() && job.retcode == Some(0) {
            return;
        }
        let _ = writeln!(self.out, "{}", (self.job_to_str)(job));
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobException};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            self.0.lock().unwrap().flush()
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn ok_job(host: &str) -> Job {
        let mut job = Job::shell(host, "true", "");
        job.retcode = Some(0);
        job
    }

    fn failed_job(host: &str) -> Job {
        let mut job = Job::shell(host, "false", "");
        job.retcode = Some(1);
        job
    }

    #[test]
    fn done_jobs_file_skips_failures() {
        let buf = SharedBuf::default();
        let mut agg = DoneJobsToFile::new(Box::new(buf.clone()));
        agg.consume(&ok_job("h1"));
        agg.consume(&failed_job("h2"));
        let contents = buf.contents();
        assert!(contents.contains("h1"));
        assert!(!contents.contains("h2"));
    }

    #[test]
    fn failed_jobs_file_skips_clean_jobs() {
        let buf = SharedBuf::default();
        let mut agg = FailedJobsAppendFile::new(Box::new(buf.clone()));
        agg.consume(&ok_job("h1"));
        agg.consume(&failed_job("h2"));
        let contents = buf.contents();
        assert!(!contents.contains("h1"));
        assert!(contents.contains("h2"));
    }

    #[test]
    fn failed_jobs_file_includes_exceptions() {
        let buf = SharedBuf::default();
        let mut agg = FailedJobsAppendFile::new(Box::new(buf.clone()));
        let mut job = ok_job("h1");
        job.exception = Some(JobException::new("io::Error", "boom"));
        agg.consume(&job);
        assert!(buf.contents().contains("h1"));
    }
}
