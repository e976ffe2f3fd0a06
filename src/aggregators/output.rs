//! `MergeOutput` / `PrintOutput` (C5).
//!
//! Ported from `cljob/handler.py`'s `MergeOutput`/`PrintOutput`: jobs that
//! finished cleanly (`exception == None && retcode == 0`), grouped by the
//! stripped concatenation of stdout/stderr.

use std::collections::HashMap;
use std::io::Write;

use crate::aggregate::{Aggregator, format_host_suffix};
use crate::job::{Job, JobToStr, job_to_str};

/// The output-fingerprint key from spec.md §3: stdout and stderr, stripped,
/// joined by an 80-`=` separator when both are non-empty.
pub fn output_fingerprint(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    match (stdout.is_empty(), stderr.is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{stdout}\n{}\n{stderr}", "=".repeat(80)),
    }
}

struct Group {
    output: String,
    hosts: Vec<String>,
}

/// Deduplicate-and-count clean jobs by output fingerprint; `flush` prints
/// one block per group.
pub struct MergeOutput {
    out: Box<dyn Write + Send>,
    max_jobs_to_list: i64,
    job_to_str: JobToStr,
    groups: HashMap<String, Group>,
}

impl MergeOutput {
    pub fn new(out: Box<dyn Write + Send>, max_jobs_to_list: i64) -> Self {
        MergeOutput {
            out,
            max_jobs_to_list,
            job_to_str,
            groups: HashMap::new(),
        }
    }

    pub fn with_job_to_str(mut self, f: JobToStr) -> Self {
        self.job_to_str = f;
        self
    }
}

impl Aggregator for MergeOutput {
    fn consume(&mut self, job: &Job) {
        if job.exception.is_some() || job.retcode != Some(0) {
            return;
        }
        let key = output_fingerprint(
            job.stdout.as_deref().unwrap_or(""),
            job.stderr.as_deref().unwrap_or(""),
        );
        let entry = self.groups.entry(key.clone()).or_insert_with(|| Group {
            output: key,
            hosts: Vec::new(),
        });
        entry.hosts.push((self.job_to_str)(job));
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        for group in self.groups.values() {
            let suffix = format_host_suffix(group.hosts.clone(), self.max_jobs_to_list);
            writeln!(
                self.out,
                "Output from {} jobs{suffix}\n{}",
                group.hosts.len(),
                group.output
            )?;
            writeln!(self.out)?;
        }
        Ok(())
    }
}

/// Per-job immediate variant of [`MergeOutput`].
pub struct PrintOutput {
    out: Box<dyn Write + Send>,
    job_to_str: JobToStr,
}

impl PrintOutput {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        PrintOutput {
            out,
            job_to_str,
        }
    }

    pub fn with_job_to_str(mut self, f: JobToStr) -> Self {
        self.job_to_str = f;
        self
    }
}

impl Aggregator for PrintOutput {
    fn consume(&mut self, job: &Job) {
        if job.exception.is_some() || job.retcode != Some(0) {
            return;
        }
        let out = output_fingerprint(
            job.stdout.as_deref().unwrap_or(""),
            job.stderr.as_deref().unwrap_or(""),
        );
        let host_info = (self.job_to_str)(job);
        let _ = writeln!(self.out, "Output from {host_info}:\n{out}\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;

    fn ok_job(host: &str, stdout: &str) -> Job {
        let mut job = Job::shell(host, "true", "");
        job.retcode = Some(0);
        job.stdout = Some(stdout.to_string());
        job.stderr = Some(String::new());
        job
    }

    #[test]
    fn two_jobs_same_output_merge_into_one_group() {
        let mut agg = MergeOutput::new(Box::new(Vec::<u8>::new()), -1);
        agg.consume(&ok_job("h1", "hi"));
        agg.consume(&ok_job("h2", "hi"));
        assert_eq!(agg.groups.len(), 1);
        assert_eq!(agg.groups.values().next().unwrap().hosts.len(), 2);
    }

    #[test]
    fn different_output_forms_separate_groups() {
        let mut agg = MergeOutput::new(Box::new(Vec::<u8>::new()), -1);
        agg.consume(&ok_job("h1", "hi"));
        agg.consume(&ok_job("h2", "bye"));
        assert_eq!(agg.groups.len(), 2);
    }

    #[test]
    fn nonzero_retcode_jobs_excluded() {
        let mut agg = MergeOutput::new(Box::new(Vec::<u8>::new()), -1);
        let mut job = ok_job("h1", "hi");
        job.retcode = Some(1);
        agg.consume(&job);
        assert!(agg.groups.is_empty());
    }

    #[test]
    fn fingerprint_joins_stdout_and_stderr_with_separator() {
        let fp = output_fingerprint("out", "err");
        assert_eq!(fp, format!("out\n{}\nerr", "=".repeat(80)));
    }

    #[test]
    fn fingerprint_omits_separator_when_stderr_empty() {
        assert_eq!(output_fingerprint("out", ""), "out");
    }
}
