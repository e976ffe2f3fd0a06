//! `MergeErrors` / `PrintErrors` (C5).
//!
//! Ported from `cljob/handler.py`'s `MergeErrors`/`PrintErrors`: jobs with
//! `exception == None && retcode != 0` (including timed-out jobs, whose
//! `retcode` is unset). Per spec.md §9's Open Question on `MergeErrors`
//! stdout bookkeeping, stdout is stored inside the group record here, not
//! hoisted into the outer map as the original source does.

use std::collections::HashMap;
use std::io::Write;

use crate::aggregate::{Aggregator, format_host_suffix};
use crate::job::{Job, JobToStr, job_to_str};

fn indent_continuation_lines(s: &str) -> String {
    s.replace('\n', "\n\t")
}

struct Group {
    retcode: Option<i32>,
    stderr: String,
    stdout: String,
    hosts: Vec<String>,
}

fn group_key(retcode: Option<i32>, stderr: &str, stdout: &str) -> String {
    let rc = retcode.map(|c| c.to_string()).unwrap_or_else(|| "None".to_string());
    if stdout.is_empty() {
        format!("{rc}:{stderr}")
    } else {
        format!("{rc}:{stderr}\n{stdout}")
    }
}

/// Deduplicate-and-count failed (non-zero exit or timed-out) jobs by
/// `(retcode, stderr, stdout)`.
pub struct MergeErrors {
    out: Box<dyn Write + Send>,
    max_jobs_to_list: i64,
    job_to_str: JobToStr,
    groups: HashMap<String, Group>,
}

impl MergeErrors {
    pub fn new(out: Box<dyn Write + Send>, max_jobs_to_list: i64) -> Self {
        MergeErrors {
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

impl Aggregator for MergeErrors {
    fn consume(&mut self, job: &Job) {
        if job.exception.is_some() || job.retcode == Some(0) {
            return;
        }
        let stderr = job.stderr.clone().unwrap_or_default();
        let stdout = job.stdout.clone().unwrap_or_default();
        let key = group_key(job.retcode, &stderr, &stdout);
        let entry = self.groups.entry(key).or_insert_with(|| Group {
            retcode: job.retcode,
            stderr: stderr.clone(),
            stdout: stdout.clone(),
            hosts: Vec::new(),
        });
        entry.hosts.push((self.job_to_str)(job));
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        for group in self.groups.values() {
            let suffix = format_host_suffix(group.hosts.clone(), self.max_jobs_to_list);
            match group.retcode {
                None => {
                    writeln!(self.out, "Failed by timeout {} jobs{suffix}", group.hosts.len())?;
                }
                Some(rc) => {
                    writeln!(
                        self.out,
                        "Fail with code {rc} in {} jobs{suffix}",
                        group.hosts.len()
                    )?;
                    writeln!(self.out, "Stderr: {}", indent_continuation_lines(&group.stderr))?;
                    if !group.stdout.is_empty() {
                        writeln!(self.out, "Stdout: {}", indent_continuation_lines(&group.stdout))?;
                    }
                    writeln!(self.out)?;
                }
            }
        }
        Ok(())
    }
}

/// Per-job immediate variant of [`MergeErrors`].
pub struct PrintErrors {
    out: Box<dyn Write + Send>,
    job_to_str: JobToStr,
}

impl PrintErrors {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        PrintErrors {
            out,
            job_to_str,
        }
    }

    pub fn with_job_to_str(mut self, f: JobToStr) -> Self {
        self.job_to_str = f;
        self
    }
}

impl Aggregator for PrintErrors {
    fn consume(&mut self, job: &Job) {
        if job.exception.is_some() || job.retcode == Some(0) {
            return;
        }
        let host_info = (self.job_to_str)(job);
        match job.retcode {
            None => {
                let _ = writeln!(self.out, "Failed by timeout job: {host_info}.");
            }
            Some(rc) => {
                let _ = writeln!(self.out, "Fail with code {rc} in job {host_info}.");
                let stderr = job.stderr.as_deref().unwrap_or("");
                let _ = writeln!(self.out, "Stderr: {}", indent_continuation_lines(stderr));
                if let Some(stdout) = job.stdout.as_deref().filter(|s| !s.is_empty()) {
                    let _ = writeln!(self.out, "Stdout: {}", indent_continuation_lines(stdout));
                }
            }
        }
        let _ = writeln!(self.out);
    }
}
