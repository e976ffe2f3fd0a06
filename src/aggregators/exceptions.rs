//! `MergeExceptions` / `PrintExceptions` (C5).
//!
//! Ported from `cljob/handler.py`'s `MergeExceptions`/`PrintExceptions` and
//! their shared `exception_hash`/`exception_description` helpers.

use std::collections::HashMap;
use std::io::Write;

use crate::aggregate::{Aggregator, format_host_suffix};
use crate::job::{Job, JobException, JobToStr, job_to_str};

/// The error-fingerprint key from spec.md §3:
/// `"<kind>: <message>\n<trace-or-None>"`.
pub fn exception_hash(ex: &JobException) -> String {
    let trace = match &ex.trace {
        Some(t) => format!("\n{t}"),
        None => "\nNone".to_string(),
    };
    format!("{}: {}{trace}", ex.kind, ex.message)
}

/// The one-line `"Exception class: ..."` plus indented description block,
/// ported from `exception_description`. Internal newlines in `ex.message`
/// are re-indented so continuation lines align under `0 : `, matching
/// `cljob/handler.py`'s `arg.replace('\n', '\n\t' + ' '*(len(str(arg_num)) + 3))`.
pub fn exception_description(ex: &JobException) -> String {
    let indent = "\n\t".to_string() + &" ".repeat("0".len() + 3);
    let message = ex.message.replace('\n', &indent);
    format!("Exception class: {}\nArgs:\n\t0 : {}\n", ex.kind, message)
}

struct Group {
    exception: JobException,
    hosts: Vec<String>,
}

/// Deduplicate-and-count jobs with `exception != None`, grouped by
/// [`exception_hash`]. `flush` prints one block per group.
pub struct MergeExceptions {
    out: Box<dyn Write + Send>,
    max_jobs_to_list: i64,
    job_to_str: JobToStr,
    groups: HashMap<String, Group>,
}

impl MergeExceptions {
    pub fn new(out: Box<dyn Write + Send>, max_jobs_to_list: i64) -> Self {
        MergeExceptions {
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

impl Aggregator for MergeExceptions {
    fn consume(&mut self, job: &Job) {
        let Some(ex) = &job.exception else { return };
        let key = exception_hash(ex);
        let entry = self.groups.entry(key).or_insert_with(|| Group {
            exception: ex.clone(),
            hosts: Vec::new(),
        });
        entry.hosts.push((self.job_to_str)(job));
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        for group in self.groups.values() {
            let hosts_msg = format_host_suffix(group.hosts.clone(), self.max_jobs_to_list);
            let header = format!(
                "{}: {}",
                group.exception.kind,
                group.exception.message_first_line()
            );
            writeln!(
                self.out,
                "Exception '{header}' in {} jobs{hosts_msg}.",
                group.hosts.len()
            )?;
            writeln!(self.out, "{}", exception_description(&group.exception).trim_end())?;
            if let Some(trace) = &group.exception.trace {
                writeln!(self.out, "Traceback:")?;
                writeln!(self.out, "{trace}")?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }
}

/// Per-job immediate variant of [`MergeExceptions`]: emitted in `consume`
/// rather than deduplicated at `flush`.
pub struct PrintExceptions {
    out: Box<dyn Write + Send>,
    job_to_str: JobToStr,
}

impl PrintExceptions {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        PrintExceptions {
            out,
            job_to_str,
        }
    }

    pub fn with_job_to_str(mut self, f: JobToStr) -> Self {
        self.job_to_str = f;
        self
    }
}

impl Aggregator for PrintExceptions {
    fn consume(&mut self, job: &Job) {
        let Some(ex) = &job.exception else { return };
        let job_info = (self.job_to_str)(job);
        let header = format!("{}: {}", ex.kind, ex.message_first_line());
        let _ = writeln!(self.out, "Exception '{header}' in job {job_info}.");
        let _ = writeln!(self.out, "{}", exception_description(ex).trim_end());
        if let Some(trace) = &ex.trace {
            let _ = writeln!(self.out, "Traceback:");
            let _ = writeln!(self.out, "{trace}");
        }
        let _ = writeln!(self.out);
    }
}
