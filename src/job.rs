//! Job records (C1).
//!
//! Ported from `cljob/job.py`'s `ShellJob`/`UploadJob`/`DownloadJob` trio: a
//! value with identity (host, per-kind payload) and a mutable result slot,
//! filled in exactly once by the supervisor.

use std::path::PathBuf;

/// A local failure to spawn or signal a job, carrying a fingerprint-friendly
/// `(kind, message, trace)` triple in place of a dynamic language exception.
#[derive(Debug, Clone)]
pub struct JobException {
    /// Stand-in for Python's `exception.__class__.__module__.__name__`.
    pub kind: String,
    /// Stand-in for `str(exception)`.
    pub message: String,
    /// Diagnostic text (anyhow's chained `{:?}` rendering), if any.
    pub trace: Option<String>,
}

impl JobException {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        JobException {
            kind: kind.into(),
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    pub fn from_io(err: &std::io::Error) -> Self {
        JobException::new("io::Error", err.to_string())
    }

    /// First line of `message`, used by the one-line exception headers.
    pub fn message_first_line(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Per-kind payload. Shared outcome fields live on [`Job`] itself.
#[derive(Debug, Clone)]
pub enum JobKind {
    Shell {
        cmd: String,
        wdir: String,
    },
    Upload {
        files: Vec<PathBuf>,
        target_dir: String,
    },
    Download {
        files: Vec<String>,
        target_local_dir: PathBuf,
        remote_base_dir: String,
    },
}

/// A single fan-out job: target host, payload, and the mutable result slot
/// the supervisor fills in exactly once.
#[derive(Debug, Clone)]
pub struct Job {
    pub host: String,
    pub kind: JobKind,

    /// Set exactly once, by the finalizer, on normal completion.
    pub retcode: Option<i32>,
    /// Captured once per completed job, trimmed of trailing whitespace.
    pub stdout: Option<String>,
    pub stderr: Option<String>,

    /// Local spawn or signal-delivery failure. Mutually exclusive with
    /// `retcode` being meaningful — see spec.md §3 invariants.
    pub exception: Option<JobException>,

    /// Set by the supervisor when the batch timeout fires while this job
    /// was still running.
    pub timed_out: bool,
}

impl Job {
    pub fn shell(host: impl Into<String>, cmd: impl Into<String>, wdir: impl Into<String>) -> Self {
        Job::new(
            host,
            JobKind::Shell {
                cmd: cmd.into(),
                wdir: wdir.into(),
            },
        )
    }

    pub fn upload(
        host: impl Into<String>,
        files: Vec<PathBuf>,
        target_dir: impl Into<String>,
    ) -> Self {
        Job::new(
            host,
            JobKind::Upload {
                files,
                target_dir: target_dir.into(),
            },
        )
    }

    pub fn download(
        host: impl Into<String>,
        files: Vec<String>,
        target_local_dir: PathBuf,
        remote_base_dir: impl Into<String>,
    ) -> Self {
        Job::new(
            host,
            JobKind::Download {
                files,
                target_local_dir,
                remote_base_dir: remote_base_dir.into(),
            },
        )
    }

    fn new(host: impl Into<String>, kind: JobKind) -> Self {
        Job {
            host: host.into(),
            kind,
            retcode: None,
            stdout: None,
            stderr: None,
            exception: None,
            timed_out: false,
        }
    }

    /// Working-directory string shared by all three kinds, used by the
    /// `__str__`-equivalent formatters below.
    fn wdir(&self) -> &str {
        match &self.kind {
            JobKind::Shell { wdir, .. } => wdir,
            JobKind::Upload { target_dir, .. } => target_dir,
            JobKind::Download {
                remote_base_dir, ..
            } => remote_base_dir,
        }
    }

    /// Default `job_to_str`: mirrors `cljob/job.py`'s `__str__` methods.
    pub fn to_label(&self) -> String {
        match &self.kind {
            JobKind::Shell { cmd, wdir } => format!("ShellCmd {}:{} {}", self.host, wdir, cmd),
            JobKind::Upload { target_dir, .. } => format!("Upload to {}:{}", self.host, target_dir),
            JobKind::Download {
                remote_base_dir, ..
            } => format!("Download from {}:{}", self.host, remote_base_dir),
        }
    }

    /// `job_host_path` from `cljob/job.py`: `host:wdir` with a trailing path
    /// separator stripped.
    pub fn host_path(&self) -> String {
        let wdir = self.wdir().trim_end_matches(std::path::MAIN_SEPARATOR);
        format!("{}:{}", self.host, wdir)
    }

    /// `job_path` from `cljob/job.py`: `host` alone when `wdir` is empty,
    /// else `host:wdir`.
    pub fn path(&self) -> String {
        let wdir = self.wdir();
        if wdir.is_empty() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, wdir)
        }
    }

    /// True once the supervisor has filled in the result slot, in any
    /// completion category (success, non-zero exit, timeout, exception).
    pub fn is_completed(&self) -> bool {
        self.exception.is_some() || self.retcode.is_some() || self.timed_out
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_label())
    }
}

/// A `job_to_str`-shaped function pointer, selectable by the CLI's
/// `--id-format` flag (see SPEC_FULL.md "SUPPLEMENTED FEATURES").
pub type JobToStr = fn(&Job) -> String;

pub fn job_to_str(job: &Job) -> String {
    job.to_label()
}

pub fn job_host(job: &Job) -> String {
    job.host.clone()
}

pub fn job_host_path(job: &Job) -> String {
    job.host_path()
}

pub fn job_path(job: &Job) -> String {
    job.path()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_label_matches_python_format() {
        let job = Job::shell("h1", "ls -la", "/tmp/x");
        assert_eq!(job.to_label(), "ShellCmd h1:/tmp/x ls -la");
    }

    #[test]
    fn upload_label_matches_python_format() {
        let job = Job::upload("h1", vec![PathBuf::from("a.txt")], "/srv");
        assert_eq!(job.to_label(), "Upload to h1:/srv");
    }

    #[test]
    fn download_label_matches_python_format() {
        let job = Job::download("h1", vec!["a.txt".into()], PathBuf::from("./out"), "/srv");
        assert_eq!(job.to_label(), "Download from h1:/srv");
    }

    #[test]
    fn path_omits_colon_when_wdir_empty() {
        let job = Job::shell("h1", "true", "");
        assert_eq!(job.path(), "h1");
    }

    #[test]
    fn path_includes_wdir_when_present() {
        let job = Job::shell("h1", "true", "/opt");
        assert_eq!(job.path(), "h1:/opt");
    }

    #[test]
    fn host_path_strips_trailing_separator() {
        let job = Job::shell("h1", "true", "/opt/");
        assert_eq!(job.host_path(), "h1:/opt");
    }

    #[test]
    fn not_completed_until_outcome_set() {
        let job = Job::shell("h1", "true", "");
        assert!(!job.is_completed());
    }
}
