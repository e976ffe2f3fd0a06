//! Job starter / finalizer pairs (C2).
//!
//! One pair per job kind, ported from `cljob/rsh.py`'s
//! `run_shell_jobs`/`run_upload_jobs`/`run_download_jobs`. `start` spawns a
//! child with piped stdout/stderr; `finalize` drains it fully and, for shell
//! jobs, recovers the real remote exit code from the trailing output line.
//!
//! The pair is exposed as the [`JobRunner`] trait so the supervisor can be
//! driven by a fake runner in tests, without a real `rsh`/`rsync` on PATH.

use std::process::{Child, Command, Output, Stdio};

use crate::job::{Job, JobException, JobKind};

/// Paths to the external tools this crate shells out to, resolved once at
/// startup (see `config::resolve_tools`).
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub rsh: String,
    pub rsync: String,
}

/// The pluggable starter/finalizer pair (C2). One implementation per job
/// kind family; `RshRunner` is the production implementation, shelling out
/// to the configured `rsh`/`rsync` binaries.
pub trait JobRunner: Send + Sync {
    /// Spawn a child process for `job`. May fail synchronously; the
    /// supervisor catches this and records it as `job.exception`.
    fn start(&self, job: &Job) -> std::io::Result<Child>;

    /// Called exactly once per successfully started job, after the child
    /// has exited and its output has been fully drained.
    fn finalize(&self, job: &mut Job, output: Output);
}

/// Production [`JobRunner`] shelling out to `rsh`/`rsync`.
pub struct RshRunner {
    pub tools: ToolPaths,
}

impl JobRunner for RshRunner {
    fn start(&self, job: &Job) -> std::io::Result<Child> {
        start(job, &self.tools)
    }

    fn finalize(&self, job: &mut Job, output: Output) {
        finalize(job, output)
    }
}

/// Spawn the child process for `job`. Mirrors `start_job_func` closures in
/// `cljob/rsh.py`.
pub fn start(job: &Job, tools: &ToolPaths) -> std::io::Result<Child> {
    build_command(job, tools)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}

/// Build (without spawning) the transport `Command` for `job`: `rsh` wrapped
/// in the pipefail/echo-$? recipe for shell jobs, `rsync` with the argv
/// templates from spec.md §6 for upload/download.
fn build_command(job: &Job, tools: &ToolPaths) -> Command {
    match &job.kind {
        JobKind::Shell { cmd, wdir } => {
            let wrapped = wrap_shell_cmd(cmd, wdir);
            let mut command = Command::new(&tools.rsh);
            command.arg(&job.host).arg(wrapped);
            command
        }
        JobKind::Upload { files, target_dir } => {
            let target = format!("{}:{}", job.host, target_dir);
            let mut command = Command::new(&tools.rsync);
            command.arg("-qaz").args(files).arg(target);
            command
        }
        JobKind::Download {
            files,
            target_local_dir,
            remote_base_dir,
        } => {
            let rsync_path_flag = format!("--rsync-path=cd '{remote_base_dir}' && rsync");
            let host_arg = format!("{}:", job.host);
            let mut command = Command::new(&tools.rsync);
            command
                .arg("-qazR")
                .arg(rsync_path_flag)
                .arg(host_arg)
                .args(files.iter().map(|f| format!(":{f}")))
                .arg(target_local_dir);
            command
        }
    }
}

/// Wrap a shell job's command so that the remote exit code survives the
/// `rsh` hop: set `pipefail`/`nounset`/`errexit`, run the command, then
/// `echo $?` so the last stdout line carries the real code. Ported from
/// `cljob/rsh.py::run_shell_jobs.start_job_func` verbatim.
fn wrap_shell_cmd(cmd: &str, wdir: &str) -> String {
    let inner = if wdir.is_empty() {
        cmd.to_string()
    } else {
        format!("mkdir -p \"{wdir}\" && cd \"{wdir}\" && ({cmd})")
    };
    format!("(set -o pipefail; set -u; set -e;\n{inner}\n); echo $?")
}

/// Finalize a completed child: the output has already been fully drained by
/// `Child::wait_with_output`; for shell jobs, recover the real exit code
/// from the trailing stdout line. Called exactly once per successfully
/// started job. Ported from `cljob/rsh.py`'s `end_job_func` closures.
pub fn finalize(job: &mut Job, output: Output) {
    let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
    let transport_retcode = exit_code(&output);

    match &job.kind {
        JobKind::Shell { .. } => {
            let (retcode, stdout) = recover_shell_exit_code(&stdout, transport_retcode);
            job.retcode = Some(retcode);
            job.stdout = Some(stdout);
            job.stderr = Some(stderr);
        }
        JobKind::Upload { .. } | JobKind::Download { .. } => {
            job.retcode = Some(transport_retcode);
            job.stdout = Some(stdout);
            job.stderr = Some(stderr);
        }
    }
}

/// Exit code of a child process, or a negative sentinel derived from the
/// delivering signal when the process was killed rather than exited.
fn exit_code(output: &Output) -> i32 {
    if let Some(code) = output.status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = output.status.signal() {
            return -signal;
        }
    }
    -1
}

/// Recover the real remote exit code from the trailing line of `stdout`.
/// If the last line is not a decimal integer and `stdout` is not itself a
/// single integer, the transport's exit code is retained and `stdout` is
/// left intact — ported from `cljob/rsh.py::end_job_func`.
fn recover_shell_exit_code(stdout: &str, transport_retcode: i32) -> (i32, String) {
    if transport_retcode != 0 {
        return (transport_retcode, stdout.to_string());
    }

    match stdout.rfind('\n') {
        Some(idx) => {
            let tail = &stdout[idx + 1..];
            match tail.trim().parse::<i32>() {
                Ok(code) => (code, stdout[..idx].to_string()),
                Err(_) => (transport_retcode, stdout.to_string()),
            }
        }
        None => match stdout.parse::<i32>() {
            Ok(code) => (code, String::new()),
            Err(_) => (transport_retcode, stdout.to_string()),
        },
    }
}

/// Convert a synchronous spawn failure into a [`JobException`].
pub fn spawn_exception(err: &std::io::Error) -> JobException {
    JobException::from_io(err)
}
