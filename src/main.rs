//! clfleet — entry point
//!
//! A thin CLI binary (C7) wiring host lists and job parameters into the
//! driver. Human-readable reports go to stdout; `tracing` diagnostics go to
//! stderr.

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use clfleet::aggregate::Aggregator;
use clfleet::aggregators::{
    DoneJobsToFile, FailedJobsAppendFile, MergeErrors, MergeOutput, PrintErrors, PrintExceptions,
    PrintOutput, ProgressBar,
};
use clfleet::config;
use clfleet::driver::drive;
use clfleet::exec::RshRunner;
use clfleet::job::{Job, JobToStr, job_host, job_host_path, job_path, job_to_str};
use clfleet::supervisor::SupervisorConfig;

#[derive(Debug, Parser)]
#[command(name = "clfleet")]
#[command(about = "Fan out shell/upload/download jobs across a fleet of hosts", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv); logs go to stderr.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Alternate `job_to_str` formatters selectable via `--id-format`, ported
/// from `cljob/job.py`'s `job_to_str`/`job_host`/`job_host_path`/`job_path`.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum IdFormat {
    /// Default: `ShellCmd host:wdir cmd` / `Upload to host:dir` / etc.
    Label,
    /// Bare host name.
    Host,
    /// `host:wdir`, trailing separator stripped.
    HostPath,
    /// `host` alone when `wdir` is empty, else `host:wdir`.
    Path,
}

impl IdFormat {
    fn job_to_str_fn(self) -> JobToStr {
        match self {
            IdFormat::Label => job_to_str,
            IdFormat::Host => job_host,
            IdFormat::HostPath => job_host_path,
            IdFormat::Path => job_path,
        }
    }
}

/// Flags shared by every job kind: host selection and the aggregator
/// pipeline. Mirrors the fixed option set spec.md §6 allows (no
/// host-filter mini-language, no per-user config file).
#[derive(Debug, clap::Args)]
struct CommonOpts {
    /// Comma-separated list of target hosts.
    #[arg(long, value_delimiter = ',')]
    hosts: Vec<String>,

    /// File with one target host per line, combined with `--hosts`.
    #[arg(long)]
    hosts_file: Option<PathBuf>,

    /// Batch-wide wall-clock budget in seconds. Zero means unbounded.
    #[arg(long, default_value = "0")]
    timeout: u64,

    /// Sleep between supervisor polling sweeps, in milliseconds.
    #[arg(long, default_value = "100")]
    poll_interval_ms: u64,

    /// Cap on simultaneously running jobs. Zero means "as many as hosts".
    #[arg(long, default_value = "0")]
    max_in_flight: usize,

    /// Cap on host identifiers listed per merged report line. Negative
    /// means list every one.
    #[arg(long, default_value = "-1")]
    max_list: i64,

    /// Identifier format used in aggregator reports.
    #[arg(long, value_enum, default_value_t = IdFormat::Label)]
    id_format: IdFormat,

    /// Append completed-clean host identifiers here.
    #[arg(long)]
    ok_file: Option<PathBuf>,

    /// Append failed host identifiers here.
    #[arg(long)]
    fail_file: Option<PathBuf>,

    /// Deduplicate and print clean output grouped by fingerprint.
    #[arg(long)]
    merge_output: bool,

    /// Deduplicate and print failures grouped by (retcode, stderr).
    #[arg(long)]
    merge_errors: bool,

    /// Print clean output as each job completes, undeduplicated.
    #[arg(long)]
    print_output: bool,

    /// Print failures as each job completes, undeduplicated.
    #[arg(long)]
    print_errors: bool,

    /// Render a progress bar on stderr as jobs complete.
    #[arg(long)]
    progress: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a shell command on every host.
    Shell {
        #[command(flatten)]
        common: CommonOpts,

        /// Remote working directory; created with `mkdir -p` before the
        /// command runs. Empty means the login shell's default.
        #[arg(long, default_value = "")]
        wdir: String,

        /// Command and arguments to run remotely (quoted as one shell
        /// command after `--`).
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Upload local files to every host via `rsync`.
    Upload {
        #[command(flatten)]
        common: CommonOpts,

        /// Remote destination directory.
        #[arg(long)]
        target_dir: String,

        /// Local files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Download remote files from every host via `rsync`.
    Download {
        #[command(flatten)]
        common: CommonOpts,

        /// Remote base directory the file list is relative to.
        #[arg(long)]
        remote_base_dir: String,

        /// Local destination directory.
        #[arg(long)]
        target_dir: PathBuf,

        /// Remote file paths, relative to `--remote-base-dir`.
        #[arg(required = true)]
        files: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match run(cli) {
        Ok(all_ok) => std::process::exit(if all_ok { 0 } else { 1 }),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Resolve `--hosts`/`--hosts-file` into a flat, order-preserving list.
fn resolve_hosts(common: &CommonOpts) -> Result<Vec<String>> {
    let mut hosts: Vec<String> = common
        .hosts
        .iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect();

    if let Some(path) = &common.hosts_file {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading hosts file {}", path.display()))?;
        hosts.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(String::from),
        );
    }

    if hosts.is_empty() {
        bail!("no hosts given (use --hosts or --hosts-file)");
    }
    Ok(hosts)
}

fn open_append(path: &PathBuf) -> Result<File> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))
}

fn open_truncate(path: &PathBuf) -> Result<File> {
    fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))
}

/// Build the aggregator pipeline from the CLI flags. `PrintExceptions` is
/// always registered: spec.md's CLI surface names no flag to suppress it,
/// and a silently dropped local exception would defeat the exit-code
/// contract in §6.
fn build_aggregators(common: &CommonOpts, host_count: usize) -> Result<Vec<Box<dyn Aggregator>>> {
    let id_format = common.id_format.job_to_str_fn();
    let mut aggregators: Vec<Box<dyn Aggregator>> = vec![Box::new(
        PrintExceptions::new(Box::new(std::io::stdout())).with_job_to_str(id_format),
    )];

    if common.merge_output {
        aggregators.push(Box::new(
            MergeOutput::new(Box::new(std::io::stdout()), common.max_list).with_job_to_str(id_format),
        ));
    }
    if common.print_output {
        aggregators.push(Box::new(
            PrintOutput::new(Box::new(std::io::stdout())).with_job_to_str(id_format),
        ));
    }
    if common.merge_errors {
        aggregators.push(Box::new(
            MergeErrors::new(Box::new(std::io::stdout()), common.max_list).with_job_to_str(id_format),
        ));
    }
    if common.print_errors {
        aggregators.push(Box::new(
            PrintErrors::new(Box::new(std::io::stdout())).with_job_to_str(id_format),
        ));
    }
    if let Some(path) = &common.ok_file {
        aggregators.push(Box::new(
            DoneJobsToFile::new(Box::new(open_truncate(path)?)).with_job_to_str(id_format),
        ));
    }
    if let Some(path) = &common.fail_file {
        aggregators.push(Box::new(
            FailedJobsAppendFile::new(Box::new(open_append(path)?)).with_job_to_str(id_format),
        ));
    }
    if common.progress {
        aggregators.push(Box::new(ProgressBar::new(host_count as u64)));
    }

    Ok(aggregators)
}

fn supervisor_config(common: &CommonOpts) -> SupervisorConfig {
    SupervisorConfig {
        timeout: std::time::Duration::from_secs(common.timeout),
        poll_interval: std::time::Duration::from_millis(common.poll_interval_ms),
        max_in_flight: common.max_in_flight,
    }
}

fn run(cli: Cli) -> Result<bool> {
    let tools = config::resolve_tools()?;
    let runner = Arc::new(RshRunner { tools });

    match cli.command {
        Command::Shell { common, wdir, command } => {
            let hosts = resolve_hosts(&common)?;
            let cmd = command.join(" ");
            let jobs: Vec<Job> = hosts.iter().map(|h| Job::shell(h, &cmd, &wdir)).collect();
            let aggregators = build_aggregators(&common, jobs.len())?;
            let config = supervisor_config(&common);
            let outcome = drive(jobs, runner, config, aggregators);
            Ok(outcome.all_ok)
        }

        Command::Upload { common, target_dir, files } => {
            config::require_non_empty("--target-dir", &target_dir)?;
            let hosts = resolve_hosts(&common)?;
            for f in &files {
                if !f.exists() {
                    bail!("file not found: {}", f.display());
                }
            }
            let jobs: Vec<Job> = hosts
                .iter()
                .map(|h| Job::upload(h, files.clone(), &target_dir))
                .collect();
            let aggregators = build_aggregators(&common, jobs.len())?;
            let config = supervisor_config(&common);
            let outcome = drive(jobs, runner, config, aggregators);
            Ok(outcome.all_ok)
        }

        Command::Download {
            common,
            remote_base_dir,
            target_dir,
            files,
        } => {
            config::require_non_empty("--remote-base-dir", &remote_base_dir)?;
            let hosts = resolve_hosts(&common)?;
            fs::create_dir_all(&target_dir)
                .with_context(|| format!("creating {}", target_dir.display()))?;
            let jobs: Vec<Job> = hosts
                .iter()
                .map(|h| Job::download(h, files.clone(), target_dir.clone(), &remote_base_dir))
                .collect();
            let aggregators = build_aggregators(&common, jobs.len())?;
            let config = supervisor_config(&common);
            let outcome = drive(jobs, runner, config, aggregators);
            Ok(outcome.all_ok)
        }
    }
}
