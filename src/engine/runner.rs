//! Process supervisor: validates, spawns and supervises one encoder
//! process per running job, parses its progress channel, and guarantees
//! the handle is released before the job reaches a terminal state.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::domain::{JobId, JobProgress, JobState, PlannerDecision};
use crate::error::ErrorCode;
use crate::planner::assemble_invocation;
use crate::settings::{Preferences, resolve_ffmpeg_path};
use crate::sync_ext::MutexExt;

use super::progress::{
    compute_eta, compute_ratio, parse_duration_from_metadata_line, scan_progress_line,
};
use super::state::{Inner, ProcessHandle};
use super::worker::{finish_cancelled, finish_completed, finish_failed};

/// Window between the graceful stop signal and the forced kill.
const CANCEL_KILL_GRACE: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run the encoder for a job already in the `running` state. Every exit
/// path removes the process handle before the terminal transition and
/// emits exactly one completion event.
pub(crate) fn execute(
    inner: &Arc<Inner>,
    job_id: JobId,
    input: &str,
    decision: &PlannerDecision,
    output_path: &Path,
    prefs: &Preferences,
) -> Result<()> {
    if decision.args.is_empty() {
        finish_failed(
            inner,
            job_id,
            Some(ErrorCode::JobInvalidArgs),
            "Refusing to start: empty command token list".to_string(),
            None,
        );
        return Ok(());
    }

    if input.trim().is_empty() || !Path::new(input).exists() {
        finish_failed(
            inner,
            job_id,
            Some(ErrorCode::JobMissingSource),
            format!("Source is missing or unreadable: {input}"),
            None,
        );
        return Ok(());
    }

    {
        let processes = inner.processes.lock_unpoisoned();
        let max = inner.max_concurrency.load(Ordering::Relaxed);
        if processes.len() >= max {
            drop(processes);
            finish_failed(
                inner,
                job_id,
                Some(ErrorCode::JobConcurrencyLimit),
                "Concurrency limit reached; job must be requeued".to_string(),
                None,
            );
            return Ok(());
        }
        if exclusive_conflict(&processes, decision.exclusive) {
            drop(processes);
            finish_failed(
                inner,
                job_id,
                Some(ErrorCode::JobExclusiveBlocked),
                "Exclusive codec cannot run alongside other jobs".to_string(),
                None,
            );
            return Ok(());
        }
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        finish_failed(
            inner,
            job_id,
            Some(ErrorCode::JobOutputPermission),
            format!("Cannot create output directory {}: {err}", parent.display()),
            None,
        );
        return Ok(());
    }

    let args = assemble_invocation(&decision.args, input, output_path);
    let ffmpeg = resolve_ffmpeg_path(prefs);
    let mut child = match Command::new(&ffmpeg)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            finish_failed(
                inner,
                job_id,
                Some(ErrorCode::RunnerSpawnFailed),
                format!("Failed to spawn {}: {err}", ffmpeg.display()),
                None,
            );
            return Ok(());
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let mut processes = inner.processes.lock_unpoisoned();
        processes.insert(
            job_id,
            ProcessHandle {
                pid: child.id(),
                cancel: cancel.clone(),
                exclusive: decision.exclusive,
            },
        );
    }
    // A cancel that raced the spawn must terminate the child immediately;
    // the job never reports progress in that case.
    if cancel_requested(inner, job_id) {
        cancel.store(true, Ordering::SeqCst);
    }
    if cancel.load(Ordering::SeqCst) {
        let _ = child.kill();
        let _ = child.wait();
        release_handle(inner, job_id);
        let _ = std::fs::remove_file(output_path);
        finish_cancelled(inner, job_id, None);
        return Ok(());
    }

    let mut total_duration = {
        let state = inner.state.lock_unpoisoned();
        state
            .repository
            .get(job_id)
            .and_then(|record| record.summary.as_ref())
            .and_then(|summary| summary.duration_sec)
    };

    let mut pump = StderrPump::spawn(&mut child);
    let mut pending = JobProgress::default();
    let mut graceful_sent = false;
    let mut kill_deadline: Option<Instant> = None;
    let mut forced_kill = false;

    let status = loop {
        let cancelling = cancel.load(Ordering::SeqCst) || cancel_requested(inner, job_id);
        if cancelling && !graceful_sent {
            graceful_terminate(&mut child);
            graceful_sent = true;
            kill_deadline = Some(Instant::now() + CANCEL_KILL_GRACE);
        }
        if let Some(deadline) = kill_deadline
            && !forced_kill
            && Instant::now() >= deadline
        {
            let _ = child.kill();
            forced_kill = true;
        }

        if let Some(line) = pump.recv_timeout(POLL_INTERVAL) {
            handle_stderr_line(
                inner,
                job_id,
                &line,
                &mut pending,
                &mut total_duration,
            );
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                pump.drain_remaining(|line| {
                    handle_stderr_line(inner, job_id, &line, &mut pending, &mut total_duration);
                });
                break status;
            }
            Ok(None) => {}
            Err(err) => {
                // The child is unreachable; treat it as interrupted.
                let _ = child.kill();
                let _ = child.wait();
                pump.join();
                release_handle(inner, job_id);
                let _ = std::fs::remove_file(output_path);
                finish_failed(
                    inner,
                    job_id,
                    Some(ErrorCode::RunnerInterrupted),
                    format!("Lost track of the encoder process: {err}"),
                    None,
                );
                return Ok(());
            }
        }
    };

    pump.join();
    // The handle leaves the table before any terminal transition.
    release_handle(inner, job_id);

    let was_cancelled = graceful_sent || cancel.load(Ordering::SeqCst);
    if was_cancelled {
        let _ = std::fs::remove_file(output_path);
        finish_cancelled(inner, job_id, status.code());
        return Ok(());
    }

    if status.success() {
        finish_completed(inner, job_id, output_path);
    } else {
        let _ = std::fs::remove_file(output_path);
        let (code, message) = match status.code() {
            Some(exit_code) => (
                None,
                format!("Encoder exited with non-zero status (exit code {exit_code})"),
            ),
            None => (
                Some(ErrorCode::RunnerInterrupted),
                "Encoder terminated by signal".to_string(),
            ),
        };
        finish_failed(inner, job_id, code, message, status.code());
    }

    Ok(())
}

fn exclusive_conflict(processes: &HashMap<JobId, ProcessHandle>, exclusive: bool) -> bool {
    if processes.is_empty() {
        return false;
    }
    exclusive || processes.values().any(|handle| handle.exclusive)
}

fn cancel_requested(inner: &Arc<Inner>, job_id: JobId) -> bool {
    let state = inner.state.lock_unpoisoned();
    state.cancel_requests.contains(&job_id)
}

fn release_handle(inner: &Arc<Inner>, job_id: JobId) {
    let mut processes = inner.processes.lock_unpoisoned();
    processes.remove(&job_id);
}

/// Ask the encoder to stop. On unix this is SIGTERM so the muxer can
/// flush; elsewhere the process is killed outright and the grace window
/// only delays the wait.
fn graceful_terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        let pid = child.id() as libc::pid_t;
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
}

/// Fold one stderr line into the job: progress-channel tokens accumulate
/// until a `progress=` marker publishes a snapshot; anything else goes to
/// the bounded log and the stderr topic.
fn handle_stderr_line(
    inner: &Arc<Inner>,
    job_id: JobId,
    line: &str,
    pending: &mut JobProgress,
    total_duration: &mut Option<f64>,
) {
    let parsed = scan_progress_line(line);
    if parsed.is_empty() {
        // Header lines can carry the duration the probe could not supply.
        if total_duration.is_none()
            && let Some(duration) = parse_duration_from_metadata_line(line)
        {
            *total_duration = Some(duration);
            let mut state = inner.state.lock_unpoisoned();
            state.repository.update(job_id, |record| {
                if let Some(summary) = record.summary.as_mut() {
                    summary.duration_sec = Some(duration);
                }
            });
        }
        {
            let mut state = inner.state.lock_unpoisoned();
            state.repository.update(job_id, |record| {
                record.push_log(line.to_string());
            });
        }
        inner.bus.publish_stderr(job_id, line.to_string());
        return;
    }

    if let Some(seconds) = parsed.processed_seconds
        && seconds.is_finite()
        && seconds >= 0.0
    {
        pending.processed_seconds = seconds;
    }
    if parsed.fps.is_some() {
        pending.fps = parsed.fps;
    }
    if parsed.speed.is_some() {
        pending.speed = parsed.speed;
    }

    let Some(end) = parsed.marker else {
        return;
    };

    pending.ratio = compute_ratio(*total_duration, pending.processed_seconds);
    pending.eta_seconds = if end {
        Some(0.0)
    } else {
        compute_eta(*total_duration, pending.processed_seconds, pending.speed)
    };

    let snapshot = pending.clone();
    {
        let mut state = inner.state.lock_unpoisoned();
        state.repository.update(job_id, |record| {
            if let JobState::Running { progress, .. } = &mut record.state {
                *progress = snapshot.clone();
            }
        });
    }
    inner.bus.publish_progress(job_id, snapshot, end);
}

/// Dedicated reader thread for the child's stderr; the supervising loop
/// polls it so cancellation latency stays bounded even when the encoder
/// is silent.
struct StderrPump {
    rx: Option<std::sync::mpsc::Receiver<String>>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl StderrPump {
    fn spawn(child: &mut Child) -> Self {
        let Some(stderr) = child.stderr.take() else {
            return Self {
                rx: None,
                join: None,
            };
        };

        let (tx, rx) = std::sync::mpsc::channel::<String>();
        let join = std::thread::spawn(move || {
            use std::io::BufRead as _;
            let reader = std::io::BufReader::new(stderr);
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            rx: Some(rx),
            join: Some(join),
        }
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Option<String> {
        let Some(rx) = self.rx.as_ref() else {
            std::thread::sleep(timeout);
            return None;
        };
        match rx.recv_timeout(timeout) {
            Ok(line) => Some(line),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => None,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                self.rx = None;
                None
            }
        }
    }

    /// After the child exits, flush everything the reader thread still
    /// holds. The pipe is at EOF, so the channel drains quickly.
    fn drain_remaining(&mut self, mut on_line: impl FnMut(String)) {
        let Some(rx) = self.rx.as_ref() else {
            return;
        };
        while let Ok(line) = rx.recv_timeout(Duration::from_millis(200)) {
            on_line(line);
        }
    }

    fn join(&mut self) {
        self.rx = None;
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
