// ============================
// crates/backend-lib/src/sandbox.rs
// ============================
//! Per-connection code execution.
//!
//! Each connection owns at most one execution session: source written to a
//! per-connection temp file, an optional compile step, then a runtime
//! subprocess with piped stdio. Output chunks are streamed to the whole
//! room through a [`RoomSink`]; a new run or a disconnect force-kills the
//! previous subprocess. There is no execution timeout.
//!
//! The "waiting for input" heuristic inspects trailing punctuation of each
//! stdout chunk. It is an approximation, not a protocol guarantee: a
//! program printing a colon-terminated line is misread as prompting, and a
//! prompt without trailing `:`/`?` goes undetected. It is kept behind
//! [`PromptPredicate`] so deployments can swap it.

use crate::broadcast::RoomSink;
use crate::language::{Language, RunPlan};
use crate::transcript::TranscriptSink;
use dashmap::DashMap;
use metrics::counter;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tokio::fs as tokio_fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// Classifier deciding whether an output chunk looks like an interactive
/// prompt
pub type PromptPredicate = fn(&str) -> bool;

static PROMPT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[:?]\s*$").unwrap());

/// Default prompt classifier: chunk ends in `:` or `?` (plus trailing
/// whitespace)
pub fn trailing_punctuation_prompt(chunk: &str) -> bool {
    PROMPT_REGEX.is_match(chunk)
}

/// Bookkeeping for one live subprocess. The child itself is owned by its
/// waiter task; this handle carries what the dispatcher needs: the stdin
/// pipe, the waiting-for-input flag, and the kill signal.
struct SessionHandle {
    run_id: u64,
    stdin: Arc<Mutex<ChildStdin>>,
    waiting: Arc<AtomicBool>,
    kill_tx: Option<oneshot::Sender<()>>,
}

/// Connection-keyed table of execution sessions
pub struct SandboxManager {
    sessions: Arc<DashMap<Uuid, SessionHandle>>,
    temp_dir: PathBuf,
    transcript: Arc<dyn TranscriptSink>,
    prompt: PromptPredicate,
    next_run_id: AtomicU64,
}

impl SandboxManager {
    pub fn new<P: AsRef<Path>>(
        temp_dir: P,
        transcript: Arc<dyn TranscriptSink>,
    ) -> anyhow::Result<Self> {
        let temp_dir = temp_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&temp_dir)?;
        Ok(Self {
            sessions: Arc::new(DashMap::new()),
            temp_dir,
            transcript,
            prompt: trailing_punctuation_prompt,
            next_run_id: AtomicU64::new(1),
        })
    }

    /// Swap in a different prompt classifier
    pub fn with_prompt_predicate(mut self, prompt: PromptPredicate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn is_live(&self, conn_id: &Uuid) -> bool {
        self.sessions.contains_key(conn_id)
    }

    /// Force-kill a connection's live subprocess, if any. Replacing a
    /// session is always this remove-then-signal swap, never a silent
    /// overwrite of a still-running handle. A killed run emits no terminal
    /// event; its artifacts are still removed by its waiter task.
    pub fn kill(&self, conn_id: &Uuid) {
        if let Some((_, mut handle)) = self.sessions.remove(conn_id) {
            info!(conn_id = %conn_id, "terminating execution session");
            if let Some(tx) = handle.kill_tx.take() {
                let _ = tx.send(());
            }
        }
    }

    /// Execute `code` for one connection, streaming output to `sink`.
    ///
    /// Any previous session of this connection is killed first — before
    /// the language check, so even a bad request discards the old run.
    pub async fn run(&self, conn_id: Uuid, code: &str, language: &str, sink: RoomSink) {
        self.kill(&conn_id);

        let Ok(language) = language.parse::<Language>() else {
            sink.emit_output("Unsupported language.".to_string(), false);
            return;
        };

        counter!(crate::metrics::RUN_STARTED).increment(1);
        let plan = RunPlan::build(language, conn_id, &self.temp_dir, code);
        self.execute(conn_id, code, plan, sink).await;
    }

    /// Write the source file, run the compile step if the plan has one,
    /// then hand over to [`Self::launch`].
    pub(crate) async fn execute(&self, conn_id: Uuid, code: &str, plan: RunPlan, sink: RoomSink) {
        if let Err(e) = tokio_fs::write(&plan.source, code).await {
            warn!(conn_id = %conn_id, error = %e, "failed to write source file");
            sink.emit_output(format!("Failed to write source file: {e}"), false);
            cleanup_artifacts(&plan.artifacts).await;
            return;
        }

        if let Some((compiler, args)) = &plan.compile {
            let output = Command::new(compiler)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await;

            match output {
                Ok(output) if !output.status.success() => {
                    counter!(crate::metrics::COMPILE_FAILED).increment(1);
                    let diagnostics = String::from_utf8_lossy(&output.stderr);
                    sink.emit_output(
                        format!(
                            "{} compilation failed:\n{diagnostics}",
                            plan.language.to_string().to_uppercase()
                        ),
                        false,
                    );
                    cleanup_artifacts(&plan.artifacts).await;
                    return;
                },
                Ok(_) => {},
                Err(e) => {
                    warn!(conn_id = %conn_id, %compiler, error = %e, "failed to spawn compiler");
                    sink.emit_output(format!("Failed to start process: {e}"), false);
                    cleanup_artifacts(&plan.artifacts).await;
                    return;
                },
            }
        }

        self.launch(conn_id, plan, sink).await;
    }

    /// Spawn the runtime process for an already-prepared plan and wire up
    /// the streaming tasks.
    pub(crate) async fn launch(&self, conn_id: Uuid, plan: RunPlan, sink: RoomSink) {
        let (program, args) = &plan.run;
        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(conn_id = %conn_id, %program, error = %e, "failed to spawn runtime");
                sink.emit_output(format!("Failed to start process: {e}"), false);
                cleanup_artifacts(&plan.artifacts).await;
                return;
            },
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            sink.emit_output("Failed to start process: stdio unavailable".to_string(), false);
            cleanup_artifacts(&plan.artifacts).await;
            return;
        };

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let waiting = Arc::new(AtomicBool::new(false));
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

        self.sessions.insert(
            conn_id,
            SessionHandle {
                run_id,
                stdin: Arc::new(Mutex::new(stdin)),
                waiting: waiting.clone(),
                kill_tx: Some(kill_tx),
            },
        );

        // stdout: classify each chunk, log it, broadcast it
        let out_task = tokio::spawn({
            let sink = sink.clone();
            let waiting = waiting.clone();
            let transcript = self.transcript.clone();
            let prompt = self.prompt;
            async move {
                let mut stdout = stdout;
                let mut buf = [0u8; 8192];
                loop {
                    match stdout.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                            let is_prompt = prompt(&chunk);
                            waiting.store(is_prompt, Ordering::SeqCst);
                            if is_prompt {
                                transcript.append_prompt(&chunk).await;
                            } else {
                                transcript.append_output(&chunk).await;
                            }
                            sink.emit_output(chunk, is_prompt);
                        },
                    }
                }
            }
        });

        // stderr: relay marked as errors, never treated as a prompt
        let err_task = tokio::spawn({
            let sink = sink.clone();
            async move {
                let mut stderr = stderr;
                let mut buf = [0u8; 8192];
                loop {
                    match stderr.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let chunk = String::from_utf8_lossy(&buf[..n]);
                            sink.emit_output(format!("Error: {chunk}"), false);
                        },
                    }
                }
            }
        });

        // The waiter owns the child: it races process exit against the
        // kill signal, emits the terminal event only for a natural exit,
        // and always removes this run's artifacts.
        let sessions = self.sessions.clone();
        let artifacts = plan.artifacts.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    // Drain both pipes so the terminal event comes last,
                    // and clean up first so artifacts are gone by the time
                    // clients see the exit report.
                    let _ = out_task.await;
                    let _ = err_task.await;
                    waiting.store(false, Ordering::SeqCst);
                    sessions.remove_if(&conn_id, |_, s| s.run_id == run_id);
                    cleanup_artifacts(&artifacts).await;
                    let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
                    counter!(crate::metrics::RUN_COMPLETED).increment(1);
                    sink.emit_output(
                        format!("\nExecution finished with code {code}."),
                        false,
                    );
                },
                _ = &mut kill_rx => {
                    out_task.abort();
                    err_task.abort();
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    cleanup_artifacts(&artifacts).await;
                },
            }
        });
    }

    /// Forward a line to the live subprocess's stdin — only when a session
    /// exists and its prompt flag is set. Otherwise the request is logged
    /// and ignored.
    pub async fn send_input(&self, conn_id: Uuid, input: &str) {
        let stdin = match self.sessions.get(&conn_id) {
            Some(handle) if handle.waiting.load(Ordering::SeqCst) => handle.stdin.clone(),
            _ => {
                warn!(conn_id = %conn_id, "code input ignored: no session waiting for input");
                return;
            },
        };

        self.transcript.append_input(input.trim()).await;

        let mut stdin = stdin.lock().await;
        if let Err(e) = stdin.write_all(format!("{input}\n").as_bytes()).await {
            warn!(conn_id = %conn_id, error = %e, "failed to forward input to subprocess");
        }
    }
}

/// Best-effort artifact removal; failures are logged, never escalated.
async fn cleanup_artifacts(paths: &[PathBuf]) {
    for path in paths {
        match tokio_fs::remove_file(path).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove run artifact");
            },
        }
    }
}
