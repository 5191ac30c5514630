use std::{
  collections::VecDeque,
  future::Future,
  io,
  pin::Pin,
  process::ExitStatus,
  task::{ready, Context, Poll},
  time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::{
  io::{AsyncBufReadExt, BufReader},
  process::{Child, ChildStderr, ChildStdout, Command},
  sync::oneshot,
};
use tokio_util::{
  io::poll_read_buf,
  sync::{CancellationToken, DropGuard},
};
use tracing::{debug, info, warn};

use crate::{credentials::Credentials, Error, Result};

pub const CHUNK_SIZE: usize = 64 * 1024;

// how long a killed extractor may take to disappear before we complain
const KILL_GRACE: Duration = Duration::from_secs(5);

const STDERR_TAIL_LINES: usize = 20;

/// How the extractor process ended.
#[derive(Debug)]
pub struct ExitReport {
  pub status: Option<ExitStatus>,
  pub killed: bool,
  pub stderr: Vec<String>,
}

impl ExitReport {
  pub fn success(&self) -> bool {
    !self.killed && self.status.is_some_and(|s| s.success())
  }

  /// Best human readable reason for a failed run.
  pub fn describe(&self) -> String {
    if let Some(line) = self.stderr.iter().rev().find(|l| l.contains("ERROR:"))
    {
      return line.trim().to_string();
    }

    match (&self.status, self.stderr.last()) {
      (Some(status), Some(line)) => format!("extractor {status}: {line}"),
      (Some(status), None) => format!("extractor {status}"),
      (None, _) => "extractor exit status unavailable".to_string(),
    }
  }
}

/// Stdout of a running extractor together with the supervisor that owns the
/// process.
pub struct ByteSource {
  stdout: ChildStdout,
  exit: oneshot::Receiver<ExitReport>,
  cancel: CancellationToken,
}

impl ByteSource {
  /// Spawn `cmd` with piped output. The process is handed to a supervisor
  /// task that reaps it and keeps `credentials` alive until it has exited.
  pub fn spawn(mut cmd: Command, credentials: Credentials) -> Result<Self> {
    let mut child = cmd
      .stdin(std::process::Stdio::null())
      .stdout(std::process::Stdio::piped())
      .stderr(std::process::Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(Error::Spawn)?;

    let stdout = child
      .stdout
      .take()
      .ok_or_else(|| Error::Extraction("stdout not captured".into()))?;
    let stderr = child.stderr.take();

    let cancel = CancellationToken::new();
    let (exit_tx, exit) = oneshot::channel();
    tokio::spawn(supervise(child, stderr, cancel.clone(), exit_tx, credentials));

    Ok(Self {
      stdout,
      exit,
      cancel,
    })
  }
}

async fn supervise(
  mut child: Child,
  stderr: Option<ChildStderr>,
  cancel: CancellationToken,
  exit_tx: oneshot::Sender<ExitReport>,
  credentials: Credentials,
) {
  let pid = child.id();

  let wait = async {
    tokio::select! {
      status = child.wait() => (status, false),
      _ = cancel.cancelled() => {
        debug!(?pid, "relay cancelled, killing extractor");
        if let Err(e) = child.start_kill() {
          warn!(?pid, "failed to kill extractor: {e}");
        }
        match tokio::time::timeout(KILL_GRACE, child.wait()).await {
          Ok(status) => (status, true),
          Err(_) => {
            warn!(?pid, "extractor still running {KILL_GRACE:?} after kill");
            (child.wait().await, true)
          }
        }
      }
    }
  };

  let ((status, killed), stderr) = tokio::join!(wait, collect_stderr(stderr));
  drop(credentials);

  let status = match status {
    Ok(status) => Some(status),
    Err(e) => {
      warn!(?pid, "failed to wait for extractor: {e}");
      None
    }
  };
  debug!(?pid, ?status, killed, "extractor reaped");

  // the relay may already be gone
  exit_tx.send(ExitReport { status, killed, stderr }).ok();
}

async fn collect_stderr(stderr: Option<ChildStderr>) -> Vec<String> {
  let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
  let Some(stderr) = stderr else {
    return vec![];
  };

  // raw lines: yt-dlp may print titles in a non-utf8 locale encoding
  let mut reader = BufReader::new(stderr);
  let mut raw = Vec::new();
  loop {
    raw.clear();
    match reader.read_until(b'\n', &mut raw).await {
      Ok(0) => break,
      Ok(_) => {
        let line = String::from_utf8_lossy(&raw).trim_end().to_string();
        if line.contains("ERROR:") {
          warn!("yt-dlp: {line}");
        } else {
          debug!("yt-dlp: {line}");
        }
        if tail.len() == STDERR_TAIL_LINES {
          tail.pop_front();
        }
        tail.push_back(line);
      }
      Err(e) => {
        // keep the pipe open until the process closes it
        debug!("failed to read extractor stderr: {e}");
        tokio::io::copy(&mut reader, &mut tokio::io::sink()).await.ok();
        break;
      }
    }
  }

  tail.into()
}

enum State {
  Reading(ChildStdout),
  Exiting,
  Done,
}

/// Relays extractor stdout as a stream of chunks of at most [`CHUNK_SIZE`]
/// bytes. After end of file it waits for the process to be reaped before
/// finishing. Dropping the relay kills the process.
pub struct Relay {
  state: State,
  buf: BytesMut,
  exit: oneshot::Receiver<ExitReport>,
  report: Option<ExitReport>,
  bytes_sent: u64,
  cancel: CancellationToken,
  _cancel_on_drop: DropGuard,
}

impl Relay {
  pub fn new(source: ByteSource) -> Self {
    let ByteSource {
      stdout,
      exit,
      cancel,
    } = source;

    Self {
      state: State::Reading(stdout),
      buf: BytesMut::new(),
      exit,
      report: None,
      bytes_sent: 0,
      _cancel_on_drop: cancel.clone().drop_guard(),
      cancel,
    }
  }

  /// Wait for the first chunk. An extractor that fails before producing any
  /// output is reported as an extraction error.
  pub async fn first_chunk(&mut self) -> Result<Option<Bytes>> {
    match self.next().await {
      Some(Ok(chunk)) => Ok(Some(chunk)),
      None => Ok(None),
      Some(Err(e)) => match &self.report {
        Some(report) if !report.success() => {
          Err(Error::Extraction(report.describe()))
        }
        _ => Err(Error::IO(e)),
      },
    }
  }

  #[cfg(test)]
  pub fn report(&self) -> Option<&ExitReport> {
    self.report.as_ref()
  }
}

impl Stream for Relay {
  type Item = io::Result<Bytes>;

  fn poll_next(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
  ) -> Poll<Option<Self::Item>> {
    let this = &mut *self;

    loop {
      match &mut this.state {
        State::Reading(stdout) => {
          this.buf.reserve(CHUNK_SIZE);
          let mut limited = (&mut this.buf).limit(CHUNK_SIZE);
          match ready!(poll_read_buf(Pin::new(stdout), cx, &mut limited)) {
            Ok(0) => {
              this.state = State::Exiting;
            }
            Ok(_) => {
              let chunk = this.buf.split().freeze();
              this.bytes_sent += chunk.len() as u64;
              return Poll::Ready(Some(Ok(chunk)));
            }
            Err(e) => {
              warn!("extractor pipe read failed: {e}");
              this.cancel.cancel();
              this.state = State::Done;
              return Poll::Ready(Some(Err(e)));
            }
          }
        }
        State::Exiting => {
          let report = match ready!(Pin::new(&mut this.exit).poll(cx)) {
            Ok(report) => report,
            Err(_) => ExitReport {
              status: None,
              killed: false,
              stderr: vec![],
            },
          };
          this.state = State::Done;

          let failed = !report.success();
          let error = failed.then(|| report.describe());
          this.report = Some(report);

          if let Some(error) = error {
            warn!(bytes = this.bytes_sent, "extractor failed: {error}");
            return Poll::Ready(Some(Err(io::Error::new(
              io::ErrorKind::Other,
              error,
            ))));
          }

          info!(bytes = this.bytes_sent, "relay finished");
          return Poll::Ready(None);
        }
        State::Done => return Poll::Ready(None),
      }
    }
  }
}
