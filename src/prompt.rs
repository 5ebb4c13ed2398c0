//! Operator interaction between the start and stop phases

use std::future::Future;
use std::io::{self, BufRead};
use std::thread;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub const STOP_PROMPT: &str = "Press Enter to stop the video streaming and packet capture...";

/// Why the run moved on to the stop phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Enter,
    EndOfInput,
    Interrupted,
}

/// Read one line on a thread the runtime does not own.
///
/// A pending blocking read inside the runtime's pool would keep the runtime
/// from shutting down after an interrupt; a detached thread does not.
pub fn read_line_detached<Rd>(mut reader: Rd) -> io::Result<oneshot::Receiver<io::Result<usize>>>
where
    Rd: BufRead + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    thread::Builder::new()
        .name("stop-prompt".into())
        .spawn(move || {
            let mut line = String::new();
            // the receiver is gone once the run stopped some other way
            let _ = tx.send(reader.read_line(&mut line));
        })?;
    Ok(rx)
}

/// Print the prompt and wait for one line; closed input also counts
pub async fn wait_for_enter<Rd, W>(reader: Rd, writer: &mut W) -> io::Result<StopReason>
where
    Rd: BufRead + Send + 'static,
    W: AsyncWrite + Unpin,
{
    writer.write_all(STOP_PROMPT.as_bytes()).await?;
    writer.flush().await?;

    let line = read_line_detached(reader)?;
    let read = line
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "stop prompt reader exited"))??;
    if read == 0 {
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(StopReason::EndOfInput)
    } else {
        Ok(StopReason::Enter)
    }
}

/// Race the prompt against `interrupt`; whichever finishes first stops the run
pub async fn wait_for_stop<Rd, W, I>(reader: Rd, writer: &mut W, interrupt: I) -> StopReason
where
    Rd: BufRead + Send + 'static,
    W: AsyncWrite + Unpin,
    I: Future<Output = ()>,
{
    tokio::select! {
        res = wait_for_enter(reader, writer) => match res {
            Ok(reason) => reason,
            Err(e) => {
                warn!("Reading stdin failed ({}), stopping", e);
                StopReason::EndOfInput
            }
        },
        _ = interrupt => {
            info!("Interrupted by user");
            StopReason::Interrupted
        }
    }
}

/// Wait on stdin, treating Ctrl-C like Enter so teardown still runs
pub async fn stop_requested() -> StopReason {
    let mut stdout = tokio::io::stdout();
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            debug!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    wait_for_stop(io::BufReader::new(io::stdin()), &mut stdout, interrupt).await
}
