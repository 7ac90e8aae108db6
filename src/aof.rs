//! Append-only command log.
//!
//! Accepted write commands go through a bounded channel to one background
//! task. The task wakes on a fixed interval, drains whatever is queued and
//! appends each command as its own line, syncing the file after every
//! record. A full queue blocks producers instead of dropping commands.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatcher::Dispatcher;

#[derive(Debug, Clone)]
pub struct AofWriter {
    tx: mpsc::Sender<String>,
}

impl AofWriter {
    /// Opens (or creates) the log for appending and starts the writer task.
    /// The task exits after every `AofWriter` clone is dropped and the
    /// queue has been drained.
    pub async fn open(
        path: &Path,
        flush_interval: Duration,
        capacity: usize,
    ) -> io::Result<(AofWriter, JoinHandle<()>)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_writer(file, rx, flush_interval));
        log::info!("appending accepted writes to {}", path.display());
        Ok((AofWriter { tx }, task))
    }

    /// Queues a command for the log, waiting while the queue is full.
    pub async fn append(&self, command: &str) {
        if self.tx.send(command.to_string()).await.is_err() {
            log::error!("aof writer is gone; dropping {command:?}");
        }
    }
}

async fn run_writer(mut file: File, mut rx: mpsc::Receiver<String>, flush_interval: Duration) {
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        loop {
            match rx.try_recv() {
                Ok(command) => {
                    // The in-memory write already happened; a failed append is
                    // reported and the process keeps serving.
                    if let Err(err) = append_record(&mut file, &command).await {
                        log::error!("aof append failed for {command:?}: {err}");
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::debug!("aof writer drained and closed");
                    return;
                }
            }
        }
    }
}

async fn append_record(file: &mut File, command: &str) -> io::Result<()> {
    let mut record = String::with_capacity(command.len() + 1);
    record.push_str(command);
    record.push('\n');
    file.write_all(record.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Re-executes every line of the log at `path`, in order, against
/// `dispatcher`. A missing file means there is nothing to restore.
/// Returns the number of commands replayed.
pub async fn replay(path: &Path, dispatcher: &Dispatcher) -> io::Result<usize> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };

    let mut lines = BufReader::new(file).lines();
    let mut replayed = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        dispatcher.apply(&line);
        replayed += 1;
    }

    log::info!("replayed {replayed} commands from {}", path.display());
    Ok(replayed)
}
