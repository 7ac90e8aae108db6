use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::aof::{self, AofWriter};
use crate::config::Config;
use crate::dispatcher::Dispatcher;

async fn handle_connection(
    stream: TcpStream,
    dispatcher: Dispatcher,
    connected: Arc<AtomicUsize>,
) -> io::Result<()> {
    let peer_addr = stream.peer_addr().ok();
    let clients = connected.fetch_add(1, Ordering::Relaxed) + 1;
    log::debug!("new connection from {peer_addr:?} ({clients} connected)");

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    let result = loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(err) => break Err(err),
        }
        if line.trim().is_empty() {
            continue;
        }

        let mut reply = dispatcher.execute(&line).await;
        reply.push('\n');
        if let Err(err) = write_half.write_all(reply.as_bytes()).await {
            break Err(err);
        }
    };

    connected.fetch_sub(1, Ordering::Relaxed);
    log::debug!("connection from {peer_addr:?} closed");
    result
}

/// Accepts connections until `shutdown` resolves. Every connection sends
/// one command per line and gets each reply followed by `\n`.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Dispatcher,
    shutdown: impl Future<Output = ()> + Send,
) -> io::Result<()> {
    let connected = Arc::new(AtomicUsize::new(0));
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, addr) = res?;
                let dispatcher = dispatcher.clone();
                let connected = connected.clone();
                log::debug!("accepted connection from {addr}");
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, dispatcher, connected).await {
                        log::warn!("connection error: {err}");
                    }
                });
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    Ok(())
}

/// Builds the dispatcher for `config`: replays the existing log, if any,
/// and only then starts appending new writes to it. The returned handle is
/// the log writer task.
pub async fn open_dispatcher(config: &Config) -> io::Result<(Dispatcher, Option<JoinHandle<()>>)> {
    let dispatcher = Dispatcher::new();
    let Some(path) = &config.aof_path else {
        log::info!("persistence disabled");
        return Ok((dispatcher, None));
    };

    aof::replay(path, &dispatcher).await?;
    let (writer, task) =
        AofWriter::open(path, config.aof_flush_interval, config.aof_queue_capacity).await?;
    Ok((dispatcher.with_aof(writer), Some(task)))
}

pub async fn run_server(
    config: Config,
    shutdown: impl Future<Output = ()> + Send,
) -> io::Result<()> {
    let (dispatcher, aof_task) = open_dispatcher(&config).await?;
    let listener = TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    log::info!("zedis listening on {local_addr}");

    serve(listener, dispatcher, shutdown).await?;

    // Open connections may still hold writers; give the log one more drain.
    if let Some(task) = aof_task {
        let grace = config.aof_flush_interval * 2;
        if tokio::time::timeout(grace, task).await.is_err() {
            log::warn!("aof writer still busy after {grace:?}; exiting anyway");
        }
    }
    Ok(())
}
