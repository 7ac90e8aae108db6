use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use zedis::server::serve;
use zedis::Dispatcher;

async fn spawn_server() -> (
    SocketAddr,
    oneshot::Sender<()>,
    tokio::task::JoinHandle<tokio::io::Result<()>>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind server");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        serve(listener, Dispatcher::new(), async move {
            let _ = rx.await;
        })
        .await
    });
    (addr, tx, handle)
}

struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        TestClient {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line
    }

    async fn call(&mut self, line: &str) -> String {
        self.send(line).await;
        self.read_line().await
    }
}

#[tokio::test]
async fn set_get_round_trip() {
    let (addr, shutdown, handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.call("SET k1 v1").await, "OK\n");
    assert_eq!(client.call("GET k1").await, "v1\n");
    assert_eq!(client.call("GET missing").await, "(nil)\n");

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn continues_after_invalid_command() {
    let (addr, shutdown, handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.call("COMMAND DOCS").await, "COMMAND NOT VALID\n");
    assert_eq!(client.call("EXPIRE k1 2.3").await, "COMMAND NOT VALID\n");
    assert_eq!(client.call("SET k1 v1").await, "OK\n");

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn blank_lines_get_no_reply() {
    let (addr, shutdown, handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    client.send("").await;
    client.send("   ").await;
    assert_eq!(client.call("GET nothing").await, "(nil)\n");

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn clients_share_one_store() {
    let (addr, shutdown, handle) = spawn_server().await;
    let mut first = TestClient::connect(addr).await;
    let mut second = TestClient::connect(addr).await;

    assert_eq!(first.call("SET shared hello").await, "OK\n");
    assert_eq!(second.call("GET shared").await, "hello\n");

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn concurrent_clients_do_not_clobber_each_other() {
    let (addr, shutdown, handle) = spawn_server().await;

    let workers: Vec<_> = (0..8)
        .map(|t| {
            tokio::spawn(async move {
                let mut client = TestClient::connect(addr).await;
                for i in 0..50 {
                    assert_eq!(client.call(&format!("SET c{t}-k{i} v{t}-{i}")).await, "OK\n");
                }
                for i in 0..50 {
                    assert_eq!(client.call(&format!("GET c{t}-k{i}")).await, format!("v{t}-{i}\n"));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.await.unwrap();
    }

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn expire_hides_key_after_deadline() {
    let (addr, shutdown, handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.call("SET k1 v1").await, "OK\n");
    assert_eq!(client.call("EXPIRE k1 2").await, "1\n");
    assert_eq!(client.call("GET k1").await, "v1\n");

    tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
    assert_eq!(client.call("GET k1").await, "v1\n");

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    assert_eq!(client.call("GET k1").await, "(nil)\n");
    assert_eq!(client.call("EXPIRE k1 2").await, "0\n");
    assert_eq!(client.call("EXPIRE never-set 2").await, "0\n");

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
