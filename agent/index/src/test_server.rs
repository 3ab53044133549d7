//! A loopback HTTP/1.1 server with canned replies.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

#[derive(Copy, Clone, Debug)]
pub(crate) enum Reply {
    Status(u16, &'static str),

    /// Reads the request and never answers.
    Hang,
}

pub(crate) struct TestServer {
    pub(crate) url: String,
    requests: Arc<AtomicUsize>,
}

// === impl TestServer ===

impl TestServer {
    /// Serves one request per connection. The n-th request gets the n-th
    /// reply; the last reply repeats once the list is exhausted.
    pub(crate) async fn spawn(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let count = requests.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut stream, _)) = listener.accept().await {
                let n = count.fetch_add(1, Ordering::SeqCst);
                read_request(&mut stream).await;
                match replies.get(n).or(replies.last()).copied() {
                    Some(Reply::Status(status, body)) => {
                        let rsp = format!(
                            "HTTP/1.1 {status} Test\r\n\
                             content-type: application/json\r\n\
                             content-length: {}\r\n\
                             connection: close\r\n\r\n{body}",
                            body.len()
                        );
                        let _ = stream.write_all(rsp.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    }
                    Some(Reply::Hang) | None => held.push(stream),
                }
            }
        });
        Self {
            url: format!("http://{addr}"),
            requests,
        }
    }

    pub(crate) fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

async fn read_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|len| len.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                return;
            }
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}
