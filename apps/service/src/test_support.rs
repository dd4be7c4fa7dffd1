use std::sync::Arc;

use tempfile::TempDir;

use crate::database::{self, DatabaseImpl};

/// Throwaway migrated database. Keep the `TempDir` alive for the test's length.
pub async fn create_test_database() -> (Arc<DatabaseImpl>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let db = database::open(db_path.to_str().unwrap(), 4).await.unwrap();
    (Arc::new(db), temp_dir)
}

/// Minimal HTTP fixture answering each connection by request method.
pub async fn serve<F>(respond: F) -> std::net::SocketAddr
where
    F: Fn(&str) -> &'static str + Send + Sync + 'static,
{
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let respond = respond.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&head);
                let method = head.split_whitespace().next().unwrap_or_default().to_string();
                let status = respond(&method);

                let reply = format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
