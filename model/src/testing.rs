//! Helpers for tests which talk to a local HTTP server.

use anyhow::Error;
use async_std::task::{sleep, spawn};
use portpicker::pick_unused_port;
use std::time::Duration;

const MAX_CONNECT_RETRIES: usize = 60;

/// Serve `app` on an unused local port and return its base URL once it accepts connections.
pub async fn serve(app: tide::Server<()>) -> Result<String, Error> {
    let port = pick_unused_port().ok_or_else(|| Error::msg("no free port"))?;
    spawn(async move {
        if let Err(err) = app.listen(format!("127.0.0.1:{port}")).await {
            tracing::error!("test server exited: {err}");
        }
    });

    for _ in 0..MAX_CONNECT_RETRIES {
        match async_std::net::TcpStream::connect(("127.0.0.1", port)).await {
            Ok(_) => return Ok(format!("http://127.0.0.1:{port}")),
            Err(err) => {
                tracing::warn!("waiting for test server on port {port}: {err}");
                sleep(Duration::from_millis(100)).await;
            }
        }
    }
    Err(Error::msg("timed out waiting for test server"))
}
