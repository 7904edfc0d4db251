//! stdio Transport for MCP
//!
//! JSON-RPC over newline-delimited messages on a byte stream pair. The
//! transport owns its streams explicitly — `run` takes any `AsyncRead` /
//! `AsyncWrite`, so tests drive it over in-memory pipes and the binary
//! attaches the process's stdin/stdout.
//!
//! Requests dispatch on their own tasks, so a slow tool call never blocks a
//! fast one; responses correlate by id, not by order. Writes go through a
//! single mutex-guarded writer so concurrent completions cannot interleave
//! mid-message.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::codec::{self, LineBuffer};
use crate::server::McpServer;

const READ_CHUNK: usize = 8 * 1024;

/// stdio transport. One instance per stream pair; after `run` returns the
/// streams are released and a fresh instance is expected for any restart.
pub struct StdioTransport {
    server: Arc<McpServer>,
}

impl StdioTransport {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Run over the process's standard streams.
    pub async fn run_stdio(self) -> io::Result<()> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Run over an arbitrary stream pair until EOF or a fatal read error.
    ///
    /// Stream-level failures are logged and end the loop; they never
    /// terminate the hosting process.
    pub async fn run<R, W>(self, mut reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));

        // Announce capabilities unsolicited, so a client that attaches
        // without sending initialize still learns the tool list.
        let ready = codec::encode_notification(&self.ready_notification());
        write_line(&writer, &ready).await?;

        let mut buffer = LineBuffer::new();
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) => {
                    debug!("EOF on input stream");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to read input stream: {}", e);
                    break;
                }
            };
            buffer.extend(&chunk[..n]);

            while let Some(line) = buffer.next_line() {
                self.dispatch_line(line, &writer).await;
            }
        }

        info!("stdio transport detached");
        Ok(())
    }

    /// Decode one line and dispatch it. Parse failures answer inline; valid
    /// requests run on their own task so in-flight calls overlap.
    async fn dispatch_line<W>(&self, line: String, writer: &Arc<Mutex<W>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        debug!("Received: {} bytes", line.len());

        let request = match codec::decode_request(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to parse request: {:?}", e);
                let encoded = codec::encode_response(&e.into_response());
                if let Err(e) = write_line(writer, &encoded).await {
                    error!("Failed to write error response: {}", e);
                }
                return;
            }
        };

        let server = Arc::clone(&self.server);
        let writer = Arc::clone(writer);
        tokio::spawn(async move {
            if let Some(response) = server.handle_request(request).await {
                let encoded = codec::encode_response(&response);
                debug!("Sending: {} bytes", encoded.len());
                if let Err(e) = write_line(&writer, &encoded).await {
                    // Broken pipe: the client went away. Drop the response
                    // and leave restart decisions to the caller.
                    error!("Failed to write response: {}", e);
                }
            }
        });
    }

    fn ready_notification(&self) -> crate::protocol::types::JsonRpcRequest {
        crate::protocol::types::JsonRpcRequest::notification(
            "mcp/ready",
            serde_json::json!({
                "serverInfo": self.server.info(),
                "tools": self.server.registry().list(),
            }),
        )
    }
}

/// Write one message plus its newline terminator while holding the writer
/// lock, so whole lines are atomic with respect to other tasks.
async fn write_line<W>(writer: &Arc<Mutex<W>>, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut w = writer.lock().await;
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await
}
