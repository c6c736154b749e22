use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::gateway::{self, GatewayContext};

/// Start the IRC TCP listener. Accepts connections and spawns a gateway task
/// for each, until `cancel` fires.
pub async fn start_irc_listener(
    bind_addr: &str,
    ctx: GatewayContext,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("IRC listener started on {}", listener.local_addr()?);
    serve_listener(listener, ctx, cancel).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve_listener(listener: TcpListener, ctx: GatewayContext, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                info!(peer = %addr, "IRC client connected");
                let ctx = ctx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(e) = gateway::serve(stream, ctx, cancel).await {
                        warn!(peer = %addr, error = %e, "IRC connection ended with error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept IRC connection");
            }
        }
    }

    info!("IRC listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Connection, Connector};
    use crate::maps::MapProvider;
    use crate::storage::blob_store::FsBlobStore;
    use crate::upstream::UpstreamError;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
    use tokio::net::TcpStream;
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::time::timeout;

    struct Refusing;

    #[async_trait]
    impl Connector for Refusing {
        async fn connect(&self, _nick: &str, _pass: &str) -> Result<Connection, UpstreamError> {
            Err(UpstreamError::Disconnected)
        }
    }

    async fn next_line(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> String {
        timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("timed out waiting for line")
            .unwrap()
            .expect("connection closed")
    }

    #[tokio::test]
    async fn test_accepts_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::open(dir.path(), "http://localhost/files")
            .await
            .unwrap();
        let ctx = GatewayContext {
            connector: Arc::new(Refusing),
            blobs: Arc::new(blobs),
            timestamps: None,
            map_provider: MapProvider::default(),
            queue_size: 10,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(serve_listener(listener, ctx, cancel.clone()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"PING :abc\r\nPASS x\r\nNICK bob\r\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        assert_eq!(next_line(&mut lines).await, ":whapp-irc PONG whapp-irc :abc");
        assert_eq!(
            next_line(&mut lines).await,
            ":status PRIVMSG bob :error while connecting: upstream session closed"
        );

        cancel.cancel();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
