use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    registry::RoomRegistry,
    session::{OUTBOX_CAPACITY, Session, write_outbound},
};

/// Accepts connections indefinitely and runs one session per connection.
/// The registry outlives every session and is the only shared state.
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<RoomRegistry>,
}

impl RelayServer {
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            registry: Arc::new(RoomRegistry::new()),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared view of the membership state, mainly for inspection in tests.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.registry)
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let RelayServer { listener, registry } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<RoomRegistry>,
) {
    match result {
        Ok((stream, peer)) => spawn_session(stream, peer, registry),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

/// Spawns the session and its writer task for one accepted connection.
/// Whatever the session does, membership cleanup runs exactly once and the
/// acceptor keeps serving other connections.
fn spawn_session(stream: TcpStream, peer: SocketAddr, registry: &Arc<RoomRegistry>) {
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        let id = registry.next_member_id();
        info!(%peer, member = id, "client connected");

        let (reader, writer) = stream.into_split();
        let (outbox, frames) = mpsc::channel(OUTBOX_CAPACITY);
        let writer_task = tokio::spawn(async move {
            if let Err(err) = write_outbound(writer, frames).await {
                debug!(?err, "writer closed with error");
            }
        });

        let session = Session::new(id, Arc::clone(&registry), reader, outbox);
        match tokio::spawn(session.run()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%peer, member = id, error = %err, "session ended with error"),
            Err(join_err) => warn!(%peer, member = id, error = ?join_err, "session task panicked"),
        }

        // Dropping the registry's handle closes the last outbound sender,
        // letting the writer drain queued frames and exit.
        registry.leave(id).await;
        let _ = writer_task.await;
        info!(%peer, member = id, "client disconnected");
    });
}
