use crate::csv_io::{stream_requests, ReplyWriter};
use crate::engine::TransferEngine;
use crate::models::LedgerReply;
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

pub async fn run(bind: String, max_connections: usize, engine: TransferEngine) -> Result<()> {
    tracing::info!("Server mode: binding to {}", bind);
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("Listening on {}, max {} connections", listener.local_addr()?, max_connections);
    serve(listener, max_connections, engine).await
}

/// Accept connections forever. Each connection gets its own task, so
/// requests on different connections run in parallel.
pub async fn serve(listener: TcpListener, max_connections: usize, engine: TransferEngine) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(max_connections.max(1)));

    loop {
        let permit = semaphore.clone().acquire_owned().await?;
        let (socket, addr) = listener.accept().await?;
        tracing::info!("Accepted connection from {}", addr);

        let engine = engine.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, engine).await {
                tracing::error!("Connection {} error: {}", addr, e);
            }
            drop(permit);
        });
    }
}

async fn handle_connection(socket: TcpStream, engine: TransferEngine) -> Result<()> {
    let (reader, writer) = socket.into_split();
    let reader = BufReader::new(reader);

    let mut stream = stream_requests(reader);
    let mut replies = ReplyWriter::new(BufWriter::new(writer)).await?;

    while let Some(result) = stream.next().await {
        let reply = match result {
            Ok(request) => engine.handle(&request).await,
            Err(e) => {
                tracing::warn!("CSV parse error: {}", e);
                LedgerReply::invalid(e.to_string())
            }
        };
        replies.write(&reply).await?;
        // Reply to each request as soon as it is served.
        replies.flush().await?;
    }

    replies.flush().await?;
    Ok(())
}
