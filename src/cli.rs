use crate::csv_io::{stream_requests, write_wallets, ReplyWriter};
use crate::engine::TransferEngine;
use crate::models::LedgerReply;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::PathBuf;
use std::pin::pin;
use tokio::fs::File;
use tokio::io::BufReader;

/// Apply every request in `input_path` and print one reply row per request.
///
/// Up to `concurrency` requests run at once; replies keep input order.
pub async fn run(
    input_path: PathBuf,
    engine: TransferEngine,
    concurrency: usize,
    wallets_out: Option<PathBuf>,
) -> Result<()> {
    let file = File::open(&input_path)
        .await
        .with_context(|| format!("cannot open {}", input_path.display()))?;
    let reader = BufReader::new(file);

    let replies = stream_requests(reader)
        .map(|row| {
            let engine = engine.clone();
            async move {
                match row {
                    Ok(request) => engine.handle(&request).await,
                    Err(e) => LedgerReply::invalid(e.to_string()),
                }
            }
        })
        .buffered(concurrency.max(1));
    let mut replies = pin!(replies);

    let mut out = ReplyWriter::new(tokio::io::stdout()).await?;
    while let Some(reply) = replies.next().await {
        out.write(&reply).await?;
    }
    out.flush().await?;

    if let Some(path) = wallets_out {
        let wallets = engine.store().wallets().await?;
        let file = File::create(&path)
            .await
            .with_context(|| format!("cannot create {}", path.display()))?;
        write_wallets(file, &wallets).await?;
    }

    Ok(())
}
