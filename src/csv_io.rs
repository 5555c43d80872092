use crate::models::{LedgerReply, LedgerRequest, Wallet};
use anyhow::{bail, Result};
use csv_async::{AsyncReaderBuilder, AsyncWriter, AsyncWriterBuilder};
use futures::stream::{Stream, StreamExt};
use rust_decimal::Decimal;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

/// Stream requests (`op,from,to,amount`) from async reader
pub fn stream_requests<R: AsyncRead + Unpin + Send + 'static>(
    reader: R,
) -> impl Stream<Item = Result<LedgerRequest, csv_async::Error>> {
    let compat_reader = reader.compat();
    let csv_reader = AsyncReaderBuilder::new()
        .trim(csv_async::Trim::All)
        .flexible(true)
        .create_deserializer(compat_reader);

    csv_reader.into_deserialize::<LedgerRequest>()
}

/// Writes `op,status,value,message` reply rows.
pub struct ReplyWriter<W: AsyncWrite + Unpin> {
    inner: AsyncWriter<Compat<W>>,
}

impl<W: AsyncWrite + Unpin> ReplyWriter<W> {
    pub async fn new(writer: W) -> Result<Self> {
        let mut inner = AsyncWriterBuilder::new()
            .flexible(true)
            .create_writer(writer.compat_write());
        inner.write_record(["op", "status", "value", "message"]).await?;
        Ok(Self { inner })
    }

    pub async fn write(&mut self, reply: &LedgerReply) -> Result<()> {
        self.inner
            .write_record([
                reply.op.as_str(),
                reply.status_str(),
                reply.value.as_str(),
                reply.message.as_str(),
            ])
            .await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }
}

/// Read `address,balance` rows used to seed a store.
pub async fn load_wallets<R: AsyncRead + Unpin + Send + 'static>(reader: R) -> Result<Vec<Wallet>> {
    let mut rows = AsyncReaderBuilder::new()
        .trim(csv_async::Trim::All)
        .create_deserializer(reader.compat())
        .into_deserialize::<Wallet>();

    let mut wallets = Vec::new();
    while let Some(row) = rows.next().await {
        let wallet = row?;
        if wallet.balance < Decimal::ZERO {
            bail!("wallet {} has a negative balance", wallet.address);
        }
        wallets.push(wallet);
    }
    Ok(wallets)
}

pub async fn write_wallets<W: AsyncWrite + Unpin>(writer: W, wallets: &[Wallet]) -> Result<()> {
    let mut out = AsyncWriterBuilder::new().create_writer(writer.compat_write());
    out.write_record(["address", "balance"]).await?;
    for wallet in wallets {
        let balance = wallet.balance.normalize().to_string();
        out.write_record([wallet.address.as_str(), balance.as_str()]).await?;
    }
    out.flush().await?;
    Ok(())
}
