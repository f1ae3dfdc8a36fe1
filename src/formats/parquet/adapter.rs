//! Bridges `ByteReader` to the `AsyncRead + AsyncSeek` interface required by
//! the parquet stream builder. Reads are buffered in large ranges to keep
//! the number of byte-range requests low.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::config::PARQUET_BUFFER_SIZE;
use crate::error::ReadError;
use crate::io::ByteReader;

enum FetchState {
    Idle,
    InFlight {
        future: BoxFuture<'static, Result<Vec<u8>, ReadError>>,
        offset: u64,
    },
}

/// AsyncRead + AsyncSeek over a `ByteReader`.
pub struct ByteReaderAdapter<R: ByteReader> {
    source: Arc<R>,
    file_size: u64,
    position: u64,
    buffer: Bytes,
    buffer_offset: u64,
    fetch: FetchState,
}

impl<R: ByteReader + 'static> ByteReaderAdapter<R> {
    pub async fn new(source: R) -> Result<Self, ReadError> {
        let file_size = source.size().await?;
        Ok(Self {
            source: Arc::new(source),
            file_size,
            position: 0,
            buffer: Bytes::new(),
            buffer_offset: 0,
            fetch: FetchState::Idle,
        })
    }

    fn position_is_buffered(&self) -> bool {
        self.position >= self.buffer_offset
            && self.position < self.buffer_offset + self.buffer.len() as u64
    }

    /// Copy from the buffer at the current position into `out`, advancing
    /// the position. Returns the number of bytes copied.
    fn copy_from_buffer(&mut self, out: &mut [u8]) -> usize {
        let start = (self.position - self.buffer_offset) as usize;
        let available = self.buffer.len() - start;
        let count = out.len().min(available);
        out[..count].copy_from_slice(&self.buffer[start..start + count]);
        self.position += count as u64;
        count
    }
}

impl<R: ByteReader + 'static> AsyncRead for ByteReaderAdapter<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.position >= self.file_size {
            return Poll::Ready(Ok(()));
        }

        if self.position_is_buffered() {
            let copied = self.copy_from_buffer(buf.initialize_unfilled());
            buf.advance(copied);
            return Poll::Ready(Ok(()));
        }

        loop {
            match &mut self.fetch {
                FetchState::Idle => {
                    let source = Arc::clone(&self.source);
                    let offset = self.position;
                    let end = (offset + PARQUET_BUFFER_SIZE as u64).min(self.file_size);

                    let future: BoxFuture<'static, Result<Vec<u8>, ReadError>> =
                        Box::pin(async move { source.read_range(offset, end).await });
                    self.fetch = FetchState::InFlight { future, offset };
                }
                FetchState::InFlight { future, offset } => match future.as_mut().poll(cx) {
                    Poll::Ready(Ok(data)) => {
                        self.buffer_offset = *offset;
                        self.buffer = Bytes::from(data);
                        self.fetch = FetchState::Idle;

                        let copied = self.copy_from_buffer(buf.initialize_unfilled());
                        buf.advance(copied);
                        return Poll::Ready(Ok(()));
                    }
                    Poll::Ready(Err(e)) => {
                        self.fetch = FetchState::Idle;
                        return Poll::Ready(Err(io::Error::other(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                },
            }
        }
    }
}

impl<R: ByteReader + 'static> AsyncSeek for ByteReaderAdapter<R> {
    fn start_seek(mut self: Pin<&mut Self>, target: io::SeekFrom) -> io::Result<()> {
        let new_position = match target {
            io::SeekFrom::Start(pos) => pos as i64,
            io::SeekFrom::End(offset) => self.file_size as i64 + offset,
            io::SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if new_position < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to negative position",
            ));
        }
        self.position = new_position as u64;

        if !self.position_is_buffered() {
            self.buffer = Bytes::new();
        }
        // A pending fetch targets the old position.
        self.fetch = FetchState::Idle;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    #[derive(Clone)]
    struct InMemoryByteReader {
        data: Vec<u8>,
    }

    #[async_trait]
    impl ByteReader for InMemoryByteReader {
        async fn size(&self) -> Result<u64, ReadError> {
            Ok(self.data.len() as u64)
        }

        async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>, ReadError> {
            let end = (end as usize).min(self.data.len());
            Ok(self.data[start as usize..end].to_vec())
        }
    }

    async fn adapter_for(data: &[u8]) -> ByteReaderAdapter<InMemoryByteReader> {
        let reader = InMemoryByteReader {
            data: data.to_vec(),
        };
        ByteReaderAdapter::new(reader).await.unwrap()
    }

    #[tokio::test]
    async fn test_sequential_read() {
        let mut adapter = adapter_for(b"parquet importer adapter test").await;

        let mut buf = vec![0u8; 7];
        adapter.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"parquet");

        let mut rest = Vec::new();
        adapter.read_to_end(&mut rest).await.unwrap();
        assert_eq!(&rest, b" importer adapter test");
    }

    #[tokio::test]
    async fn test_seek_start_end_current() {
        let mut adapter = adapter_for(b"0123456789ABCDEF").await;

        adapter.seek(io::SeekFrom::Start(10)).await.unwrap();
        let mut buf = vec![0u8; 3];
        adapter.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ABC");

        adapter.seek(io::SeekFrom::End(-4)).await.unwrap();
        adapter.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"CDE");

        adapter.seek(io::SeekFrom::Current(-6)).await.unwrap();
        adapter.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"9AB");
    }

    #[tokio::test]
    async fn test_read_past_eof_returns_zero() {
        let mut adapter = adapter_for(b"tiny").await;
        adapter.seek(io::SeekFrom::Start(100)).await.unwrap();

        let mut buf = vec![0u8; 8];
        let read = adapter.read(&mut buf).await.unwrap();
        assert_eq!(read, 0);
    }
}
