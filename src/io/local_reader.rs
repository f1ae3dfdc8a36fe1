use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::byte_reader::ByteReader;
use crate::error::ReadError;

/// ByteReader over a file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileByteReader {
    path: PathBuf,
}

impl LocalFileByteReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn open(&self) -> Result<File, ReadError> {
        File::open(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReadError::NotFound {
                    path: self.path.display().to_string(),
                }
            } else {
                ReadError::Io(e)
            }
        })
    }
}

#[async_trait]
impl ByteReader for LocalFileByteReader {
    async fn size(&self) -> Result<u64, ReadError> {
        let file = self.open().await?;
        Ok(file.metadata().await?.len())
    }

    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>, ReadError> {
        let mut file = self.open().await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;

        let mut buffer = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buffer).await?;
        Ok(buffer)
    }
}
