//! Range reads from a file on the local filesystem.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use super::range_reader::{check_range, RangeReader};
use crate::error::IoError;

/// [`RangeReader`] over a local file.
///
/// The handle is opened once; each read seeks and reads on the blocking
/// pool so region reads never stall the runtime.
#[derive(Debug, Clone)]
pub struct LocalFileReader {
    file: Arc<Mutex<File>>,
    size: u64,
    identifier: String,
}

impl LocalFileReader {
    /// Open `path` and record its size.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let identifier = path.display().to_string();
        let read_error = |e: std::io::Error| IoError::Read {
            path: identifier.clone(),
            message: e.to_string(),
        };

        let file = tokio::fs::File::open(path).await.map_err(read_error)?;
        let size = file.metadata().await.map_err(read_error)?.len();

        Ok(Self {
            file: Arc::new(Mutex::new(file.into_std().await)),
            size,
            identifier,
        })
    }
}

#[async_trait]
impl RangeReader for LocalFileReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let file = Arc::clone(&self.file);
        let identifier = self.identifier.clone();
        tokio::task::spawn_blocking(move || {
            let read_error = |message: String| IoError::Read {
                path: identifier.clone(),
                message,
            };
            let mut file = file
                .lock()
                .map_err(|_| read_error("file handle poisoned".to_string()))?;

            let mut buffer = vec![0u8; len];
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| read_error(e.to_string()))?;
            file.read_exact(&mut buffer)
                .map_err(|e| read_error(e.to_string()))?;
            Ok(Bytes::from(buffer))
        })
        .await
        .map_err(|e| IoError::Read {
            path: self.identifier.clone(),
            message: e.to_string(),
        })?
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
