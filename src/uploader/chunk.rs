//! Sequential fixed-size chunk reading

use bytes::{Bytes, BytesMut};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Chunk size used when none is configured (2 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// One slice of the file
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset of the first byte in the file
    pub offset: u64,
    pub data: Bytes,
    /// End of file reached; `data` is empty and nothing should be sent
    pub finished: bool,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Reads a file front to back in `chunk_size` pieces.
///
/// Every chunk except the last is exactly `chunk_size` bytes, so the chunks
/// tile `[0, size)` without gaps or overlap.
pub struct ChunkReader {
    file: File,
    chunk_size: usize,
    position: u64,
}

impl ChunkReader {
    pub async fn open(path: &Path, chunk_size: usize) -> io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            file,
            chunk_size: chunk_size.max(1),
            position: 0,
        })
    }

    /// Bytes handed out so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub async fn next_chunk(&mut self) -> io::Result<Chunk> {
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let mut filled = 0;

        // A single read may return less than asked for; keep going until full or EOF
        while filled < self.chunk_size {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        let offset = self.position;
        self.position += filled as u64;

        tracing::trace!(
            target: "uploader::chunk",
            offset,
            length = filled,
            "Chunk read"
        );

        Ok(Chunk {
            offset,
            data: buf.freeze(),
            finished: filled == 0,
        })
    }
}
