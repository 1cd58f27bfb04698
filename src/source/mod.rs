//! Streaming part sources
//!
//! Adapts an input byte stream into bounded, independently-readable part
//! slices without exceeding the configured memory or disk budget. Inputs
//! with random access (files of known length) are sliced in place;
//! sequential streams are spooled a part at a time into temp files or
//! pooled memory buffers.

use std::fmt;
use std::io::{self, Cursor, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::byte_stream::Length;
use bytes::{Bytes, BytesMut};
use tempfile::{Builder as TempfileBuilder, TempPath};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{Result, UploadError};
use crate::pool::BufferPool;

/// Suffix for spool files, so stray ones are recognizable.
const SPOOL_SUFFIX: &str = ".s3up";

/// An input to upload: a file path (sliced in place via positional reads)
/// or an arbitrary byte stream (spooled part by part).
pub enum UploadBody {
    File(PathBuf),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl UploadBody {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        UploadBody::File(path.into())
    }

    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        UploadBody::Stream(Box::new(reader))
    }
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadBody::File(path) => f.debug_tuple("File").field(path).finish(),
            UploadBody::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// Produces [`PartSlice`] values from an input until it is exhausted.
///
/// `next` is called sequentially by the owning dispatcher; each returned
/// slice may then be read and closed concurrently with further `next`
/// calls, so at most one slice per part worker plus one being produced is
/// live at a time.
pub enum PartSource {
    RandomAccess(RandomAccessSource),
    TempFile(TempFileSource),
    Memory(MemorySource),
}

impl PartSource {
    /// A source spooling through temp files in `temp_dir` (or the OS
    /// default). File inputs are sliced in place instead.
    pub async fn tempfile(
        body: UploadBody,
        part_size: u64,
        temp_dir: Option<PathBuf>,
        copy_pool: Arc<BufferPool>,
    ) -> Result<Self> {
        match body {
            UploadBody::File(path) => Self::random_access(path, part_size).await,
            UploadBody::Stream(reader) => Ok(PartSource::TempFile(TempFileSource {
                reader,
                temp_dir,
                part_size,
                copy_pool,
            })),
        }
    }

    /// A source spooling through buffers from `part_pool`, which should be
    /// sized to `part_size`. File inputs are sliced in place instead.
    pub async fn memory(
        body: UploadBody,
        part_size: u64,
        part_pool: Arc<BufferPool>,
    ) -> Result<Self> {
        match body {
            UploadBody::File(path) => Self::random_access(path, part_size).await,
            UploadBody::Stream(reader) => Ok(PartSource::Memory(MemorySource {
                reader,
                part_size,
                part_pool,
            })),
        }
    }

    async fn random_access(path: PathBuf, part_size: u64) -> Result<Self> {
        let limit = tokio::fs::metadata(&path).await?.len();
        Ok(PartSource::RandomAccess(RandomAccessSource {
            path,
            limit,
            offset: 0,
            part_size,
        }))
    }

    /// The next part slice, or `None` once the input is exhausted. An
    /// empty input returns `None` on the first call.
    pub async fn next(&mut self) -> Result<Option<PartSlice>> {
        match self {
            PartSource::RandomAccess(source) => source.next(),
            PartSource::TempFile(source) => source.next().await,
            PartSource::Memory(source) => source.next().await,
        }
    }
}

/// Slices a file of known length in place; no copies, no-op closes.
pub struct RandomAccessSource {
    path: PathBuf,
    limit: u64,
    offset: u64,
    part_size: u64,
}

impl RandomAccessSource {
    fn next(&mut self) -> Result<Option<PartSlice>> {
        if self.offset >= self.limit {
            return Ok(None);
        }

        let len = self.part_size.min(self.limit - self.offset);
        let slice = PartSlice {
            len,
            backing: Backing::FileRange {
                path: self.path.clone(),
                offset: self.offset,
            },
        };

        self.offset += len;
        Ok(Some(slice))
    }
}

/// Spools up to `part_size` bytes per slice into a unique temp file.
pub struct TempFileSource {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    temp_dir: Option<PathBuf>,
    part_size: u64,
    copy_pool: Arc<BufferPool>,
}

impl TempFileSource {
    async fn next(&mut self) -> Result<Option<PartSlice>> {
        let spool = match &self.temp_dir {
            Some(dir) => TempfileBuilder::new().suffix(SPOOL_SUFFIX).tempfile_in(dir)?,
            None => TempfileBuilder::new().suffix(SPOOL_SUFFIX).tempfile()?,
        };

        // dropping `spool` before into_temp_path removes the file, which
        // covers every error path below
        let mut file = File::from_std(spool.reopen()?);
        let mut limited = (&mut self.reader).take(self.part_size);

        let mut chunk = self.copy_pool.get(self.copy_pool.capacity());
        let copied = copy_to_file(&mut limited, &mut file, &mut chunk).await;
        self.copy_pool.put(chunk);

        let len = copied?;
        if len == 0 {
            return Ok(None);
        }

        file.flush().await?;
        drop(file);

        Ok(Some(PartSlice {
            len,
            backing: Backing::TempFile {
                path: Some(spool.into_temp_path()),
            },
        }))
    }
}

async fn copy_to_file(
    reader: &mut (impl AsyncRead + Unpin),
    file: &mut File,
    chunk: &mut BytesMut,
) -> io::Result<u64> {
    let mut copied = 0u64;
    loop {
        chunk.clear();
        let n = reader.read_buf(chunk).await?;
        if n == 0 {
            return Ok(copied);
        }
        file.write_all(chunk).await?;
        copied += n as u64;
    }
}

/// Spools up to `part_size` bytes per slice into a pooled buffer.
pub struct MemorySource {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    part_size: u64,
    part_pool: Arc<BufferPool>,
}

impl MemorySource {
    async fn next(&mut self) -> Result<Option<PartSlice>> {
        let mut buffer = self.part_pool.get(self.part_size as usize);
        let mut limited = (&mut self.reader).take(self.part_size);

        while (buffer.len() as u64) < self.part_size {
            match limited.read_buf(&mut buffer).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    self.part_pool.put(buffer);
                    return Err(err.into());
                }
            }
        }

        if buffer.is_empty() {
            self.part_pool.put(buffer);
            return Ok(None);
        }

        let len = buffer.len() as u64;
        Ok(Some(PartSlice {
            len,
            backing: Backing::Memory {
                bytes: Some(buffer.freeze()),
                pool: self.part_pool.clone(),
            },
        }))
    }
}

/// A bounded, re-readable view over one part's bytes, owning whatever
/// backing resource was used to materialize it.
///
/// Closing releases the backing resource exactly once; further closes are
/// no-ops. A slice dropped without being closed releases the resource on
/// drop.
pub struct PartSlice {
    len: u64,
    backing: Backing,
}

enum Backing {
    /// A window over the input file itself; nothing to release.
    FileRange { path: PathBuf, offset: u64 },
    /// A spool file removed on close.
    TempFile { path: Option<TempPath> },
    /// A pooled buffer returned on close.
    Memory {
        bytes: Option<Bytes>,
        pool: Arc<BufferPool>,
    },
}

impl PartSlice {
    /// Bytes in this slice; always greater than zero.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A fresh reader over the slice bytes. Slices may be read any number
    /// of times until closed.
    pub async fn reader(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        match &self.backing {
            Backing::FileRange { path, offset } => {
                let mut file = File::open(path).await?;
                file.seek(SeekFrom::Start(*offset)).await?;
                Ok(Box::new(file.take(self.len)))
            }
            Backing::TempFile { path: Some(path) } => {
                let spool: &std::path::Path = path;
                let file = File::open(spool).await?;
                Ok(Box::new(file.take(self.len)))
            }
            Backing::Memory {
                bytes: Some(bytes), ..
            } => Ok(Box::new(Cursor::new(bytes.clone()))),
            Backing::TempFile { path: None } | Backing::Memory { bytes: None, .. } => {
                Err(closed_error())
            }
        }
    }

    /// The slice rendered as a request body.
    pub async fn byte_stream(&self) -> Result<ByteStream> {
        match &self.backing {
            Backing::FileRange { path, offset } => ByteStream::read_from()
                .path(path)
                .offset(*offset)
                .length(Length::Exact(self.len))
                .build()
                .await
                .map_err(|err| UploadError::Io(io::Error::other(err))),
            Backing::TempFile { path: Some(path) } => {
                let spool: &std::path::Path = path;
                ByteStream::read_from()
                    .path(spool)
                    .length(Length::Exact(self.len))
                    .build()
                    .await
                    .map_err(|err| UploadError::Io(io::Error::other(err)))
            }
            Backing::Memory {
                bytes: Some(bytes), ..
            } => Ok(ByteStream::from(bytes.clone())),
            Backing::TempFile { path: None } | Backing::Memory { bytes: None, .. } => {
                Err(closed_error())
            }
        }
    }

    /// Releases the backing resource. Idempotent: the second and later
    /// calls return `Ok` without effect.
    pub fn close(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::FileRange { .. } => Ok(()),
            Backing::TempFile { path } => match path.take() {
                Some(path) => path.close(),
                None => Ok(()),
            },
            Backing::Memory { bytes, pool } => {
                if let Some(bytes) = bytes.take() {
                    // reclaim the buffer when no body stream still holds it
                    if let Ok(buffer) = bytes.try_into_mut() {
                        pool.put(buffer);
                    }
                }
                Ok(())
            }
        }
    }
}

impl Drop for PartSlice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for PartSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match &self.backing {
            Backing::FileRange { .. } => "file-range",
            Backing::TempFile { .. } => "temp-file",
            Backing::Memory { .. } => "memory",
        };
        f.debug_struct("PartSlice")
            .field("len", &self.len)
            .field("backing", &backing)
            .finish()
    }
}

fn closed_error() -> UploadError {
    UploadError::Io(io::Error::other("part slice is closed"))
}
