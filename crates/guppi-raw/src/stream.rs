//! An ordered set of files presented as one continuous forward byte stream.
//!
//! Reads that run past the end of one handle continue at the start of the
//! next. Exhausted handles are dropped as soon as the stream moves past them,
//! so with [`LazyFile`] at most one descriptor is open at a time.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Cursor into a file set: which handle, and the byte offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPosition {
    pub file_index: usize,
    pub offset: u64,
}

struct ActiveHandle<R> {
    inner: R,
    len: u64,
    offset: u64,
}

impl<R> ActiveHandle<R> {
    fn remaining(&self) -> u64 {
        self.len - self.offset
    }
}

/// Reads an ordered, non-empty list of handles as a single stream.
pub struct MultiFileStream<R> {
    active: ActiveHandle<R>,
    pending: VecDeque<R>,
    file_index: usize,
}

impl<R: Read + Seek> MultiFileStream<R> {
    /// Wrap `handles`, in order. Fails with [`Error::EmptyFileSet`] if there
    /// are none.
    pub fn new<I: IntoIterator<Item = R>>(handles: I) -> Result<Self> {
        let mut pending: VecDeque<R> = handles.into_iter().collect();
        let first = pending.pop_front().ok_or(Error::EmptyFileSet)?;
        Ok(MultiFileStream {
            active: activate(first)?,
            pending,
            file_index: 0,
        })
    }

    pub fn position(&self) -> StreamPosition {
        StreamPosition {
            file_index: self.file_index,
            offset: self.active.offset,
        }
    }

    /// Number of handles not yet reached.
    pub fn files_remaining(&self) -> usize {
        self.pending.len()
    }

    /// Drop the exhausted handle and move to the next one.
    ///
    /// Returns `false` when there is no next handle.
    fn advance(&mut self) -> io::Result<bool> {
        let Some(next) = self.pending.pop_front() else {
            return Ok(false);
        };
        self.active = activate(next)?;
        self.file_index += 1;
        debug!(
            file_index = self.file_index,
            len = self.active.len,
            "advanced to next file"
        );
        Ok(true)
    }

    /// True only when positioned at the end of the last handle.
    ///
    /// Trailing empty handles are passed over.
    pub fn at_end(&mut self) -> Result<bool> {
        loop {
            if self.active.remaining() > 0 {
                return Ok(false);
            }
            if !self.advance()? {
                return Ok(true);
            }
        }
    }

    /// Fill `buf` completely, crossing file boundaries as needed.
    ///
    /// Fails with [`Error::EndOfSet`] if the set holds fewer bytes.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(Error::EndOfSet {
                        needed: buf.len(),
                        available: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    /// Read exactly `n` bytes into a new buffer.
    pub fn read_exact_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Move forward `n` bytes without reading them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        let mut skipped = 0usize;
        while skipped < n {
            let remaining = self.active.remaining();
            if remaining == 0 {
                if !self.advance()? {
                    return Err(Error::EndOfSet {
                        needed: n,
                        available: skipped,
                    });
                }
                continue;
            }
            let step = remaining.min((n - skipped) as u64);
            self.active.inner.seek(SeekFrom::Current(step as i64))?;
            self.active.offset += step;
            skipped += step as usize;
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for MultiFileStream<R> {
    /// Reads from the current handle, moving to the next one when it is
    /// exhausted. Returns `Ok(0)` only at the end of the last handle.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let remaining = self.active.remaining();
            if remaining == 0 {
                if !self.advance()? {
                    return Ok(0);
                }
                continue;
            }

            let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let n = self.active.inner.read(&mut buf[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "file shorter than its reported length",
                ));
            }
            self.active.offset += n as u64;
            return Ok(n);
        }
    }
}

/// Measure a handle and rewind it to its start.
fn activate<R: Seek>(mut inner: R) -> io::Result<ActiveHandle<R>> {
    let len = inner.seek(SeekFrom::End(0))?;
    inner.seek(SeekFrom::Start(0))?;
    Ok(ActiveHandle {
        inner,
        len,
        offset: 0,
    })
}

/// A file handle that opens its path on first use.
#[derive(Debug)]
pub struct LazyFile {
    path: PathBuf,
    file: Option<File>,
}

impl LazyFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        LazyFile {
            path: path.as_ref().to_path_buf(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the underlying file has been opened.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn file(&mut self) -> io::Result<&mut File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                debug!(path = %self.path.display(), "opening GUPPI RAW file");
                File::open(&self.path)?
            }
        };
        Ok(self.file.insert(file))
    }
}

impl Read for LazyFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Seek for LazyFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}
