//! Path-level entry points: iterate the blocks of a file set, or append one.

use std::fs::OpenOptions;
use std::io::{BufWriter, Read, Seek};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::framer::{BlockReader, BlockWriter, DataBlock, ReaderConfig};
use crate::header::{keys, RawHeader};
use crate::stream::{LazyFile, MultiFileStream};
use crate::variant::{HeaderVariant, ResolveVariant, VariantRegistry};

/// How [`write_to_file`] treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Truncate or create.
    Create,
    /// Append after the existing blocks, creating the file if needed.
    Append,
}

/// An ordered set of GUPPI RAW files read as one block sequence.
///
/// Files are opened lazily, one at a time, as iteration reaches them.
#[derive(Debug, Clone)]
pub struct GuppiHandler {
    paths: Vec<PathBuf>,
    registry: VariantRegistry,
    config: ReaderConfig,
}

impl GuppiHandler {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        GuppiHandler {
            paths: paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            registry: VariantRegistry::default(),
            config: ReaderConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: VariantRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn registry(&self) -> &VariantRegistry {
        &self.registry
    }

    fn reader(&self) -> Result<BlockReader<LazyFile>> {
        debug!(files = self.paths.len(), "opening file set");
        let stream = MultiFileStream::new(self.paths.iter().map(LazyFile::new))?;
        Ok(BlockReader::with_config(stream, self.config.clone()))
    }

    /// Iterate every `(variant, data)` pair in the set, in order.
    pub fn blocks(&self) -> Result<Blocks<'_, LazyFile, VariantRegistry>> {
        Ok(Blocks::new(self.reader()?, &self.registry))
    }

    /// Iterate the headers only, seeking past each data block.
    pub fn read_headers(&self) -> Result<Headers<LazyFile>> {
        Ok(Headers::new(self.reader()?))
    }
}

/// Iterator over the blocks of a file set.
///
/// Yields at most one error, after which it is exhausted.
pub struct Blocks<'a, R, V: ?Sized> {
    reader: BlockReader<R>,
    resolver: &'a V,
    done: bool,
}

impl<'a, R, V> Blocks<'a, R, V>
where
    R: Read + Seek,
    V: ResolveVariant + ?Sized,
{
    pub fn new(reader: BlockReader<R>, resolver: &'a V) -> Self {
        Blocks {
            reader,
            resolver,
            done: false,
        }
    }

    /// Number of blocks yielded so far.
    pub fn blocks_read(&self) -> usize {
        self.reader.blocks_read()
    }
}

impl<R, V> Iterator for Blocks<'_, R, V>
where
    R: Read + Seek,
    V: ResolveVariant + ?Sized,
{
    type Item = Result<(Box<dyn HeaderVariant>, DataBlock)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.reader.read_next_resolved(self.resolver).transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

impl<R, V> FusedIterator for Blocks<'_, R, V>
where
    R: Read + Seek,
    V: ResolveVariant + ?Sized,
{
}

/// Iterator over the headers of a file set, skipping the data blocks.
pub struct Headers<R> {
    reader: BlockReader<R>,
    done: bool,
}

impl<R: Read + Seek> Headers<R> {
    pub fn new(reader: BlockReader<R>) -> Self {
        Headers {
            reader,
            done: false,
        }
    }
}

impl<R: Read + Seek> Iterator for Headers<R> {
    type Item = Result<RawHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.reader.skip_next().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

impl<R: Read + Seek> FusedIterator for Headers<R> {}

/// Write one block to `path`.
///
/// `BLOCSIZE` is set to `data.len()` before the header is encoded. Returns
/// the number of bytes written.
pub fn write_to_file(
    path: impl AsRef<Path>,
    header: &mut RawHeader,
    data: &[u8],
    mode: OpenMode,
) -> Result<u64> {
    let path = path.as_ref();
    let blocsize = i64::try_from(data.len())
        .map_err(|_| Error::InvalidValue("data block too large"))?;
    header.set(keys::BLOCSIZE, blocsize);
    // Must fail before the file is opened, since Create truncates.
    let encoded = header.to_bytes()?;
    debug!(header_len = encoded.len(), "header encoded");

    let mut options = OpenOptions::new();
    match mode {
        OpenMode::Create => options.write(true).create(true).truncate(true),
        OpenMode::Append => options.append(true).create(true),
    };
    let file = options.open(path)?;

    let mut writer = BlockWriter::new(BufWriter::new(file));
    let written = writer.write_block(header, data)?;
    writer.flush()?;
    info!(path = %path.display(), bytes = written, ?mode, "wrote block");
    Ok(written)
}
