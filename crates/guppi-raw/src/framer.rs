//! Block framing: one `(header, data)` pair at a time, with directio padding.

use std::io::{self, Read, Seek, Write};

use tracing::{debug, trace};

use crate::block::DATA_PAD_BYTE;
use crate::error::{Error, Result};
use crate::header::{BlockShape, RawHeader, DEFAULT_MAX_HEADER_CARDS};
use crate::stream::{MultiFileStream, StreamPosition};
use crate::variant::{HeaderVariant, ResolveVariant};

/// Reader-side settings.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Cards read without finding END before the header is rejected.
    pub max_header_cards: usize,
    /// Reject a file set whose block shape changes after the first block.
    pub require_consistent_shape: bool,
    /// Reject a first block whose `NBITS` is not 4 or 8, or whose `NPOL` is
    /// not 1 or 2. Absent fields are not checked.
    pub require_supported_format: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_header_cards: DEFAULT_MAX_HEADER_CARDS,
            require_consistent_shape: true,
            require_supported_format: false,
        }
    }
}

/// Writer-side settings.
#[derive(Debug, Clone, Default)]
pub struct WriterConfig {
    /// Ceiling on the bytes written to the output handle.
    pub size_limit: Option<u64>,
}

/// Where a data block lives in the file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRegion {
    /// Position of the first payload byte.
    pub start: StreamPosition,
    /// Significant payload length (the header's payload size).
    pub len: usize,
    /// Length including directio padding.
    pub on_disk_len: usize,
}

/// A data block read from the stream, owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    bytes: Vec<u8>,
    region: DataRegion,
}

impl DataBlock {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn region(&self) -> DataRegion {
        self.region
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for DataBlock {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Header plus the payload geometry computed from it.
struct FramedHeader {
    header: RawHeader,
    payload: usize,
    padding: usize,
}

/// Reads consecutive blocks from a file set.
pub struct BlockReader<R> {
    stream: MultiFileStream<R>,
    config: ReaderConfig,
    blocks_read: usize,
    reference_shape: Option<BlockShape>,
}

impl<R: Read + Seek> BlockReader<R> {
    pub fn new(stream: MultiFileStream<R>) -> Self {
        Self::with_config(stream, ReaderConfig::default())
    }

    pub fn with_config(stream: MultiFileStream<R>, config: ReaderConfig) -> Self {
        Self {
            stream,
            config,
            blocks_read: 0,
            reference_shape: None,
        }
    }

    /// Build a reader over `handles`, in order.
    pub fn from_handles<I: IntoIterator<Item = R>>(handles: I) -> Result<Self> {
        Ok(Self::new(MultiFileStream::new(handles)?))
    }

    /// Number of blocks consumed so far.
    pub fn blocks_read(&self) -> usize {
        self.blocks_read
    }

    pub fn position(&self) -> StreamPosition {
        self.stream.position()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Read the next header and position the stream at its payload.
    ///
    /// Returns `Ok(None)` only when the set ends exactly between blocks.
    fn read_header(&mut self) -> Result<Option<FramedHeader>> {
        if self.stream.at_end()? {
            debug!(blocks = self.blocks_read, "end of file set");
            return Ok(None);
        }

        let (header, header_len) =
            RawHeader::read_counted(&mut self.stream, self.config.max_header_cards)?;
        let payload = header.payload_size()?;
        let alignment = header.alignment();

        let header_padding = alignment.padding_len(header_len);
        if header_padding > 0 {
            trace!(bytes = header_padding, "skipping header padding");
            self.stream.skip(header_padding)?;
        }

        if self.blocks_read == 0 && self.config.require_supported_format {
            check_format(&header)?;
        }
        self.check_shape(&header)?;

        Ok(Some(FramedHeader {
            padding: alignment.padding_len(payload),
            header,
            payload,
        }))
    }

    fn check_shape(&mut self, header: &RawHeader) -> Result<()> {
        if !self.config.require_consistent_shape {
            return Ok(());
        }
        let Some(shape) = header.block_shape() else {
            return Ok(());
        };
        match self.reference_shape {
            None => self.reference_shape = Some(shape),
            Some(reference) if reference != shape => {
                return Err(Error::BlockShapeChanged {
                    block_index: self.blocks_read + 1,
                })
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Read the next `(header, data)` pair.
    ///
    /// `Ok(None)` is the clean end of the set. Running out of bytes anywhere
    /// inside a block is an error.
    pub fn read_next(&mut self) -> Result<Option<(RawHeader, DataBlock)>> {
        let Some(framed) = self.read_header()? else {
            return Ok(None);
        };

        if framed.payload > 0 {
            // Moves onto the next file when the header ended on a boundary.
            self.stream.at_end()?;
        }
        let start = self.stream.position();
        let bytes = self.stream.read_exact_vec(framed.payload)?;
        if framed.padding > 0 {
            trace!(bytes = framed.padding, "skipping data padding");
            self.stream.skip(framed.padding)?;
        }

        self.blocks_read += 1;
        debug!(
            block = self.blocks_read,
            payload = framed.payload,
            file_index = start.file_index,
            offset = start.offset,
            "read block"
        );

        let block = DataBlock {
            bytes,
            region: DataRegion {
                start,
                len: framed.payload,
                on_disk_len: framed.payload + framed.padding,
            },
        };
        Ok(Some((framed.header, block)))
    }

    /// Read the next pair and attach the variant chosen by `resolver`.
    pub fn read_next_resolved<V>(
        &mut self,
        resolver: &V,
    ) -> Result<Option<(Box<dyn HeaderVariant>, DataBlock)>>
    where
        V: ResolveVariant + ?Sized,
    {
        Ok(self
            .read_next()?
            .map(|(header, block)| (resolver.resolve(header), block)))
    }

    /// Read the next header and seek past its payload without reading it.
    pub fn skip_next(&mut self) -> Result<Option<RawHeader>> {
        let Some(framed) = self.read_header()? else {
            return Ok(None);
        };
        self.stream.skip(framed.payload + framed.padding)?;
        self.blocks_read += 1;
        debug!(
            block = self.blocks_read,
            payload = framed.payload,
            "skipped block"
        );
        Ok(Some(framed.header))
    }
}

fn check_format(header: &RawHeader) -> Result<()> {
    if let Some(nbits) = header.nbits() {
        if !matches!(nbits, 4 | 8) {
            return Err(Error::UnsupportedBitDepth(nbits));
        }
    }
    if let Some(npol) = header.npol() {
        if !matches!(npol, 1 | 2) {
            return Err(Error::InvalidValue("NPOL must be 1 or 2"));
        }
    }
    Ok(())
}

/// Writes complete blocks to a single output handle.
///
/// File rollover belongs to the caller; [`BlockWriter::remaining_capacity`]
/// reports how much room is left under the configured size limit.
pub struct BlockWriter<W> {
    inner: W,
    config: WriterConfig,
    bytes_written: u64,
    blocks_written: usize,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, WriterConfig::default())
    }

    pub fn with_config(inner: W, config: WriterConfig) -> Self {
        Self {
            inner,
            config,
            bytes_written: 0,
            blocks_written: 0,
        }
    }

    /// Count `offset` bytes already present in the output against the limit.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.bytes_written = offset;
        self
    }

    /// Bytes still available under the size limit, if one is set.
    pub fn remaining_capacity(&self) -> Option<u64> {
        self.config
            .size_limit
            .map(|limit| limit.saturating_sub(self.bytes_written))
    }

    /// Whether a block with `header` and `data_len` payload bytes fits.
    pub fn fits(&self, header: &RawHeader, data_len: usize) -> bool {
        let needed = block_on_disk_len(header, data_len);
        self.remaining_capacity()
            .map_or(true, |remaining| needed <= remaining)
    }

    /// Write one block: header, data, then zero padding under directio.
    ///
    /// The header is fully encoded and the size checks pass before the first
    /// byte is written. Returns the number of bytes written.
    pub fn write_block(&mut self, header: &RawHeader, data: &[u8]) -> Result<u64> {
        let declared = header.payload_size()?;
        if declared != data.len() {
            return Err(Error::PayloadSizeMismatch {
                declared,
                actual: data.len(),
            });
        }

        let header_bytes = header.to_bytes()?;
        let padding = header.alignment().padding_len(data.len());
        let needed = (header_bytes.len() + data.len() + padding) as u64;
        if let Some(remaining) = self.remaining_capacity() {
            if needed > remaining {
                return Err(Error::CapacityExceeded { needed, remaining });
            }
        }

        self.inner.write_all(&header_bytes)?;
        self.inner.write_all(data)?;
        io::copy(
            &mut io::repeat(DATA_PAD_BYTE).take(padding as u64),
            &mut self.inner,
        )?;

        self.bytes_written += needed;
        self.blocks_written += 1;
        debug!(
            block = self.blocks_written,
            header_len = header_bytes.len(),
            payload = data.len(),
            padding,
            "wrote block"
        );
        Ok(needed)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Total bytes a block occupies on disk: header section plus data section.
pub fn block_on_disk_len(header: &RawHeader, data_len: usize) -> u64 {
    (header.header_on_disk_len() + header.alignment().padded_len(data_len)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{CARD_SIZE, DIRECTIO_ALIGNMENT};
    use std::io::Cursor;

    fn header(payload: usize, directio: bool) -> RawHeader {
        let mut h = RawHeader::new();
        h.set("TELESCOP", "SoftwareUnitTest");
        h.set("BLOCSIZE", payload as i64);
        if directio {
            h.set("DIRECTIO", 1i64);
        }
        h
    }

    fn encode(blocks: &[(RawHeader, Vec<u8>)]) -> Vec<u8> {
        let mut writer = BlockWriter::new(Vec::new());
        for (h, data) in blocks {
            writer.write_block(h, data).unwrap();
        }
        writer.into_inner()
    }

    fn reader(bytes: Vec<u8>) -> BlockReader<Cursor<Vec<u8>>> {
        BlockReader::from_handles([Cursor::new(bytes)]).unwrap()
    }

    #[test]
    fn single_packed_block() {
        let data: Vec<u8> = (0..100).collect();
        let bytes = encode(&[(header(100, false), data.clone())]);
        assert_eq!(bytes.len(), 3 * CARD_SIZE + 100);

        let mut r = reader(bytes);
        let (h, block) = r.read_next().unwrap().unwrap();
        assert_eq!(h, header(100, false));
        assert_eq!(block.as_bytes(), &data[..]);
        assert_eq!(block.region().len, 100);
        assert_eq!(block.region().on_disk_len, 100);
        assert_eq!(block.region().start.offset, 3 * CARD_SIZE as u64);
        assert!(r.read_next().unwrap().is_none());
    }

    #[test]
    fn directio_block_layout() {
        let data = vec![7u8; 700];
        let bytes = encode(&[(header(700, true), data.clone())]);
        // 4 cards (320) -> 512, 700 -> 1024
        assert_eq!(bytes.len(), 512 + 1024);
        assert!(bytes[4 * CARD_SIZE..512].iter().all(|&b| b == b' '));
        assert!(bytes[512 + 700..].iter().all(|&b| b == DATA_PAD_BYTE));

        let mut r = reader(bytes);
        let (_, block) = r.read_next().unwrap().unwrap();
        assert_eq!(block.len(), 700);
        assert_eq!(block.region().on_disk_len, 1024);
        assert_eq!(block.region().start.offset, 512);
        assert!(r.read_next().unwrap().is_none());
    }

    #[test]
    fn directio_sections_are_aligned() {
        for payload in [0usize, 1, 511, 512, 513, 4000] {
            let h = header(payload, true);
            let mut writer = BlockWriter::new(Vec::new());
            let written = writer.write_block(&h, &vec![1u8; payload]).unwrap();
            assert_eq!(written % DIRECTIO_ALIGNMENT as u64, 0);
            assert_eq!(h.header_on_disk_len() % DIRECTIO_ALIGNMENT, 0);
            assert_eq!(h.payload_size().unwrap(), payload);
            assert_eq!(written, block_on_disk_len(&h, payload));
        }
    }

    #[test]
    fn repeated_writes_are_identical() {
        let h = header(333, true);
        let data = vec![0xA5u8; 333];
        let first = encode(&[(h.clone(), data.clone())]);
        let second = encode(&[(h, data)]);
        assert_eq!(first, second);
    }

    #[test]
    fn several_blocks_in_sequence() {
        let blocks: Vec<(RawHeader, Vec<u8>)> = (0..4)
            .map(|i| (header(50 + i, i % 2 == 0), vec![i as u8; 50 + i]))
            .collect();
        let mut r = reader(encode(&blocks));
        for (h, data) in &blocks {
            let (rh, rb) = r.read_next().unwrap().unwrap();
            assert_eq!(&rh, h);
            assert_eq!(rb.as_bytes(), &data[..]);
        }
        assert!(r.read_next().unwrap().is_none());
        assert_eq!(r.blocks_read(), 4);
    }

    #[test]
    fn truncated_payload_is_end_of_set() {
        let mut bytes = encode(&[(header(64, false), vec![1u8; 64])]);
        bytes.pop();
        let mut r = reader(bytes);
        assert!(matches!(
            r.read_next(),
            Err(Error::EndOfSet {
                needed: 64,
                available: 63
            })
        ));
    }

    #[test]
    fn truncated_header_is_fatal() {
        let bytes = encode(&[(header(8, false), vec![0u8; 8])]);
        let mut r = reader(bytes[..CARD_SIZE + 10].to_vec());
        assert!(matches!(
            r.read_next(),
            Err(Error::TruncatedHeader { cards_read: 1 })
        ));
    }

    #[test]
    fn terminator_only_header_lacks_sizing() {
        let mut bytes = crate::card::end_card().to_vec();
        bytes.extend_from_slice(&[0xEE; 32]);
        let mut r = reader(bytes);
        assert!(matches!(
            r.read_next(),
            Err(Error::MissingSizingFields(_))
        ));
        assert_eq!(r.position().offset, CARD_SIZE as u64);
    }

    #[test]
    fn empty_input_is_clean_end() {
        let mut r = reader(Vec::new());
        assert!(r.read_next().unwrap().is_none());
    }

    #[test]
    fn skip_next_matches_read_next() {
        let blocks = vec![
            (header(10, true), vec![1u8; 10]),
            (header(20, false), vec![2u8; 20]),
        ];
        let bytes = encode(&blocks);
        let mut r = reader(bytes);
        assert_eq!(r.skip_next().unwrap().unwrap(), blocks[0].0);
        let (h, data) = r.read_next().unwrap().unwrap();
        assert_eq!(h, blocks[1].0);
        assert_eq!(data.as_bytes(), &blocks[1].1[..]);
        assert!(r.skip_next().unwrap().is_none());
    }

    #[test]
    fn shape_change_is_rejected() {
        let shaped = |nants: i64| {
            let mut h = RawHeader::new();
            h.set("OBSNCHAN", 4i64);
            h.set("NANTS", nants);
            h.set("NPOL", 2i64);
            h.set("NBITS", 8i64);
            h.set("BLOCSIZE", 64i64);
            h
        };
        let bytes = encode(&[(shaped(1), vec![0u8; 64]), (shaped(2), vec![0u8; 64])]);

        let mut r = reader(bytes.clone());
        r.read_next().unwrap().unwrap();
        assert!(matches!(
            r.read_next(),
            Err(Error::BlockShapeChanged { block_index: 2 })
        ));

        let config = ReaderConfig {
            require_consistent_shape: false,
            ..ReaderConfig::default()
        };
        let stream = MultiFileStream::new([Cursor::new(bytes)]).unwrap();
        let mut r = BlockReader::with_config(stream, config);
        assert!(r.read_next().unwrap().is_some());
        assert!(r.read_next().unwrap().is_some());
    }

    #[test]
    fn supported_format_is_opt_in() {
        let mut h = header(16, false);
        h.set("NBITS", 16i64);
        h.set("NPOL", 2i64);
        let bytes = encode(&[(h, vec![0u8; 16])]);

        assert!(reader(bytes.clone()).read_next().unwrap().is_some());

        let config = ReaderConfig {
            require_supported_format: true,
            ..ReaderConfig::default()
        };
        let stream = MultiFileStream::new([Cursor::new(bytes)]).unwrap();
        let mut r = BlockReader::with_config(stream, config);
        assert!(matches!(
            r.read_next(),
            Err(Error::UnsupportedBitDepth(16))
        ));
    }

    #[test]
    fn supported_format_rejects_polarizations() {
        let mut h = header(16, false);
        h.set("NBITS", 8i64);
        h.set("NPOL", 4i64);
        let bytes = encode(&[(h, vec![0u8; 16])]);
        let config = ReaderConfig {
            require_supported_format: true,
            ..ReaderConfig::default()
        };
        let stream = MultiFileStream::new([Cursor::new(bytes)]).unwrap();
        let mut r = BlockReader::with_config(stream, config);
        assert!(matches!(r.read_next(), Err(Error::InvalidValue(_))));
    }

    #[test]
    fn end_keyword_in_header_writes_nothing() {
        let mut h = header(4, false);
        h.set("END", 1i64);
        let mut writer = BlockWriter::new(Vec::new());
        assert!(matches!(
            writer.write_block(&h, &[0u8; 4]),
            Err(Error::InvalidKeyword(_))
        ));
        assert!(writer.get_ref().is_empty());
        assert_eq!(writer.blocks_written(), 0);
    }

    #[test]
    fn payload_mismatch_writes_nothing() {
        let mut writer = BlockWriter::new(Vec::new());
        assert!(matches!(
            writer.write_block(&header(10, false), &[0u8; 9]),
            Err(Error::PayloadSizeMismatch {
                declared: 10,
                actual: 9
            })
        ));
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn size_limit_is_enforced() {
        let h = header(100, true);
        let per_block = block_on_disk_len(&h, 100);
        let config = WriterConfig {
            size_limit: Some(per_block * 2 + 10),
        };
        let mut writer = BlockWriter::with_config(Vec::new(), config);
        assert!(writer.fits(&h, 100));
        writer.write_block(&h, &[0u8; 100]).unwrap();
        writer.write_block(&h, &[0u8; 100]).unwrap();
        assert_eq!(writer.remaining_capacity(), Some(10));
        assert!(!writer.fits(&h, 100));
        assert!(matches!(
            writer.write_block(&h, &[0u8; 100]),
            Err(Error::CapacityExceeded { remaining: 10, .. })
        ));
        assert_eq!(writer.bytes_written(), per_block * 2);
        assert_eq!(writer.get_ref().len() as u64, per_block * 2);
    }

    #[test]
    fn starting_offset_counts_against_limit() {
        let writer = BlockWriter::with_config(
            Vec::new(),
            WriterConfig {
                size_limit: Some(1000),
            },
        )
        .starting_at(900);
        assert_eq!(writer.remaining_capacity(), Some(100));
    }

    #[test]
    fn resolved_read_attaches_variant() {
        let bytes = encode(&[(header(4, false), vec![9u8; 4])]);
        let registry = crate::variant::VariantRegistry::new();
        let mut r = reader(bytes);
        let (variant, block) = r.read_next_resolved(&registry).unwrap().unwrap();
        assert_eq!(variant.name(), "generic");
        assert_eq!(variant.telescope(), Some("SoftwareUnitTest"));
        assert_eq!(block.as_bytes(), &[9u8; 4]);
    }
}
