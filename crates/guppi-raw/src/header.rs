//! GUPPI header blocks: the ordered card run ending in `END`, its sizing
//! fields and its on-disk layout.

use std::io::{ErrorKind, Read, Write};

use tracing::trace;

use crate::block::{Alignment, CARD_SIZE, HEADER_PAD_BYTE};
use crate::card::{decode_card, encode_card, end_card, Card};
use crate::error::{Error, Result};
use crate::value::Value;

/// Well-known GUPPI keywords used by the framing layer.
pub mod keys {
    pub const BLOCSIZE: &str = "BLOCSIZE";
    pub const DIRECTIO: &str = "DIRECTIO";
    pub const NBITS: &str = "NBITS";
    pub const NPOL: &str = "NPOL";
    pub const OBSNCHAN: &str = "OBSNCHAN";
    pub const NANTS: &str = "NANTS";
    pub const NTIME: &str = "NTIME";
    pub const PIPERBLK: &str = "PIPERBLK";
    pub const TELESCOP: &str = "TELESCOP";
}

/// Default ceiling on the number of cards read before an END card.
pub const DEFAULT_MAX_HEADER_CARDS: usize = 4096;

/// Dimensions of a block's complex samples: antennas, channels per antenna,
/// time samples, polarizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockShape {
    pub antennas: usize,
    pub channels: usize,
    pub times: usize,
    pub polarizations: usize,
}

impl BlockShape {
    /// Number of complex samples in the block.
    pub fn samples(&self) -> usize {
        self.antennas * self.channels * self.times * self.polarizations
    }
}

/// Sizing and alignment facts that the framer needs from a header.
pub trait BlockGeometry {
    /// Byte length of the data block that follows the header.
    fn payload_size(&self) -> Result<usize>;

    /// Whether header and data sections are padded to 512 bytes.
    fn is_directio(&self) -> bool;

    /// Sample dimensions, when the header carries enough fields.
    fn block_shape(&self) -> Option<BlockShape>;

    fn alignment(&self) -> Alignment {
        if self.is_directio() {
            Alignment::DirectIo
        } else {
            Alignment::Packed
        }
    }
}

/// A parsed GUPPI header: keyword-unique cards in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct RawHeader {
    cards: Vec<Card>,
}

impl RawHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read cards from `reader` until the END card is consumed.
    ///
    /// Blank cards are skipped and a repeated keyword overwrites the earlier
    /// card. Fails with [`Error::TruncatedHeader`] if the stream ends first.
    pub fn read<R: Read>(reader: &mut R, max_cards: usize) -> Result<Self> {
        Self::read_counted(reader, max_cards).map(|(header, _)| header)
    }

    /// Like [`RawHeader::read`], also returning the number of bytes consumed
    /// (END card included).
    pub fn read_counted<R: Read>(reader: &mut R, max_cards: usize) -> Result<(Self, usize)> {
        let mut header = RawHeader::new();
        let mut buf = [0u8; CARD_SIZE];
        let mut cards_read = 0usize;

        loop {
            if cards_read >= max_cards {
                return Err(Error::HeaderTooLong { max_cards });
            }
            match reader.read_exact(&mut buf) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(Error::TruncatedHeader { cards_read });
                }
                Err(e) => return Err(Error::Io(e)),
            }
            cards_read += 1;

            let card = decode_card(&buf)?;
            if card.is_end() {
                break;
            }
            if !card.is_blank() {
                header.insert(card);
            }
        }

        trace!(cards = cards_read, keywords = header.len(), "header parsed");
        Ok((header, cards_read * CARD_SIZE))
    }

    /// Insert a card, replacing any card with the same keyword in place.
    pub fn insert(&mut self, card: Card) {
        match self
            .cards
            .iter_mut()
            .find(|c| c.keyword() == card.keyword())
        {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    /// Set `keyword` to `value`, dropping any previous comment.
    pub fn set(&mut self, keyword: &str, value: impl Into<Value>) {
        self.insert(Card::new(keyword, value));
    }

    pub fn set_with_comment(&mut self, keyword: &str, value: impl Into<Value>, comment: &str) {
        self.insert(Card::new(keyword, value).with_comment(comment));
    }

    /// Remove a keyword, returning its card.
    pub fn remove(&mut self, keyword: &str) -> Option<Card> {
        let idx = self.position(keyword)?;
        Some(self.cards.remove(idx))
    }

    fn position(&self, keyword: &str) -> Option<usize> {
        self.cards
            .iter()
            .position(|c| c.keyword().eq_ignore_ascii_case(keyword))
    }

    pub fn card(&self, keyword: &str) -> Option<&Card> {
        self.position(keyword).map(|i| &self.cards[i])
    }

    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.card(keyword).and_then(Card::value)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.position(keyword).is_some()
    }

    pub fn get_int(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(Value::as_int)
    }

    pub fn get_float(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(Value::as_float)
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(Value::as_str)
    }

    pub fn get_bool(&self, keyword: &str) -> Option<bool> {
        self.get(keyword).and_then(Value::as_bool)
    }

    /// Iterate over the cards in insertion order (END excluded).
    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    // ── Well-known fields ──

    /// The `TELESCOP` value, used to pick a header variant.
    pub fn telescope(&self) -> Option<&str> {
        self.get_str(keys::TELESCOP)
    }

    pub fn nbits(&self) -> Option<i64> {
        self.get_int(keys::NBITS)
    }

    pub fn npol(&self) -> Option<i64> {
        self.get_int(keys::NPOL)
    }

    pub fn obsnchan(&self) -> Option<i64> {
        self.get_int(keys::OBSNCHAN)
    }

    pub fn nants(&self) -> Option<i64> {
        self.get_int(keys::NANTS)
    }

    pub fn blocsize(&self) -> Option<i64> {
        self.get_int(keys::BLOCSIZE)
    }

    /// Time samples per block: `NTIME`, then `PIPERBLK`, then derived from
    /// `BLOCSIZE`.
    pub fn ntime(&self) -> Option<i64> {
        if let Some(n) = self.get_int(keys::NTIME).or(self.get_int(keys::PIPERBLK)) {
            return Some(n);
        }
        let bits_per_time = self
            .obsnchan()?
            .checked_mul(self.npol()?)?
            .checked_mul(self.nbits()?)?
            .checked_mul(2)?;
        if bits_per_time <= 0 {
            return None;
        }
        Some(self.blocsize()?.checked_mul(8)? / bits_per_time)
    }

    // ── Geometry ──

    /// A non-negative integer sizing field.
    fn size_field(&self, keyword: &'static str) -> Result<usize> {
        self.get_int(keyword)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(Error::MissingSizingFields(keyword))
    }

    /// Byte length of the following data block.
    ///
    /// `BLOCSIZE` wins when present; otherwise the size is the product
    /// `OBSNCHAN * NTIME * NPOL * 2 * NBITS / 8` (`PIPERBLK` standing in for
    /// `NTIME`). Never defaults to zero.
    pub fn payload_size(&self) -> Result<usize> {
        if self.contains(keys::BLOCSIZE) {
            return self.size_field(keys::BLOCSIZE);
        }

        let obsnchan = self.size_field(keys::OBSNCHAN)?;
        let ntime = self
            .size_field(keys::NTIME)
            .or_else(|_| self.size_field(keys::PIPERBLK))
            .map_err(|_| Error::MissingSizingFields(keys::NTIME))?;
        let npol = self.size_field(keys::NPOL)?;
        let nbits = self.size_field(keys::NBITS)?;

        let bits = [ntime, npol, 2, nbits]
            .iter()
            .try_fold(obsnchan, |acc, &n| acc.checked_mul(n))
            .ok_or(Error::InvalidValue("payload size overflows"))?;
        Ok(bits.div_ceil(8))
    }

    /// True when `DIRECTIO` is present and set (`T` or a non-zero integer).
    pub fn is_directio(&self) -> bool {
        match self.get(keys::DIRECTIO) {
            Some(Value::Logical(b)) => *b,
            Some(Value::Integer(n)) => *n != 0,
            _ => false,
        }
    }

    pub fn alignment(&self) -> Alignment {
        BlockGeometry::alignment(self)
    }

    /// `(NANTS, OBSNCHAN / NANTS, NTIME, NPOL)`; `NANTS` defaults to 1.
    pub fn block_shape(&self) -> Option<BlockShape> {
        let antennas = usize::try_from(self.nants().unwrap_or(1)).ok()?;
        let obsnchan = usize::try_from(self.obsnchan()?).ok()?;
        if antennas == 0 || obsnchan % antennas != 0 {
            return None;
        }
        Some(BlockShape {
            antennas,
            channels: obsnchan / antennas,
            times: usize::try_from(self.ntime()?).ok()?,
            polarizations: usize::try_from(self.npol()?).ok()?,
        })
    }

    /// Bytes taken by the cards and the END card, before padding.
    pub fn card_bytes_len(&self) -> usize {
        (self.cards.len() + 1) * CARD_SIZE
    }

    /// Bytes the header occupies on disk, including directio padding.
    pub fn header_on_disk_len(&self) -> usize {
        self.alignment().padded_len(self.card_bytes_len())
    }

    /// Bytes the data block occupies on disk, including directio padding.
    pub fn data_on_disk_len(&self) -> Result<usize> {
        Ok(self.alignment().padded_len(self.payload_size()?))
    }

    // ── Writing ──

    /// Serialize the cards, the END card and any directio padding.
    ///
    /// Every card is encoded before the buffer is returned, so a card that
    /// does not fit surfaces as an error without partial output.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.header_on_disk_len());
        for card in &self.cards {
            buf.extend_from_slice(&encode_card(card)?);
        }
        buf.extend_from_slice(&end_card());
        buf.resize(self.header_on_disk_len(), HEADER_PAD_BYTE);
        Ok(buf)
    }

    /// Write the serialized header, returning the number of bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

impl BlockGeometry for RawHeader {
    fn payload_size(&self) -> Result<usize> {
        RawHeader::payload_size(self)
    }

    fn is_directio(&self) -> bool {
        RawHeader::is_directio(self)
    }

    fn block_shape(&self) -> Option<BlockShape> {
        RawHeader::block_shape(self)
    }
}

impl PartialEq for RawHeader {
    /// Mapping equality: same keywords with the same values and comments,
    /// regardless of order.
    fn eq(&self, other: &Self) -> bool {
        self.cards.len() == other.cards.len()
            && self
                .cards
                .iter()
                .all(|c| other.card(c.keyword()) == Some(c))
    }
}

impl FromIterator<Card> for RawHeader {
    fn from_iter<I: IntoIterator<Item = Card>>(iter: I) -> Self {
        let mut header = RawHeader::new();
        for card in iter {
            header.insert(card);
        }
        header
    }
}
