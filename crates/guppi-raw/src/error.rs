/// All errors that can occur while framing GUPPI RAW blocks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An 80-byte card could not be tokenized.
    #[error("malformed header card: {reason}")]
    MalformedCard { reason: &'static str },

    /// A rendered card field does not fit its fixed width.
    #[error("{field} too long ({len} bytes, max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A keyword contains characters that cannot appear in a card.
    #[error("invalid keyword name: {0:?}")]
    InvalidKeyword(String),

    /// A value cannot be rendered into a card.
    #[error("invalid header value: {0}")]
    InvalidValue(&'static str),

    /// The stream ended before the END card.
    #[error("header truncated after {cards_read} cards")]
    TruncatedHeader { cards_read: usize },

    /// The header exceeded the configured card ceiling without an END card.
    #[error("header exceeds {max_cards} cards without END")]
    HeaderTooLong { max_cards: usize },

    /// The header lacks the keywords needed to size the data block.
    #[error("missing sizing keyword: {0}")]
    MissingSizingFields(&'static str),

    /// Fewer bytes remain in the file set than a block requires.
    #[error("end of file set: needed {needed} bytes, {available} available")]
    EndOfSet { needed: usize, available: usize },

    /// A stream was constructed without any file handles.
    #[error("empty file set")]
    EmptyFileSet,

    /// The data handed to the writer disagrees with the header's payload size.
    #[error("payload size mismatch: header declares {declared} bytes, got {actual}")]
    PayloadSizeMismatch { declared: usize, actual: usize },

    /// Writing the block would exceed the output size limit.
    #[error("size limit exceeded: block needs {needed} bytes, {remaining} remaining")]
    CapacityExceeded { needed: u64, remaining: u64 },

    /// A block's shape differs from the first block of the set.
    #[error("block shape changed at block #{block_index}")]
    BlockShapeChanged { block_index: usize },

    /// Sample unpacking is not implemented for this bit depth.
    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(i64),

    /// An I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
