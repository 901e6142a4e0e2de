//! Reading and writing GUPPI RAW files: fixed-width ASCII header blocks
//! followed by raw data blocks, optionally spread over several files.

pub mod block;
pub mod card;
pub mod error;
pub mod framer;
pub mod handler;
pub mod header;
pub mod samples;
pub mod stream;
pub mod value;
pub mod variant;

pub use block::{Alignment, CARD_SIZE, DIRECTIO_ALIGNMENT};
pub use card::Card;
pub use error::{Error, Result};
pub use framer::{BlockReader, BlockWriter, DataBlock, DataRegion, ReaderConfig, WriterConfig};
pub use handler::{write_to_file, GuppiHandler, OpenMode};
pub use header::{BlockGeometry, BlockShape, RawHeader};
pub use stream::{LazyFile, MultiFileStream, StreamPosition};
pub use value::Value;
pub use variant::{GenericHeader, HeaderVariant, ResolveVariant, VariantRegistry};
