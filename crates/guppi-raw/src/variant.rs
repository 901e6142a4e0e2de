//! Telescope-specific header variants, chosen by a lookup on `TELESCOP`.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::block::Alignment;
use crate::error::Result;
use crate::header::{BlockGeometry, BlockShape, RawHeader};

/// A header wrapped with the semantics of a particular telescope.
///
/// Variants own the generic [`RawHeader`] and layer typed accessors on top;
/// framing only ever needs the geometry exposed by the inner header.
pub trait HeaderVariant: fmt::Debug {
    /// Short name of the variant, e.g. `"generic"`.
    fn name(&self) -> &str;

    fn header(&self) -> &RawHeader;

    fn into_header(self: Box<Self>) -> RawHeader;

    fn telescope(&self) -> Option<&str> {
        self.header().telescope()
    }
}

impl BlockGeometry for dyn HeaderVariant {
    fn payload_size(&self) -> Result<usize> {
        self.header().payload_size()
    }

    fn is_directio(&self) -> bool {
        self.header().is_directio()
    }

    fn block_shape(&self) -> Option<BlockShape> {
        self.header().block_shape()
    }

    fn alignment(&self) -> Alignment {
        self.header().alignment()
    }
}

/// Builds a variant from a parsed header.
pub type VariantConstructor = fn(RawHeader) -> Box<dyn HeaderVariant>;

/// Maps a parsed header to its concrete variant. Must never fail: unknown
/// telescopes get a generic variant.
pub trait ResolveVariant {
    fn resolve(&self, header: RawHeader) -> Box<dyn HeaderVariant>;
}

impl<F> ResolveVariant for F
where
    F: Fn(RawHeader) -> Box<dyn HeaderVariant>,
{
    fn resolve(&self, header: RawHeader) -> Box<dyn HeaderVariant> {
        self(header)
    }
}

/// The fallback variant: the header with no telescope-specific additions.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericHeader {
    header: RawHeader,
}

impl GenericHeader {
    pub fn new(header: RawHeader) -> Self {
        GenericHeader { header }
    }

    pub fn boxed(header: RawHeader) -> Box<dyn HeaderVariant> {
        Box::new(GenericHeader::new(header))
    }
}

impl HeaderVariant for GenericHeader {
    fn name(&self) -> &str {
        "generic"
    }

    fn header(&self) -> &RawHeader {
        &self.header
    }

    fn into_header(self: Box<Self>) -> RawHeader {
        self.header
    }
}

/// Lookup table from `TELESCOP` value to variant constructor.
///
/// Telescope names are matched case-insensitively after trimming.
#[derive(Clone)]
pub struct VariantRegistry {
    constructors: HashMap<String, VariantConstructor>,
    fallback: VariantConstructor,
}

impl Default for VariantRegistry {
    fn default() -> Self {
        VariantRegistry {
            constructors: HashMap::new(),
            fallback: GenericHeader::boxed,
        }
    }
}

impl fmt::Debug for VariantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut telescopes: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        telescopes.sort_unstable();
        f.debug_struct("VariantRegistry")
            .field("telescopes", &telescopes)
            .finish()
    }
}

fn normalize(telescope: &str) -> String {
    telescope.trim().to_ascii_uppercase()
}

impl VariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constructor` for headers whose `TELESCOP` equals `telescope`.
    pub fn register(&mut self, telescope: &str, constructor: VariantConstructor) -> &mut Self {
        self.constructors.insert(normalize(telescope), constructor);
        self
    }

    /// Builder form of [`VariantRegistry::register`].
    pub fn with(mut self, telescope: &str, constructor: VariantConstructor) -> Self {
        self.register(telescope, constructor);
        self
    }

    /// Replace the constructor used for unknown or missing telescopes.
    pub fn with_fallback(mut self, constructor: VariantConstructor) -> Self {
        self.fallback = constructor;
        self
    }

    /// The constructor for `telescope`, or the fallback.
    pub fn constructor_for(&self, telescope: Option<&str>) -> VariantConstructor {
        telescope
            .and_then(|t| self.constructors.get(&normalize(t)))
            .copied()
            .unwrap_or(self.fallback)
    }

    pub fn is_registered(&self, telescope: &str) -> bool {
        self.constructors.contains_key(&normalize(telescope))
    }
}

impl ResolveVariant for VariantRegistry {
    fn resolve(&self, header: RawHeader) -> Box<dyn HeaderVariant> {
        if let Some(telescope) = header.telescope() {
            if !self.is_registered(telescope) {
                debug!(telescope, "no variant registered, using fallback");
            }
        }
        let constructor = self.constructor_for(header.telescope());
        constructor(header)
    }
}
