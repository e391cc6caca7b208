//! Descriptor storage behind a byte-addressed interface.
//!
//! The control pipe streams descriptors out one byte at a time, so a
//! store only ever needs random single-byte reads plus region lookups.
//! That keeps the trait implementable over a const array, a generated
//! blob, or an external flash alike.

use usb_device::descriptor::descriptor_type;

#[cfg(feature = "defmt-03")]
use crate::defmt;

/// Span of bytes inside a descriptor store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct Region {
    pub offset: u32,
    pub length: u16,
}

impl Region {
    pub(crate) const EMPTY: Region = Region {
        offset: 0,
        length: 0,
    };
}

/// Byte-addressed descriptor source.
pub trait DescriptorStore {
    /// Read one byte. `offset` always falls inside a region previously
    /// returned by one of the lookups.
    fn read(&self, offset: u32) -> u8;

    /// The device descriptor.
    fn device(&self) -> Region;

    /// Configuration descriptor by index, spanning the full
    /// `wTotalLength` bundle of interface and endpoint descriptors.
    fn configuration(&self, index: u8) -> Option<Region>;

    /// String descriptor by index. Index 0 is the LANGID table.
    fn string(&self, index: u8) -> Option<Region>;
}

/// Descriptor store over one concatenated descriptor blob.
///
/// The blob holds standard descriptors back to back, each led by its
/// `bLength` / `bDescriptorType` header: the device descriptor, then
/// each configuration bundle, then the string descriptors. Lookups scan
/// the headers; a configuration advances the scan by its `wTotalLength`
/// so nested interface and endpoint descriptors never read as
/// top-level entries.
pub struct StaticDescriptors<'a> {
    bytes: &'a [u8],
}

impl<'a> StaticDescriptors<'a> {
    pub const fn new(bytes: &'a [u8]) -> Self {
        StaticDescriptors { bytes }
    }

    fn scan(&self, wanted: u8, mut skip: u8) -> Option<Region> {
        let mut pos = 0usize;
        while pos + 2 <= self.bytes.len() {
            let kind = self.bytes[pos + 1];
            let span = if kind == descriptor_type::CONFIGURATION && pos + 4 <= self.bytes.len() {
                usize::from(u16::from_le_bytes([
                    self.bytes[pos + 2],
                    self.bytes[pos + 3],
                ]))
            } else {
                usize::from(self.bytes[pos])
            };
            // Every descriptor carries at least its own header.
            if span < 2 || pos + span > self.bytes.len() {
                break;
            }
            if kind == wanted {
                if skip == 0 {
                    return Some(Region {
                        offset: pos as u32,
                        length: span as u16,
                    });
                }
                skip -= 1;
            }
            pos += span;
        }
        None
    }
}

impl DescriptorStore for StaticDescriptors<'_> {
    fn read(&self, offset: u32) -> u8 {
        self.bytes.get(offset as usize).copied().unwrap_or(0)
    }

    fn device(&self) -> Region {
        match self.scan(descriptor_type::DEVICE, 0) {
            Some(region) => region,
            None => Region::EMPTY,
        }
    }

    fn configuration(&self, index: u8) -> Option<Region> {
        self.scan(descriptor_type::CONFIGURATION, index)
    }

    fn string(&self, index: u8) -> Option<Region> {
        self.scan(descriptor_type::STRING, index)
    }
}
