//! Decoder for the tool-specific bit-field in `p_flags`.
//!
//! Bits 20–27 of the program-header flags word are unused by the base
//! ELF format; secure-boot images pack a segment classification there:
//!
//! ```text
//!                  pool idx   segment type   access type   page mode
//! bits in p_flags /---27----/-----26-24----/----23-21----/----20----/
//! ```
//!
//! The hashing logic only ever consults the structured [`SegmentFlags`]
//! value produced here; raw mask arithmetic stays in this module.

/// Mask covering the whole tool-specific bit-field (bits 20–27).
pub const FLAGS_FIELD_MASK: u32 = 0x0FF0_0000;

const SEGMENT_TYPE_MASK: u32 = 0x0700_0000;
const SEGMENT_TYPE_SHIFT: u32 = 24;
const PAGE_MODE_MASK: u32 = 0x0010_0000;
const PAGE_MODE_SHIFT: u32 = 20;
const ACCESS_TYPE_MASK: u32 = 0x00E0_0000;
const ACCESS_TYPE_SHIFT: u32 = 21;
const POOL_INDEX_MASK: u32 = 0x0800_0000;
const POOL_INDEX_SHIFT: u32 = 27;

/// Flags word for the synthesized hash segment (hash type, non-paged, ZI-free).
pub const HASH_SEGMENT_FLAGS: u32 = 0x0220_0000;

/// Flags word for the synthesized program-header placeholder segment.
pub const PHDR_SEGMENT_FLAGS: u32 = 0x0700_0000;

/// Flags word for a read-write-execute segment, used when wrapping a raw image.
pub const RWE_SEGMENT_FLAGS: u32 = 0x7;

/// Segment classification (bits 24–26).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    /// Microkernel segment.
    L4,
    /// Application image segment.
    Amss,
    /// The hash-table segment itself.
    Hash,
    /// Boot segment.
    Boot,
    /// Microkernel bootstrap segment.
    L4Bsp,
    /// Swapped segment.
    Swapped,
    /// Swap-pool segment.
    SwapPool,
    /// Program-header placeholder segment.
    Phdr,
}

impl SegmentType {
    fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::L4,
            1 => Self::Amss,
            2 => Self::Hash,
            3 => Self::Boot,
            4 => Self::L4Bsp,
            5 => Self::Swapped,
            6 => Self::SwapPool,
            _ => Self::Phdr,
        }
    }
}

/// Access classification (bits 21–23).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Read-write.
    Rw,
    /// Read-only.
    Ro,
    /// Zero-initialized.
    Zi,
    /// Not used by the image.
    NotUsed,
    /// Shared with other images.
    Shared,
    /// Read-write-execute.
    Rwe,
    /// A value with no assigned meaning.
    Other(u8),
}

impl AccessType {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "masked to three bits before the cast"
    )]
    fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::Rw,
            1 => Self::Ro,
            2 => Self::Zi,
            3 => Self::NotUsed,
            4 => Self::Shared,
            7 => Self::Rwe,
            other => Self::Other(other as u8),
        }
    }
}

/// Paging classification (bit 20).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// Hashed as one unit.
    NonPaged,
    /// Demand-paged; hashed in page-sized blocks.
    Paged,
}

/// Structured view of the tool-specific flag bits of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentFlags {
    /// Segment classification.
    pub segment_type: SegmentType,
    /// Access classification.
    pub access_type: AccessType,
    /// Paging classification.
    pub page_mode: PageMode,
    /// Swap-pool index (bit 27).
    pub pool_index: u8,
}

/// Decode the tool-specific bit-field of a raw flags word.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "pool index is a single bit"
)]
pub fn decode(p_flags: u32) -> SegmentFlags {
    SegmentFlags {
        segment_type: SegmentType::from_bits((p_flags & SEGMENT_TYPE_MASK) >> SEGMENT_TYPE_SHIFT),
        access_type: AccessType::from_bits((p_flags & ACCESS_TYPE_MASK) >> ACCESS_TYPE_SHIFT),
        page_mode: if (p_flags & PAGE_MODE_MASK) >> PAGE_MODE_SHIFT == 0 {
            PageMode::NonPaged
        } else {
            PageMode::Paged
        },
        pool_index: ((p_flags & POOL_INDEX_MASK) >> POOL_INDEX_SHIFT) as u8,
    }
}

/// Whether a segment's contents participate in the hash table.
///
/// The hash segment never hashes itself, and not-used / shared segments
/// carry zero digests so the verifier skips them.
#[must_use]
pub fn is_hashable(p_flags: u32) -> bool {
    let flags = decode(p_flags);
    flags.segment_type != SegmentType::Hash
        && flags.access_type != AccessType::NotUsed
        && flags.access_type != AccessType::Shared
}
