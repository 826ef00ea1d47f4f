//! Hash table synthesis over the loadable segments of an image.
//!
//! Walks the program-header table in order and emits one fixed-size
//! digest entry per hashed unit: per page-sized block for paged
//! segments (or one per segment in whole-segment mode), one per
//! non-paged segment. The entry order must match exactly what the
//! boot-time verifier recomputes from the rewritten image, independent
//! of the offset shift applied later.

use anyhow::Result;
use hashseg_elf::{PT_PHDR, ProgramHeader};

use crate::convert::constraint;
use crate::digest::HashAlgo;
use crate::flags::{self, PageMode};

/// Block size governing all size and offset rounding.
pub const PAGE_SIZE: u64 = 0x1000;

/// The synthesized hash table: a flat sequence of fixed-length digests.
#[derive(Debug)]
pub struct HashTable {
    data: Vec<u8>,
    digest_len: usize,
}

impl HashTable {
    /// Creates an empty table for the given algorithm.
    #[must_use]
    pub fn new(algo: HashAlgo) -> Self {
        Self {
            data: Vec::new(),
            digest_len: algo.digest_len(),
        }
    }

    /// Appends one digest entry.
    ///
    /// # Panics
    ///
    /// Panics if the digest length does not match the table's algorithm.
    pub fn push(&mut self, digest: &[u8]) {
        assert_eq!(digest.len(), self.digest_len);
        self.data.extend_from_slice(digest);
    }

    /// Appends one all-zero entry (non-hashable or placeholder slot).
    pub fn push_zero(&mut self) {
        self.data.resize(self.data.len() + self.digest_len, 0);
    }

    /// Total table size in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Number of digest entries.
    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.data.len() / self.digest_len
    }

    /// Overwrites the first (reserved) entry once the final header bytes
    /// are known. The second reserved entry stays zero: the hash segment
    /// does not hash itself.
    ///
    /// # Panics
    ///
    /// Panics if the table is empty or the digest length mismatches.
    pub fn patch_first_entry(&mut self, digest: &[u8]) {
        assert_eq!(digest.len(), self.digest_len);
        assert!(self.data.len() >= self.digest_len);
        self.data[..self.digest_len].copy_from_slice(digest);
    }

    /// The flat digest byte stream.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Slice `len` bytes of segment payload at `offset`, bounds-checked.
fn payload(data: &[u8], offset: u64, len: u64) -> Result<&[u8]> {
    let start = usize::try_from(offset)
        .map_err(|_| constraint(format!("segment offset {offset:#x} not representable")))?;
    let len = usize::try_from(len)
        .map_err(|_| constraint(format!("segment size {len:#x} not representable")))?;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            constraint(format!(
                "segment range {offset:#x}+{len:#x} extends past end of input"
            ))
        })?;
    Ok(&data[start..end])
}

/// Synthesize the hash table for `phdrs` over the raw input bytes.
///
/// When `reserve_header_entries` is set (an output ELF is also being
/// produced), two zero entries are prepended: one for the synthesized
/// program-header placeholder segment — patched later from the final
/// header bytes — and one for the hash segment itself.
///
/// # Errors
///
/// Fails with a constraint error if a paged segment's corrected size is
/// not a page multiple, or if any segment range is not representable.
pub fn build(
    data: &[u8],
    phdrs: &[ProgramHeader],
    algo: HashAlgo,
    page_as_segment: bool,
    reserve_header_entries: bool,
) -> Result<HashTable> {
    let mut table = HashTable::new(algo);

    if reserve_header_entries {
        table.push_zero();
        table.push_zero();
    }

    for phdr in phdrs {
        let hashable = flags::is_hashable(phdr.p_flags);
        match flags::decode(phdr.p_flags).page_mode {
            PageMode::Paged => {
                let mut seg_offset = phdr.p_offset;
                let mut seg_size = phdr.p_filesz;

                // Fold a misaligned virtual address back onto a page
                // boundary before hashing begins.
                let misalign = phdr.p_vaddr & (PAGE_SIZE - 1);
                if misalign != 0 {
                    let correction = PAGE_SIZE - misalign;
                    seg_size = seg_size.checked_sub(correction).ok_or_else(|| {
                        constraint(format!(
                            "paged segment of {:#x} bytes too small for alignment correction",
                            phdr.p_filesz
                        ))
                    })?;
                    seg_offset += correction;
                }

                if seg_size & (PAGE_SIZE - 1) != 0 {
                    return Err(constraint(format!(
                        "paged segment size {seg_size:#x} is not page aligned"
                    )));
                }

                let end = seg_offset + seg_size;
                if page_as_segment {
                    // One entry covering the whole corrected range.
                    if hashable {
                        table.push(&algo.hash(payload(data, seg_offset, seg_size)?));
                    } else {
                        table.push_zero();
                    }
                } else {
                    // One entry per block, first block shortened when the
                    // corrected offset is still below one page.
                    while seg_offset < end {
                        let block = if seg_offset < PAGE_SIZE {
                            seg_offset
                        } else {
                            PAGE_SIZE
                        };
                        if hashable {
                            table.push(&algo.hash(payload(data, seg_offset, block)?));
                        } else {
                            table.push_zero();
                        }
                        seg_offset += PAGE_SIZE;
                    }
                }
            }
            PageMode::NonPaged => {
                // The program-header segment is covered by the reserved
                // leading entry, never hashed directly.
                if phdr.p_type == PT_PHDR {
                    continue;
                }
                if hashable && phdr.p_filesz > 0 {
                    table.push(&algo.hash(payload(data, phdr.p_offset, phdr.p_filesz)?));
                } else {
                    table.push_zero();
                }
            }
        }
    }

    Ok(table)
}
