//! Offset-shift rewriting: making room for the hash segment.
//!
//! The rewriter inserts two program headers (a placeholder spanning the
//! file header plus the program-header table, and the hash segment) and
//! shifts every retained segment's file offset forward by one global
//! amount so nothing overlaps the hash segment's file range. Virtual and
//! physical addresses never change; only file positions do.

use anyhow::Result;
use hashseg_elf::{ElfClass, ElfHeader, PT_NULL, PT_PHDR, ProgramHeader};

use crate::convert::{Options, constraint};
use crate::flags::{HASH_SEGMENT_FLAGS, PHDR_SEGMENT_FLAGS};
use crate::hashtable::PAGE_SIZE;

/// Maximum allowable program headers in the input image.
pub const MAX_PHDR_COUNT: usize = 100;

/// Size of the boot-image header that precedes the hash table inside
/// the hash segment.
pub const BOOT_IMG_HDR_SIZE: u64 = 40;

/// Size of the signature field reserved in secure mode.
pub const SHA256_SIGNATURE_SIZE: u64 = 256;

/// Default certificate-chain capacity for one root cert.
pub const CERT_CHAIN_ONEROOT_MAXSIZE: u64 = 6 * 1024;

/// Capacity reserved for the optional auxiliary header.
pub const AUX_HDR_MAXSIZE: u64 = 2048;

/// Placement of the hash segment inside the output file.
#[derive(Debug)]
pub struct HashSegment {
    /// The synthesized program header describing the segment.
    pub phdr: ProgramHeader,
    /// Distance of the table end above the last page boundary.
    pub pad: u64,
    /// File offset one past the end of the table.
    pub end_offset: u64,
    /// File offset of the hash table itself (past the boot-image header).
    pub table_offset: u64,
}

/// A rewritten image, ready for the reserved-slot patch.
#[derive(Debug)]
pub struct Rewritten {
    /// The output ELF byte stream.
    pub elf: Vec<u8>,
    /// The uniform offset increment applied to every retained segment.
    pub shift: u64,
    /// The final file header (already encoded into `elf`).
    pub header: ElfHeader,
}

/// Size and place the hash segment for an image.
///
/// The segment's load address is the end of the highest-physical-address
/// input segment rounded up to the next page boundary (an already
/// aligned end stays put), so the verifier maps it beyond everything
/// else. Its file offset is fixed at one page, with the table itself
/// landing after the boot-image header slot.
///
/// # Errors
///
/// Fails if the image has no program headers to place the segment
/// after, or if its address range overflows.
pub fn place_hash_segment(phdrs: &[ProgramHeader], seg_size: u64) -> Result<HashSegment> {
    let last = phdrs
        .iter()
        .max_by_key(|phdr| phdr.p_paddr)
        .ok_or_else(|| constraint("input image has no program headers"))?;

    let image_end = last
        .p_paddr
        .checked_add(last.p_memsz)
        .ok_or_else(|| constraint("segment address range overflows"))?;
    let addr = image_end
        .checked_sub(1)
        .and_then(|end| (end & !(PAGE_SIZE - 1)).checked_add(PAGE_SIZE))
        .ok_or_else(|| constraint("no room to place a hash segment past the image end"))?;

    let seg_offset = PAGE_SIZE;
    let table_offset = seg_offset + BOOT_IMG_HDR_SIZE;
    let end_offset = table_offset + seg_size;

    Ok(HashSegment {
        phdr: ProgramHeader {
            p_type: PT_NULL,
            p_flags: HASH_SEGMENT_FLAGS,
            p_offset: seg_offset,
            p_vaddr: addr,
            p_paddr: addr,
            p_filesz: seg_size + BOOT_IMG_HDR_SIZE,
            p_memsz: seg_size + BOOT_IMG_HDR_SIZE,
            p_align: PAGE_SIZE,
        },
        pad: end_offset & (PAGE_SIZE - 1),
        end_offset,
        table_offset,
    })
}

/// Check that a value is representable as a file offset for the width.
fn fits_class(value: u64, class: ElfClass, what: &str) -> Result<()> {
    if class == ElfClass::Elf32 && value > u64::from(u32::MAX) {
        return Err(constraint(format!(
            "{what} {value:#x} is not representable in a 32-bit image"
        )));
    }
    Ok(())
}

/// Copy `bytes` into `out` at `offset`, growing the buffer as needed.
fn copy_into(out: &mut Vec<u8>, offset: u64, bytes: &[u8]) -> Result<()> {
    let start = usize::try_from(offset)
        .map_err(|_| constraint(format!("output offset {offset:#x} not representable")))?;
    let end = start + bytes.len();
    if out.len() < end {
        out.resize(end, 0);
    }
    out[start..end].copy_from_slice(bytes);
    Ok(())
}

/// Slice `len` bytes of input at `offset`, bounds-checked.
fn input_range(data: &[u8], offset: u64, len: u64) -> Result<&[u8]> {
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

/// Rewrite the image around the synthesized hash segment.
///
/// `table_len` is the raw hash-table size in bytes; secure-mode and
/// auxiliary-header overheads are added here before the segment is
/// sized. The returned buffer has the final header and program-header
/// table already encoded, so the caller can hash those bytes and patch
/// the first reserved table slot.
///
/// # Errors
///
/// Fails with a constraint error on a cap violation, a misaligned cap,
/// or offsets that stop being representable for the image's width.
pub fn rewrite(
    data: &[u8],
    header: &ElfHeader,
    phdrs: &[ProgramHeader],
    table_len: u64,
    opts: &Options,
) -> Result<Rewritten> {
    let class = header.class();

    // Preempt the table size for trust-chain artifacts that share the
    // hash segment.
    let mut seg_size = table_len;
    if opts.secure {
        seg_size += SHA256_SIGNATURE_SIZE + opts.cert_chain_size;
    }
    if opts.append_header {
        seg_size += AUX_HDR_MAXSIZE;
    }

    let mut placement = place_hash_segment(phdrs, seg_size)?;

    if let Some(max) = opts.max_seg_size {
        if seg_size > max {
            return Err(constraint(format!(
                "hash table exceeds maximum hash segment size {max:#x}"
            )));
        }
        if max & (PAGE_SIZE - 1) != 0 {
            return Err(constraint(format!(
                "maximum hash segment size {max:#x} is not page aligned"
            )));
        }
    }
    if let Some(addr) = opts.seg_addr {
        placement.phdr.p_vaddr = addr;
        placement.phdr.p_paddr = addr;
    }
    if let Some(max) = opts.max_seg_size {
        placement.phdr.p_memsz = max;
    }

    // End of the hash segment's file range, padded to the next page
    // boundary; no retained segment may start below this.
    let bytes_to_pad = PAGE_SIZE - placement.pad;
    let hash_seg_end = placement.end_offset + bytes_to_pad;

    let min_offset = phdrs
        .iter()
        .filter(|phdr| phdr.p_type != PT_PHDR)
        .map(|phdr| phdr.p_offset)
        .fold(hash_seg_end, u64::min);
    let shift = hash_seg_end - min_offset;

    let retained = phdrs.iter().filter(|phdr| phdr.p_type != PT_PHDR).count();
    let phnum = u16::try_from(retained + 2)
        .map_err(|_| constraint("program header count overflows the header field"))?;

    let ehdr_size = class.ehdr_size() as u64;
    let phdr_size = u64::from(header.e_phentsize);

    let mut out_header = header.clone();
    out_header.e_phnum = phnum;
    out_header.e_phoff = ehdr_size;
    // No section headers are ever emitted.
    out_header.e_shoff = 0;
    out_header.e_shnum = 0;
    out_header.e_shstrndx = 0;

    let mut out = Vec::new();

    // Relocate segment payloads: positions move by the global shift,
    // sizes never change.
    for phdr in phdrs {
        if phdr.p_type == PT_PHDR {
            continue;
        }
        let dst = phdr.p_offset + shift;
        fits_class(dst, class, "shifted segment offset")?;
        copy_into(&mut out, dst, input_range(data, phdr.p_offset, phdr.p_filesz)?)?;
    }

    // The placeholder spans the file header plus the full table.
    let placeholder = ProgramHeader {
        p_type: PT_NULL,
        p_flags: PHDR_SEGMENT_FLAGS,
        p_filesz: ehdr_size + u64::from(phnum) * phdr_size,
        ..ProgramHeader::default()
    };

    fits_class(placement.phdr.p_offset, class, "hash segment offset")?;
    fits_class(placement.phdr.p_vaddr, class, "hash segment address")?;
    fits_class(placement.phdr.p_filesz, class, "hash segment file size")?;
    fits_class(placement.phdr.p_memsz, class, "hash segment memory size")?;

    let mut entry = vec![0u8; class.phdr_size()];
    let mut pos = ehdr_size;

    placeholder.encode(&mut entry, class);
    copy_into(&mut out, pos, &entry)?;
    pos += phdr_size;

    placement.phdr.encode(&mut entry, class);
    copy_into(&mut out, pos, &entry)?;
    pos += phdr_size;

    for phdr in phdrs {
        if phdr.p_type == PT_PHDR {
            continue;
        }
        let mut shifted = *phdr;
        shifted.p_offset += shift;
        shifted.encode(&mut entry, class);
        copy_into(&mut out, pos, &entry)?;
        pos += phdr_size;
    }

    // The header goes in last: only now are e_phnum and e_phoff final.
    let mut ehdr_bytes = vec![0u8; class.ehdr_size()];
    out_header.encode(&mut ehdr_bytes);
    copy_into(&mut out, 0, &ehdr_bytes)?;

    Ok(Rewritten {
        elf: out,
        shift,
        header: out_header,
    })
}

/// Reduced rewrite for single-segment images when no hash table is
/// requested: realign the one segment and copy it out.
///
/// Offsets already at or above one page are left untouched; size
/// alignment is deliberately not re-checked here (only the hashing path
/// validates it).
///
/// # Errors
///
/// Fails with a constraint error if the image has more than one program
/// header.
pub fn fast_path(data: &[u8], header: &ElfHeader, phdrs: &[ProgramHeader]) -> Result<Vec<u8>> {
    if phdrs.len() != 1 {
        return Err(constraint(format!(
            "no-hash mode supports exactly one program header, found {}",
            phdrs.len()
        )));
    }
    let class = header.class();
    let mut phdr = phdrs[0];
    let src_offset = phdr.p_offset;

    if src_offset < PAGE_SIZE {
        phdr.p_offset = PAGE_SIZE;
    }

    let mut out = Vec::new();

    let mut ehdr_bytes = vec![0u8; class.ehdr_size()];
    header.encode(&mut ehdr_bytes);
    copy_into(&mut out, 0, &ehdr_bytes)?;

    let mut entry = vec![0u8; class.phdr_size()];
    phdr.encode(&mut entry, class);
    copy_into(&mut out, u64::from(header.e_ehsize), &entry)?;

    copy_into(
        &mut out,
        phdr.p_offset,
        input_range(data, src_offset, phdr.p_filesz)?,
    )?;

    Ok(out)
}
