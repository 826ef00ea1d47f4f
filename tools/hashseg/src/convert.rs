//! One full conversion: parse, hash, rewrite, patch, write.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hashseg_elf::{ElfImage, ProgramHeader};

use crate::digest::HashAlgo;
use crate::hashtable;
use crate::rewrite::{self, MAX_PHDR_COUNT};

/// A violation of an image-level constraint, as opposed to a malformed
/// ELF or an I/O failure.
#[derive(Debug)]
pub struct ConstraintError(String);

impl fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConstraintError {}

/// Build a constraint error wrapped for `anyhow` propagation.
pub(crate) fn constraint(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(ConstraintError(msg.into()))
}

/// Everything a conversion needs beyond the input path.
#[derive(Debug, Clone)]
pub struct Options {
    /// Where to write the rewritten ELF, if requested.
    pub elf_out: Option<PathBuf>,
    /// Where to write the flat hash-table file, if requested.
    pub hash_out: Option<PathBuf>,
    /// Reserve space for a signature and certificate chain.
    pub secure: bool,
    /// Hard cap on the hash segment size, page aligned.
    pub max_seg_size: Option<u64>,
    /// Override for the hash segment's load address.
    pub seg_addr: Option<u64>,
    /// Digest algorithm for every table entry.
    pub algo: HashAlgo,
    /// Reserve space for an auxiliary header after the table.
    pub append_header: bool,
    /// Certificate-chain capacity used in secure mode.
    pub cert_chain_size: u64,
    /// Hash paged segments as single units instead of per page.
    pub page_as_segment: bool,
}

/// What a completed conversion produced, for reporting.
#[derive(Debug)]
pub struct Summary {
    /// Number of digest slots in the table, reserved entries included.
    pub entries: usize,
    /// Raw table size in bytes.
    pub table_bytes: u64,
    /// Offset shift applied to retained segments.
    pub shift: u64,
    /// Program-header count of the output image.
    pub phnum: u16,
}

/// Run one conversion end to end.
///
/// No output file is written until every constraint has been checked,
/// so a failed run leaves nothing behind.
///
/// # Errors
///
/// Format errors surface as [`hashseg_elf::ElfError`], policy
/// violations as [`ConstraintError`], and filesystem failures as
/// contextualized I/O errors.
pub fn convert(input: &Path, opts: &Options) -> Result<Summary> {
    let data = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let image = ElfImage::parse(&data)?;
    let phdrs: Vec<ProgramHeader> = image.program_headers().collect();

    let Some(hash_out) = opts.hash_out.as_deref() else {
        return fast_convert(&data, &image, &phdrs, opts);
    };

    if opts.elf_out.is_some() && phdrs.len() > MAX_PHDR_COUNT {
        return Err(constraint(format!(
            "input has {} program headers, more than the supported {MAX_PHDR_COUNT}",
            phdrs.len()
        )));
    }

    // The two leading table slots exist to be patched with the digest
    // of the output's header region, which only exists when an ELF is
    // being emitted.
    let reserve = opts.elf_out.is_some();
    let mut table = hashtable::build(&data, &phdrs, opts.algo, opts.page_as_segment, reserve)?;

    let mut summary = Summary {
        entries: table.num_entries(),
        table_bytes: table.len_bytes(),
        shift: 0,
        phnum: image.header().e_phnum,
    };

    if let Some(elf_out) = opts.elf_out.as_deref() {
        let rewritten =
            rewrite::rewrite(&data, image.header(), &phdrs, table.len_bytes(), opts)?;

        // The first reserved slot covers the output's file header and
        // program-header table, both finalized by the rewrite.
        let class = rewritten.header.class();
        let ehdr_size = class.ehdr_size();
        let phoff = usize::try_from(rewritten.header.e_phoff)
            .map_err(|_| constraint("program-header offset not representable"))?;
        let table_size =
            usize::from(rewritten.header.e_phnum) * usize::from(rewritten.header.e_phentsize);

        let mut covered = Vec::with_capacity(ehdr_size + table_size);
        covered.extend_from_slice(&rewritten.elf[..ehdr_size]);
        covered.extend_from_slice(&rewritten.elf[phoff..phoff + table_size]);
        table.patch_first_entry(&opts.algo.hash(&covered));

        fs::write(elf_out, &rewritten.elf)
            .with_context(|| format!("writing {}", elf_out.display()))?;

        summary.shift = rewritten.shift;
        summary.phnum = rewritten.header.e_phnum;
    }

    fs::write(hash_out, table.as_bytes())
        .with_context(|| format!("writing {}", hash_out.display()))?;

    Ok(summary)
}

/// The no-hash route: realign a single-segment image and emit it.
fn fast_convert(
    data: &[u8],
    image: &ElfImage<'_>,
    phdrs: &[ProgramHeader],
    opts: &Options,
) -> Result<Summary> {
    let elf_out = opts
        .elf_out
        .as_deref()
        .ok_or_else(|| constraint("no output requested"))?;
    let out = rewrite::fast_path(data, image.header(), phdrs)?;
    fs::write(elf_out, &out).with_context(|| format!("writing {}", elf_out.display()))?;
    Ok(Summary {
        entries: 0,
        table_bytes: 0,
        shift: 0,
        phnum: image.header().e_phnum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{load_phdr, make_image, options};
    use hashseg_elf::ElfClass;
    use std::path::PathBuf;

    const NONPAGED_RO: u32 = 0x0120_0000;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hashseg-{}-{name}", std::process::id()))
    }

    fn write_input(name: &str, data: &[u8]) -> PathBuf {
        let path = temp_path(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn full_conversion_emits_both_artifacts() {
        let phdrs = [
            load_phdr(NONPAGED_RO, 0x1000, 0x8000_0000, 0x1000),
            load_phdr(NONPAGED_RO, 0x2000, 0x8000_1000, 0x800),
        ];
        let data = make_image(ElfClass::Elf64, &phdrs, 0x3000);
        let input = write_input("full-in.elf", &data);

        let mut opts = options();
        opts.elf_out = Some(temp_path("full-out.elf"));
        opts.hash_out = Some(temp_path("full-out.hash"));
        let summary = convert(&input, &opts).unwrap();

        // Two reserved plus one per non-paged segment.
        assert_eq!(summary.entries, 4);
        assert_eq!(summary.phnum, 4);

        let out = fs::read(opts.elf_out.as_ref().unwrap()).unwrap();
        let table = fs::read(opts.hash_out.as_ref().unwrap()).unwrap();
        assert_eq!(table.len() as u64, summary.table_bytes);

        // Slot 0 holds the digest of the output's header region; slot 1
        // stays zero.
        let parsed = ElfImage::parse(&out).unwrap();
        let ehdr_size = parsed.class().ehdr_size();
        let phoff = parsed.header().e_phoff as usize;
        let region = usize::from(parsed.header().e_phnum)
            * usize::from(parsed.header().e_phentsize);
        let mut covered = out[..ehdr_size].to_vec();
        covered.extend_from_slice(&out[phoff..phoff + region]);
        let digest = opts.algo.hash(&covered);
        assert_eq!(&table[..32], &digest[..]);
        assert!(table[32..64].iter().all(|b| *b == 0));

        // The hash segment's file range stays zero in the output ELF;
        // signing fills it in downstream.
        let seg_off = crate::hashtable::PAGE_SIZE as usize;
        let seg_len = (rewrite::BOOT_IMG_HDR_SIZE as usize) + table.len();
        assert!(out[seg_off..seg_off + seg_len].iter().all(|b| *b == 0));
    }

    #[test]
    fn hash_only_output_skips_reserved_slots() {
        let phdrs = [load_phdr(NONPAGED_RO, 0x1000, 0x8000_0000, 0x1000)];
        let data = make_image(ElfClass::Elf64, &phdrs, 0x2000);
        let input = write_input("hashonly-in.elf", &data);

        let mut opts = options();
        opts.hash_out = Some(temp_path("hashonly-out.hash"));
        let summary = convert(&input, &opts).unwrap();

        assert_eq!(summary.entries, 1);
        assert_eq!(summary.shift, 0);
        let table = fs::read(opts.hash_out.as_ref().unwrap()).unwrap();
        let expected = opts.algo.hash(&data[0x1000..0x2000]);
        assert_eq!(&table[..], &expected[..]);
    }

    #[test]
    fn no_hash_mode_uses_fast_path() {
        let phdrs = [load_phdr(NONPAGED_RO, 0x80, 0x8000_0000, 0x100)];
        let data = make_image(ElfClass::Elf64, &phdrs, 0x200);
        let input = write_input("fast-in.elf", &data);

        let mut opts = options();
        opts.elf_out = Some(temp_path("fast-out.elf"));
        let summary = convert(&input, &opts).unwrap();
        assert_eq!(summary.entries, 0);

        let out = fs::read(opts.elf_out.as_ref().unwrap()).unwrap();
        let parsed = ElfImage::parse(&out).unwrap();
        let phdr = parsed.program_headers().next().unwrap();
        assert_eq!(phdr.p_offset, crate::hashtable::PAGE_SIZE);
    }

    #[test]
    fn no_output_requested_rejected() {
        let phdrs = [load_phdr(NONPAGED_RO, 0x80, 0x8000_0000, 0x100)];
        let data = make_image(ElfClass::Elf64, &phdrs, 0x200);
        let input = write_input("noout-in.elf", &data);

        let err = convert(&input, &options()).unwrap_err();
        assert!(err.downcast_ref::<ConstraintError>().is_some());
    }

    #[test]
    fn failed_run_writes_no_files() {
        let phdrs = [load_phdr(NONPAGED_RO, 0x1000, 0x8000_0000, 0x1000)];
        let data = make_image(ElfClass::Elf64, &phdrs, 0x2000);
        let input = write_input("capfail-in.elf", &data);

        let mut opts = options();
        opts.elf_out = Some(temp_path("capfail-out.elf"));
        opts.hash_out = Some(temp_path("capfail-out.hash"));
        opts.max_seg_size = Some(0);
        let err = convert(&input, &opts).unwrap_err();
        assert!(err.downcast_ref::<ConstraintError>().is_some());
        assert!(!opts.elf_out.as_ref().unwrap().exists());
        assert!(!opts.hash_out.as_ref().unwrap().exists());
    }

    #[test]
    fn too_many_program_headers_rejected() {
        let phdrs: Vec<_> = (0..=MAX_PHDR_COUNT)
            .map(|i| load_phdr(NONPAGED_RO, 0x8000, 0x8000_0000 + i as u64 * 0x10, 0))
            .collect();
        let data = make_image(ElfClass::Elf64, &phdrs, 0x9000);
        let input = write_input("manyphdr-in.elf", &data);

        let mut opts = options();
        opts.elf_out = Some(temp_path("manyphdr-out.elf"));
        opts.hash_out = Some(temp_path("manyphdr-out.hash"));
        let err = convert(&input, &opts).unwrap_err();
        assert!(err.downcast_ref::<ConstraintError>().is_some());
        assert!(!opts.elf_out.as_ref().unwrap().exists());
    }

    #[test]
    fn truncated_input_surfaces_format_error() {
        let input = write_input("trunc-in.elf", &[0x7f, b'E', b'L', b'F']);
        let mut opts = options();
        opts.hash_out = Some(temp_path("trunc-out.hash"));
        let err = convert(&input, &opts).unwrap_err();
        assert!(err.downcast_ref::<hashseg_elf::ElfError>().is_some());
    }
}
