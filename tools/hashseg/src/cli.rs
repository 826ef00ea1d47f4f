//! Command-line interface definitions for hashseg.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Secure-boot hash segment generator for ELF boot images.
#[derive(Debug, Parser)]
#[command(name = "hashseg", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a hash segment for an ELF boot image.
    Gen(GenArgs),
    /// Wrap a raw binary image into a single-segment ELF.
    Wrap(WrapArgs),
}

/// Arguments for the `gen` subcommand.
#[derive(Debug, Args)]
#[command(group = clap::ArgGroup::new("output").required(true).multiple(true).args(["elf_out", "hash_out"]))]
pub struct GenArgs {
    /// Input ELF image.
    pub input: PathBuf,

    /// Write the rewritten ELF with the hash segment inserted.
    #[arg(long, short = 'o')]
    pub elf_out: Option<PathBuf>,

    /// Write the flat hash-table file.
    #[arg(long, short = 't')]
    pub hash_out: Option<PathBuf>,

    /// Reserve signature and certificate-chain space in the segment.
    #[arg(long)]
    pub secure: bool,

    /// Use SHA-1 digests instead of SHA-256.
    #[arg(long)]
    pub sha1: bool,

    /// Page-aligned cap on the hash segment size.
    #[arg(long, value_parser = parse_u64)]
    pub max_seg_size: Option<u64>,

    /// Override the hash segment's load address.
    #[arg(long, value_parser = parse_u64)]
    pub seg_addr: Option<u64>,

    /// Reserve space for an auxiliary header after the table.
    #[arg(long)]
    pub append_header: bool,

    /// Certificate-chain capacity in bytes for secure mode.
    #[arg(long, value_parser = parse_u64)]
    pub cert_chain_size: Option<u64>,

    /// Hash each paged segment as one unit instead of per page.
    #[arg(long)]
    pub page_as_segment: bool,
}

/// Arguments for the `wrap` subcommand.
#[derive(Debug, Args)]
pub struct WrapArgs {
    /// Input raw binary image.
    pub input: PathBuf,

    /// Output ELF path.
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Load and entry address for the image.
    #[arg(long, value_parser = parse_u64)]
    pub image_dest: u64,

    /// Emit a 64-bit ELF instead of the default 32-bit.
    #[arg(long)]
    pub elf64: bool,
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer.
fn parse_u64(arg: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        arg.parse()
    };
    parsed.map_err(|_| format!("invalid integer: {arg}"))
}
