//! `mkfs.reiserfs`: creates a ReiserFS v3 filesystem on a device.
//!
//! Grounded on the teacher's `mkfs/src/main.rs` probe-then-create flow: parse
//! a flat argument list, probe the device for an existing filesystem, prompt
//! unless `-q` was given, then hand off to the library's `create`.

use std::env;
use std::path::PathBuf;
use std::process::exit;

use reiserfs::device::FileDevice;
use reiserfs::Device;
use reiserfs::fs::CreateParams;
use reiserfs::fs::Filesystem;
use reiserfs::fs::JournalCreateParams;
use reiserfs::gauge::NullGauge;
use reiserfs::hashes::HashKind;
use reiserfs::journal::JOURNAL_MIN_SIZE;
use reiserfs::journal::JOURNAL_TRANS_MIN;
use reiserfs::super_block::SuperBlock;
use reiserfs::super_block::DEFAULT_BLOCK_SIZE;
use reiserfs::super_block::FS_FORMAT_3_5;
use reiserfs::super_block::FS_FORMAT_3_6;
use utils::error;
use utils::prompt::prompt;
use utils::size::parse_size;
use utils::util::ByteSize;

const BIN: &str = "mkfs.reiserfs";
const USAGE_ERR: i32 = 0xfe;
const RUNTIME_ERR: i32 = 0xff;

struct Args {
    block_size: u32,
    format: u16,
    hash: HashKind,
    journal_dev: Option<PathBuf>,
    journal_len: u64,
    journal_offset: Option<u64>,
    max_trans: u32,
    label: [u8; 16],
    uuid: [u8; 16],
    quiet: bool,
    device: Option<PathBuf>,
    size_bytes: Option<u64>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            format: FS_FORMAT_3_6,
            hash: HashKind::R5,
            journal_dev: None,
            journal_len: JOURNAL_MIN_SIZE,
            journal_offset: None,
            max_trans: JOURNAL_TRANS_MIN,
            label: [0; 16],
            uuid: [0; 16],
            quiet: false,
            device: None,
            size_bytes: None,
        }
    }
}

fn copy_str(dst: &mut [u8; 16], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(16);
    dst[..n].copy_from_slice(&bytes[..n]);
    for b in dst[n..].iter_mut() {
        *b = 0;
    }
}

fn parse_args() -> Args {
    let mut res = Args::default();
    let mut positional = Vec::new();
    let mut args = env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-b" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-b requires a block size"));
                res.block_size = v.parse().unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid block size"));
            }
            "-f" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-f requires a format"));
                res.format = match v.as_str() {
                    "3.5" => FS_FORMAT_3_5,
                    "3.6" => FS_FORMAT_3_6,
                    _ => error(BIN, USAGE_ERR, format!("unknown format `{v}`")),
                };
            }
            "-h" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-h requires a hash name"));
                res.hash = HashKind::from_name(&v).unwrap_or_else(|| error(BIN, USAGE_ERR, format!("unknown hash `{v}`")));
            }
            "-j" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-j requires a device path"));
                res.journal_dev = Some(PathBuf::from(v));
            }
            "-s" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-s requires a journal length"));
                res.journal_len = parse_size(&v).unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid journal length")).bytes
                    / res.block_size as u64;
            }
            "-o" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-o requires a journal offset"));
                res.journal_offset =
                    Some(v.parse().unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid journal offset")));
            }
            "-t" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-t requires a transaction max"));
                res.max_trans = v.parse().unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid max-trans"));
            }
            "-l" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-l requires a label"));
                copy_str(&mut res.label, &v);
            }
            "-i" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-i requires a uuid"));
                let parsed = uuid::Uuid::parse_str(&v).unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid uuid"));
                res.uuid = *parsed.as_bytes();
            }
            "-q" => res.quiet = true,
            _ => positional.push(arg),
        }
    }

    match positional.len() {
        1 => res.device = Some(PathBuf::from(&positional[0])),
        2 => {
            res.device = Some(PathBuf::from(&positional[0]));
            res.size_bytes = Some(
                parse_size(&positional[1])
                    .unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid size"))
                    .bytes,
            );
        }
        _ => error(BIN, USAGE_ERR, "usage: mkfs.reiserfs [options] device [size]"),
    }
    res
}

fn main() {
    let args = parse_args();
    let device_path = args.device.clone().unwrap();

    let mut dev = FileDevice::open(&device_path, args.block_size)
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: {e}", device_path.display())));

    if !args.quiet {
        if let Ok((_, sb)) = SuperBlock::probe(&mut dev, true) {
            println!(
                "{} already contains a reiserfs filesystem ({} blocks)",
                device_path.display(),
                sb.block_count
            );
            let confirm = prompt(Some("Proceed anyway? (y/N) "), false)
                .map(|s| s.eq_ignore_ascii_case("y"))
                .unwrap_or(false);
            if !confirm {
                eprintln!("Abort.");
                exit(1);
            }
        }
    }

    let block_count = match args.size_bytes {
        Some(bytes) => bytes / args.block_size as u64,
        None => dev.len(),
    };

    let journal_dev: Option<Box<dyn reiserfs::Device>> = args.journal_dev.as_ref().map(|p| {
        Box::new(
            FileDevice::open(p, args.block_size)
                .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: {e}", p.display()))),
        ) as Box<dyn reiserfs::Device>
    });

    let uuid = if args.uuid == [0; 16] {
        *uuid::Uuid::new_v4().as_bytes()
    } else {
        args.uuid
    };

    let params = CreateParams {
        block_count,
        block_size: args.block_size,
        format: args.format,
        hash: args.hash,
        journal: JournalCreateParams { len: args.journal_len, max_trans: args.max_trans },
        label: args.label,
        uuid,
    };

    let _ = args.journal_offset; // journal offset is always super_off+2 in-band; recorded for tunefs parity

    let mut gauge = NullGauge;
    let fs = Filesystem::create(Box::new(dev), journal_dev, params, &mut gauge)
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("failed to create filesystem: {e}")));
    let block_count = fs.super_block().block_count as u64;
    fs.close().unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("failed to close filesystem: {e}")));

    if !args.quiet {
        println!(
            "{}: filesystem created ({block_count} blocks, {})",
            device_path.display(),
            ByteSize(block_count * args.block_size as u64),
        );
    }
}
