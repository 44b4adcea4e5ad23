//! `reiserfstune`: adjusts label, uuid, and journal geometry on an existing
//! ReiserFS v3 filesystem without touching its tree.

use std::path::PathBuf;

use reiserfs::device::FileDevice;
use reiserfs::fs::Filesystem;
use reiserfs::journal::JOURNAL_TRANS_MIN;
use reiserfs::Device;
use utils::error;
use utils::size::parse_size;

const BIN: &str = "reiserfstune";
const USAGE_ERR: i32 = 0xfe;
const RUNTIME_ERR: i32 = 0xff;

struct Args {
    label: Option<[u8; 16]>,
    uuid: Option<[u8; 16]>,
    journal_dev: Option<PathBuf>,
    journal_start: Option<u64>,
    journal_len: Option<u64>,
    max_trans: u32,
    quiet: bool,
    device: PathBuf,
}

fn copy_str(s: &str) -> [u8; 16] {
    let mut dst = [0u8; 16];
    let bytes = s.as_bytes();
    let n = bytes.len().min(16);
    dst[..n].copy_from_slice(&bytes[..n]);
    dst
}

fn parse_args() -> Args {
    let mut label = None;
    let mut uuid = None;
    let mut journal_dev = None;
    let mut journal_start = None;
    let mut journal_len = None;
    let mut max_trans = JOURNAL_TRANS_MIN;
    let mut quiet = false;
    let mut positional = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-l" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-l requires a label"));
                label = Some(copy_str(&v));
            }
            "-i" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-i requires a uuid"));
                let parsed = uuid::Uuid::parse_str(&v).unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid uuid"));
                uuid = Some(*parsed.as_bytes());
            }
            "-j" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-j requires a device path"));
                journal_dev = Some(PathBuf::from(v));
            }
            "-o" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-o requires a journal start block"));
                journal_start = Some(v.parse().unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid journal start")));
            }
            "-s" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-s requires a journal length"));
                journal_len = Some(parse_size(&v).unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid journal length")).bytes);
            }
            "-t" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-t requires a transaction max"));
                max_trans = v.parse().unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid max-trans"));
            }
            "-q" => quiet = true,
            _ => positional.push(arg),
        }
    }

    if positional.len() != 1 {
        error(BIN, USAGE_ERR, "usage: reiserfstune [-l label] [-i uuid] [-j jdev -o start -s len -t max] [-q] device");
    }
    Args {
        label,
        uuid,
        journal_dev,
        journal_start,
        journal_len,
        max_trans,
        quiet,
        device: PathBuf::from(positional.remove(0)),
    }
}

fn main() {
    let args = parse_args();

    let mut dev = FileDevice::open(&args.device, reiserfs::super_block::DEFAULT_BLOCK_SIZE)
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: {e}", args.device.display())));

    let (_, sb) = reiserfs::super_block::SuperBlock::probe(&mut dev, args.quiet)
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: not a reiserfs filesystem: {e}", args.device.display())));
    let blocksize = sb.block_size as u32;
    dev.set_blocksize(blocksize);

    let journal_dev: Option<Box<dyn Device>> = args.journal_dev.as_ref().map(|p| {
        Box::new(
            FileDevice::open(p, blocksize).unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: {e}", p.display()))),
        ) as Box<dyn Device>
    });
    let retuning_journal = journal_dev.is_some() || args.journal_start.is_some() || args.journal_len.is_some();

    let mut fs = Filesystem::open(Box::new(dev), journal_dev, args.quiet)
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("failed to open filesystem: {e}")));

    if let Some(label) = args.label {
        fs.set_label(label);
    }
    if let Some(uuid) = args.uuid {
        fs.set_uuid(uuid);
    }
    if retuning_journal {
        let start = args.journal_start.unwrap_or(fs.super_block().jp.start as u64);
        let len = args.journal_len.map(|bytes| bytes / blocksize as u64).unwrap_or(fs.super_block().jp.len as u64);
        let new_journal_dev: Option<Box<dyn Device>> = args.journal_dev.as_ref().map(|p| {
            Box::new(
                FileDevice::open(p, blocksize)
                    .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: {e}", p.display()))),
            ) as Box<dyn Device>
        });
        fs.journal_tune(new_journal_dev, start, len, args.max_trans)
            .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("failed to tune journal: {e}")));
    }

    fs.close().unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("failed to close filesystem: {e}")));

    if !args.quiet {
        println!("{}: filesystem tuned", args.device.display());
    }
}
