//! `resize_reiserfs`: grows or shrinks a ReiserFS v3 filesystem in place, or
//! shifts it to a new absolute block range when given two positional sizes.

use std::path::PathBuf;
use std::process::exit;

use reiserfs::device::FileDevice;
use reiserfs::fs::Filesystem;
use reiserfs::gauge::NullGauge;
use reiserfs::gauge::StderrGauge;
use reiserfs::Device;
use utils::error;
use utils::prompt::prompt;
use utils::size::parse_size;
use utils::size::Sign;
use utils::util::ByteSize;

const BIN: &str = "resize_reiserfs";
const USAGE_ERR: i32 = 0xfe;
const RUNTIME_ERR: i32 = 0xff;

struct Args {
    journal_dev: Option<PathBuf>,
    dry_run: bool,
    force: bool,
    quiet: bool,
    device: PathBuf,
    sizes: Vec<String>,
}

fn parse_args() -> Args {
    let mut journal_dev = None;
    let mut dry_run = false;
    let mut force = false;
    let mut quiet = false;
    let mut positional = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-j" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-j requires a device path"));
                journal_dev = Some(PathBuf::from(v));
            }
            "-n" => dry_run = true,
            "-f" => force = true,
            "-q" => quiet = true,
            _ => positional.push(arg),
        }
    }

    if positional.is_empty() {
        error(BIN, USAGE_ERR, "usage: resize_reiserfs [-j jdev] [-n] [-f] [-q] device [[+|-]size | start end]");
    }
    let device = PathBuf::from(positional.remove(0));
    Args { journal_dev, dry_run, force, quiet, device, sizes: positional }
}

fn main() {
    let args = parse_args();

    if !args.force && !args.quiet {
        let confirm = prompt(Some("Resizing a mounted filesystem can destroy data. Continue? (y/N) "), false)
            .map(|s| s.eq_ignore_ascii_case("y"))
            .unwrap_or(false);
        if !confirm {
            eprintln!("Abort.");
            exit(1);
        }
    }

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

    let mut fs = Filesystem::open(Box::new(dev), journal_dev, args.quiet)
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("failed to open filesystem: {e}")));

    let mut gauge: Box<dyn reiserfs::gauge::Gauge> =
        if args.quiet { Box::new(NullGauge) } else { Box::new(StderrGauge::default()) };

    let current = fs.super_block().block_count as u64;

    let result = match args.sizes.len() {
        1 => {
            let size = parse_size(&args.sizes[0]).unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid size"));
            let blocks = size.bytes / blocksize as u64;
            let new_count = match size.sign {
                Sign::Plus => current + blocks,
                Sign::Minus => current.checked_sub(blocks).unwrap_or_else(|| error(BIN, USAGE_ERR, "size delta exceeds current block count")),
                Sign::None => blocks,
            };
            if args.dry_run {
                println!(
                    "{}: would resize from {current} to {new_count} blocks ({} to {})",
                    args.device.display(),
                    ByteSize(current * blocksize as u64),
                    ByteSize(new_count * blocksize as u64),
                );
                exit(0);
            }
            fs.resize_dumb(new_count, gauge.as_mut())
        }
        2 => {
            let start = parse_size(&args.sizes[0]).unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid start"));
            let end = parse_size(&args.sizes[1]).unwrap_or_else(|_| error(BIN, USAGE_ERR, "invalid end"));
            let start_blocks = (start.bytes / blocksize as u64) as i64 * if start.sign == Sign::Minus { -1 } else { 1 };
            let end_blocks = end.bytes / blocksize as u64;
            if args.dry_run {
                println!(
                    "{}: would shift from [0, {current}) to [{start_blocks}, {end_blocks})",
                    args.device.display()
                );
                exit(0);
            }
            fs.resize_smart(start_blocks, end_blocks, gauge.as_mut())
        }
        _ => error(BIN, USAGE_ERR, "expected either a single [+|-]size argument or start/end sizes"),
    };

    result.unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("resize failed: {e}")));
    let new_blocks = fs.super_block().block_count as u64;
    fs.close().unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("failed to close filesystem: {e}")));

    if !args.quiet {
        println!(
            "{}: filesystem resized to {} ({new_blocks} blocks)",
            args.device.display(),
            ByteSize(new_blocks * blocksize as u64),
        );
    }
}
