//! `reiserfs_copy`: copies a ReiserFS v3 filesystem's tree onto a fresh
//! destination device, relocating every indirect-item pointer along the way.

use std::path::PathBuf;
use std::process::exit;

use reiserfs::device::FileDevice;
use reiserfs::fs::Filesystem;
use reiserfs::gauge::NullGauge;
use reiserfs::gauge::StderrGauge;
use reiserfs::Device;
use utils::error;
use utils::prompt::prompt;

const BIN: &str = "reiserfs_copy";
const USAGE_ERR: i32 = 0xfe;
const RUNTIME_ERR: i32 = 0xff;

struct Args {
    src_journal_dev: Option<PathBuf>,
    dst_journal_dev: Option<PathBuf>,
    force: bool,
    quiet: bool,
    src: PathBuf,
    dst: PathBuf,
}

fn parse_args() -> Args {
    let mut src_journal_dev = None;
    let mut dst_journal_dev = None;
    let mut force = false;
    let mut quiet = false;
    let mut positional = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-j" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-j requires a device path"));
                src_journal_dev = Some(PathBuf::from(v));
            }
            "-J" => {
                let v = args.next().unwrap_or_else(|| error(BIN, USAGE_ERR, "-J requires a device path"));
                dst_journal_dev = Some(PathBuf::from(v));
            }
            "-f" => force = true,
            "-q" => quiet = true,
            _ => positional.push(arg),
        }
    }

    if positional.len() != 2 {
        error(BIN, USAGE_ERR, "usage: reiserfs_copy [-j src_jdev] [-J dst_jdev] [-f] [-q] source dest");
    }
    Args {
        src_journal_dev,
        dst_journal_dev,
        force,
        quiet,
        src: PathBuf::from(positional[0].clone()),
        dst: PathBuf::from(positional[1].clone()),
    }
}

fn main() {
    let args = parse_args();

    let mut src_dev = FileDevice::open(&args.src, reiserfs::super_block::DEFAULT_BLOCK_SIZE)
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: {e}", args.src.display())));
    let (_, src_sb) = reiserfs::super_block::SuperBlock::probe(&mut src_dev, args.quiet)
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: not a reiserfs filesystem: {e}", args.src.display())));
    let blocksize = src_sb.block_size as u32;
    src_dev.set_blocksize(blocksize);

    let mut dst_dev = FileDevice::open(&args.dst, blocksize)
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: {e}", args.dst.display())));

    if !args.force && !args.quiet {
        if reiserfs::super_block::SuperBlock::probe(&mut dst_dev, true).is_ok() {
            println!("{} already contains a filesystem", args.dst.display());
            let confirm = prompt(Some("Overwrite it? (y/N) "), false)
                .map(|s| s.eq_ignore_ascii_case("y"))
                .unwrap_or(false);
            if !confirm {
                eprintln!("Abort.");
                exit(1);
            }
        }
    }

    let src_journal_dev: Option<Box<dyn Device>> = args.src_journal_dev.as_ref().map(|p| {
        Box::new(
            FileDevice::open(p, blocksize).unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: {e}", p.display()))),
        ) as Box<dyn Device>
    });
    let dst_journal_dev: Option<Box<dyn Device>> = args.dst_journal_dev.as_ref().map(|p| {
        Box::new(
            FileDevice::open(p, blocksize).unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("{}: {e}", p.display()))),
        ) as Box<dyn Device>
    });

    let mut src_fs = Filesystem::open(Box::new(src_dev), src_journal_dev, args.quiet)
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("failed to open source filesystem: {e}")));

    let mut gauge: Box<dyn reiserfs::gauge::Gauge> =
        if args.quiet { Box::new(NullGauge) } else { Box::new(StderrGauge::default()) };

    let dst_fs = src_fs
        .copy(Box::new(dst_dev), dst_journal_dev, gauge.as_mut())
        .unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("copy failed: {e}")));

    dst_fs.close().unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("failed to close destination: {e}")));
    src_fs.close().unwrap_or_else(|e| error(BIN, RUNTIME_ERR, format!("failed to close source: {e}")));

    if !args.quiet {
        println!("{} -> {}: copy complete", args.src.display(), args.dst.display());
    }
}
