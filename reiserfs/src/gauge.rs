//! Progress reporting for long-running operations (relocate, resize, sync).
//!
//! The source keeps a process-wide current-gauge pointer; every call site
//! here instead takes a `&mut dyn Gauge` explicitly.

/// A sink for progress updates on a long-running operation.
pub trait Gauge {
    fn reset(&mut self, name: &str);
    fn update(&mut self, done: u64, total: u64);
    fn finish(&mut self, ok: bool);
}

/// A gauge that discards every update. The default when a caller has no UI.
#[derive(Default)]
pub struct NullGauge;

impl Gauge for NullGauge {
    fn reset(&mut self, _name: &str) {}
    fn update(&mut self, _done: u64, _total: u64) {}
    fn finish(&mut self, _ok: bool) {}
}

/// A gauge that prints a percentage line to stderr, for CLI use.
#[derive(Default)]
pub struct StderrGauge {
    name: String,
}

impl Gauge for StderrGauge {
    fn reset(&mut self, name: &str) {
        self.name = name.to_string();
        eprintln!("{}: starting", self.name);
    }

    fn update(&mut self, done: u64, total: u64) {
        if total == 0 {
            return;
        }
        let pct = done * 100 / total;
        eprint!("\r{}: {pct}%", self.name);
    }

    fn finish(&mut self, ok: bool) {
        eprintln!("\r{}: {}", self.name, if ok { "done" } else { "failed" });
    }
}
