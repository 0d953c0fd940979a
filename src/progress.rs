//! Commit progress reporting.
//!
//! `oracle commit` can take a while when many files need embedding. Progress
//! goes to **stderr** so stdout stays parseable for scripts.

use std::io::Write;

/// A single progress event emitted by batch indexing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexProgressEvent {
    /// `n` of `total` staged files have been read, chunked and embedded.
    Preparing { n: u64, total: u64 },
    /// The prepared batch is being written to both stores.
    Writing { files: u64, chunks: u64 },
}

pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly lines: "commit  preparing  12 / 1,024 files".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match event {
            IndexProgressEvent::Preparing { n, total } => format!(
                "commit  preparing  {} / {} files\n",
                format_number(n),
                format_number(total)
            ),
            IndexProgressEvent::Writing { files, chunks } => format!(
                "commit  writing  {} files, {} chunks\n",
                format_number(files),
                format_number(chunks)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Human progress when stderr is a terminal or `--verbose` is set.
pub fn reporter(verbose: bool) -> Box<dyn IndexProgressReporter> {
    if verbose || atty::is(atty::Stream::Stderr) {
        Box::new(StderrProgress)
    } else {
        Box::new(NoProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_groups_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(65_536), "65,536");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
