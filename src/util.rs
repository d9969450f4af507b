//! Logging setup and nucleotide code tables.

use env_logger::LogBuilder;
use log::{LogLevelFilter, LogRecord};

/// Initialize the process-wide logger. Verbosity is fixed once at startup;
/// worker threads only read it.
pub fn init_logging(level: LogLevelFilter) {
    let mut builder = LogBuilder::new();

    builder.format(|record: &LogRecord| {
        format!("{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args())
    });
    builder.filter(None, level);

    // ignore the error if a logger was already installed (tests)
    let _ = builder.init();
}

/// ASCII nucleotide to 2-bit code; anything ambiguous becomes 4.
pub fn encode_base(b: u8) -> u8 {
    match b {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' => 3,
        _ => 4,
    }
}

/// 2-bit code (plus 4 for ambiguous) back to ASCII.
pub fn decode_base(c: u8) -> u8 {
    b"ACGTN"[(c as usize).min(4)]
}

/// Encode a whole ASCII sequence into codes 0-4.
pub fn encode_seq(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&b| encode_base(b)).collect()
}
