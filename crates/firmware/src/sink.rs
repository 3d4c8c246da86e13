//! Report sink over defmt.
//!
//! The decoder writes through `core::fmt::Write`; defmt wants one frame per
//! log call. [`DefmtSink`] buffers a line at a time and prints each completed
//! line with `defmt::println!`, which ignores `DEFMT_LOG` so a dump is never
//! filtered out.

use hardfault::LineSink;

/// Longest line buffered before it is split.
///
/// Every fixed report line fits; only a long "Fault flags:" list can wrap.
pub const LINE_CAPACITY: usize = 96;

/// Per-line emitter.
pub type Emit = fn(&str);

/// Line-buffered defmt sink.
pub type DefmtSink = LineSink<LINE_CAPACITY, Emit>;

/// Sink that prints each report line over defmt-rtt.
#[cfg(feature = "hardware")]
pub fn defmt_sink() -> DefmtSink {
    fn emit(line: &str) {
        defmt::println!("{=str}", line);
    }
    LineSink::new(emit as Emit)
}
