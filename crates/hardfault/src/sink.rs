//! Line-buffered report sink.
//!
//! Log transports like defmt emit whole frames, not byte streams, so the
//! report is collected one line at a time and each completed line is handed
//! to `emit` without its `\r\n`. Lines longer than `N` bytes are split.

use core::fmt;

use heapless::String;

/// Adapts a per-line emitter to [`fmt::Write`].
pub struct LineSink<const N: usize, F: FnMut(&str)> {
    line: String<N>,
    emit: F,
}

impl<const N: usize, F: FnMut(&str)> LineSink<N, F> {
    /// Buffer up to `N` bytes per line.
    pub fn new(emit: F) -> Self {
        Self {
            line: String::new(),
            emit,
        }
    }

    /// Emit whatever is buffered, even without a line terminator.
    pub fn flush(&mut self) {
        if !self.line.is_empty() {
            (self.emit)(self.line.as_str());
            self.line.clear();
        }
    }
}

impl<const N: usize, F: FnMut(&str)> fmt::Write for LineSink<N, F> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            match c {
                '\r' => {}
                '\n' => {
                    (self.emit)(self.line.as_str());
                    self.line.clear();
                }
                _ => {
                    if self.line.push(c).is_err() {
                        self.flush();
                        self.line.push(c).map_err(|_| fmt::Error)?;
                    }
                }
            }
        }
        Ok(())
    }
}
