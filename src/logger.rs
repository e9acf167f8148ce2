//! A logger that is itself a `Sink<Buffer<u8>>`.
//!
//! Grounded on `original_source/core/logger.h`. The original's
//! `Logger` composes with the rest of the stream stack on purpose — it
//! can be `Tee`'d, `Hexify`'d, split, or piped straight to a TTY/UDP
//! `Sink<Buffer<u8>>` — rather than being a side channel bolted on
//! afterward. This module keeps that shape, replacing `printf`-style
//! varargs with `core::fmt::Arguments` and the original's per-subclass
//! `pre()` override with a small [`Preamble`] trait, so `KLog` (the
//! Kernel's own logger) and `ELog` (the Experiment's) can each supply
//! their own timestamped prefix while sharing the same formatting
//! machinery, exactly as `ELog : Logger` does in the original.

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "alloc")]
use alloc::boxed::Box;
use core::fmt::Write as _;

use crate::buf::ByteBuf;
use crate::stream::Sink;

/// Severity tag, mirroring `original_source/core/logger.h`'s
/// `Logger::Lvl` (`NONE, INFO, WARN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// No color, no prefix annotation: `Logger::print`.
    None,
    Info,
    Warn,
}

impl Level {
    /// ANSI color escape for this level, matching the original's
    /// `color[3]` table (reset / green / red).
    fn ansi(self) -> &'static str {
        match self {
            Level::None => "\u{1b}[0m",
            Level::Info => "\u{1b}[32m",
            Level::Warn => "\u{1b}[31m",
        }
    }
}

/// Supplies the per-line prefix a [`Logger`] stamps before the
/// formatted message (e.g. `"(@123ms): "` for the Kernel, `"Experiment
/// Logger (@123ms): "` for the Experiment).
pub trait Preamble {
    fn preamble(&self) -> ByteBuf;
}

/// The trivial preamble: an empty one, for a bare `Logger` with no
/// timestamp context (matches the original's default `pre()` returning
/// an empty 256-byte buffer).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPreamble;

impl Preamble for NoPreamble {
    fn preamble(&self) -> ByteBuf {
        ByteBuf::with_capacity(0)
    }
}

/// A formatted-line logger that pushes each line as one `Buffer<u8>`
/// into a downstream byte sink.
///
/// # Line budget
/// Each line is built in a buffer sized `preamble.capacity() + budget`
/// where `budget` is chosen at construction; formatting beyond that
/// budget is silently truncated (see [`crate::buf::Buffer`]'s
/// `core::fmt::Write` impl), matching the original's fixed-size
/// `snprintf` truncation.
#[cfg(feature = "alloc")]
pub struct Logger<P: Preamble> {
    sink: Box<dyn Sink<ByteBuf>>,
    preamble: P,
    budget: usize,
}

#[cfg(feature = "alloc")]
impl<P: Preamble> Logger<P> {
    pub fn new(sink: Box<dyn Sink<ByteBuf>>, preamble: P, budget: usize) -> Self {
        Logger { sink, preamble, budget }
    }

    /// Re-point this logger at a new downstream sink, in place.
    /// Mirrors `Kernel::initLog`'s placement-new re-pointing of `KLog`.
    pub fn set_sink(&mut self, sink: Box<dyn Sink<ByteBuf>>) {
        self.sink = sink;
    }

    fn write_line(&mut self, level: Level, args: core::fmt::Arguments<'_>) {
        let pre = self.preamble.preamble();
        let mut line = ByteBuf::with_capacity(pre.capacity() + self.budget);
        line.extend_from(pre.iter().copied());
        if !matches!(level, Level::None) {
            let _ = line.write_str(level.ansi());
        }
        let _ = line.write_fmt(args);
        if !matches!(level, Level::None) {
            let _ = line.write_str(Level::None.ansi());
        }
        self.sink.push(line);
    }

    /// `Logger::info`.
    pub fn info(&mut self, args: core::fmt::Arguments<'_>) {
        self.write_line(Level::Info, args);
    }

    /// `Logger::warn`.
    pub fn warn(&mut self, args: core::fmt::Arguments<'_>) {
        self.write_line(Level::Warn, args);
    }

    /// `Logger::print`.
    pub fn print(&mut self, args: core::fmt::Arguments<'_>) {
        self.write_line(Level::None, args);
    }
}

#[cfg(feature = "alloc")]
impl<P: Preamble> Sink<ByteBuf> for Logger<P> {
    /// `Logger::push(Buffer&&)`: stamp an already-prepared buffer with
    /// the preamble and forward it, byte for byte.
    fn full(&mut self) -> bool {
        self.sink.full()
    }

    fn push(&mut self, b: ByteBuf) {
        let pre = self.preamble.preamble();
        let mut line = ByteBuf::with_capacity(pre.capacity() + b.len());
        line.extend_from(pre.iter().copied());
        line.extend_from(b.iter().copied());
        self.sink.push(line);
    }
}

/// `log.info!(logger, "x={}", x)` → `logger.info(format_args!("x={}", x))`.
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(::core::format_args!($($arg)*))
    };
}

/// `log.warn!(logger, "x={}", x)` → `logger.warn(format_args!("x={}", x))`.
#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(::core::format_args!($($arg)*))
    };
}

#[cfg(all(test, feature = "alloc"))]
mod test {
    use super::*;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    struct Capture(Rc<RefCell<Vec<ByteBuf>>>);
    impl Sink<ByteBuf> for Capture {
        fn full(&mut self) -> bool {
            false
        }
        fn push(&mut self, item: ByteBuf) {
            self.0.borrow_mut().push(item);
        }
    }

    struct FixedPreamble;
    impl Preamble for FixedPreamble {
        fn preamble(&self) -> ByteBuf {
            b"(@0ms): ".iter().copied().collect()
        }
    }

    #[test]
    fn info_line_carries_preamble_and_message() {
        let captured = Rc::new(RefCell::new(Vec::new()));
        let mut logger = Logger::new(Box::new(Capture(captured.clone())), FixedPreamble, 64);
        log_info!(logger, "hello {}", 42);

        let lines = captured.borrow();
        assert_eq!(lines.len(), 1);
        let text = String::from_utf8(lines[0].iter().copied().collect()).unwrap();
        assert!(text.starts_with("(@0ms): "));
        assert!(text.contains("hello 42"));
    }

    #[test]
    fn push_stamps_preformatted_buffer_with_preamble() {
        let captured = Rc::new(RefCell::new(Vec::new()));
        let mut logger = Logger::new(Box::new(Capture(captured.clone())), FixedPreamble, 64);
        logger.push(b"raw".iter().copied().collect());

        let lines = captured.borrow();
        let text = String::from_utf8(lines[0].iter().copied().collect()).unwrap();
        assert_eq!(text, "(@0ms): raw");
    }
}
