//! Diagnostic output
//!
//! [`Reporter`] turns [`Violation`]s into the text users read. Every line is
//! prefixed with `==<pid>==` so the output can be interleaved with the
//! target's own stderr. The headline of each report is coloured by
//! [`Severity`]; backtraces are rendered by the [`BacktraceProvider`].
//!
//! The reporter keeps no state between reports: the same violation twice
//! prints twice.

use crate::backtrace::{Backtrace, BacktraceProvider};
use crate::emulator::errors::Violation;
use crate::tracer::LeakSummary;
use crossterm::style::{style, Stylize};
use std::io::{self, Write};

/// How alarming a headline is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Ok,
}

/// Writes reports to the diagnostic stream
pub struct Reporter {
    out: Box<dyn Write>,
    pid: u32,
    colored: bool,
}

impl Reporter {
    pub fn new(out: Box<dyn Write>, pid: u32, colored: bool) -> Self {
        Reporter { out, pid, colored }
    }

    /// Reporter writing to stderr
    pub fn stderr(pid: u32, colored: bool) -> Self {
        Self::new(Box::new(io::stderr()), pid, colored)
    }

    fn paint(&self, text: &str, severity: Severity) -> String {
        if !self.colored {
            return text.to_string();
        }
        match severity {
            Severity::Error => format!("{}", style(text).red().bold()),
            Severity::Ok => format!("{}", style(text).green().bold()),
        }
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "=={}==  {}", self.pid, text)
    }

    fn backtrace<B>(&mut self, backtracer: &B, backtrace: &Backtrace) -> io::Result<()>
    where
        B: BacktraceProvider + ?Sized,
    {
        backtracer.render(backtrace, self.pid, self.out.as_mut())
    }

    /// Print one violation with all of its backtraces
    pub fn report<B>(&mut self, violation: &Violation, backtracer: &B) -> io::Result<()>
    where
        B: BacktraceProvider + ?Sized,
    {
        let title = self.paint(violation.title(), Severity::Error);
        writeln!(self.out)?;
        match violation {
            Violation::DoubleFree { address, backtrace } => {
                self.line(&format!("{}, {:#x}", title, address))?;
                self.line(&format!(
                    "Address {:#x} has already been passed to free()",
                    address
                ))?;
                self.backtrace(backtracer, backtrace)?;
            }
            Violation::InvalidFree { address, backtrace } => {
                self.line(&format!("{}, {:#x}", title, address))?;
                self.line(&format!(
                    "Address {:#x} has never been returned by malloc()",
                    address
                ))?;
                self.backtrace(backtracer, backtrace)?;
            }
            Violation::UseAfterFree {
                access,
                address,
                size,
                offset,
                block_size,
                backtrace,
                malloc_backtrace,
                free_backtrace,
            } => {
                self.line(&format!(
                    "{}, invalid {}-byte {} at address {:#x}",
                    title, size, access, address
                ))?;
                self.backtrace(backtracer, backtrace)?;
                self.line(&format!(
                    "Address is {} bytes into block of size {}, allocated at:",
                    offset, block_size
                ))?;
                self.backtrace(backtracer, malloc_backtrace)?;
                self.line("Later freed at:")?;
                self.backtrace(backtracer, free_backtrace)?;
            }
            Violation::Leak {
                address,
                size,
                malloc_backtrace,
            } => {
                self.line(&format!(
                    "{}, {}-byte allocation at address {:#010x}",
                    title, size, address
                ))?;
                self.backtrace(backtracer, malloc_backtrace)?;
            }
        }
        self.out.flush()
    }

    /// Print every leak followed by the summary line
    pub fn report_leaks<B>(&mut self, summary: &LeakSummary, backtracer: &B) -> io::Result<()>
    where
        B: BacktraceProvider + ?Sized,
    {
        for leak in &summary.leaks {
            self.report(leak, backtracer)?;
        }

        writeln!(self.out)?;
        let text = if summary.is_clean() {
            self.paint("No leaks found!", Severity::Ok)
        } else {
            self.paint(
                &format!(
                    "{} leak(s) found: {} byte(s) leaked",
                    summary.leak_count(),
                    summary.bytes_leaked
                ),
                Severity::Error,
            )
        };
        self.line(&text)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrace::ShadowCallStack;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    #[test]
    fn test_double_free_report() {
        let capture = Capture::default();
        let mut reporter = Reporter::new(Box::new(capture.clone()), 7, false);
        let violation = Violation::DoubleFree {
            address: 0x1000,
            backtrace: Backtrace::new(vec![0x400]),
        };
        reporter
            .report(&violation, &ShadowCallStack::new())
            .unwrap();

        let text = capture.text();
        assert!(text.contains("==7==  Double free(), 0x1000"));
        assert!(text.contains("==7==  Address 0x1000 has already been passed to free()"));
        assert!(text.contains("#0  0x00000400"));
    }

    #[test]
    fn test_colored_headline_keeps_text() {
        let capture = Capture::default();
        let mut reporter = Reporter::new(Box::new(capture.clone()), 7, true);
        reporter
            .report_leaks(&LeakSummary::default(), &ShadowCallStack::new())
            .unwrap();

        let text = capture.text();
        assert!(text.contains("No leaks found!"));
        assert!(text.contains("\u{1b}["));
    }

    #[test]
    fn test_leak_summary_counts() {
        let capture = Capture::default();
        let mut reporter = Reporter::new(Box::new(capture.clone()), 1, false);
        let summary = LeakSummary {
            leaks: vec![
                Violation::Leak {
                    address: 0x2000,
                    size: 16,
                    malloc_backtrace: Backtrace::default(),
                },
                Violation::Leak {
                    address: 0x3000,
                    size: 8,
                    malloc_backtrace: Backtrace::default(),
                },
            ],
            bytes_leaked: 24,
        };
        reporter
            .report_leaks(&summary, &ShadowCallStack::new())
            .unwrap();

        let text = capture.text();
        assert!(text.contains("Leak, 16-byte allocation at address 0x00002000"));
        assert!(text.contains("2 leak(s) found: 24 byte(s) leaked"));
    }
}
