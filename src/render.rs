//! Output rendering for the chat session.
//!
//! Streamed response text and session notices both go through [`Renderer`],
//! so the session never writes to the terminal directly.

use std::io::{self, Write};

/// ANSI escape code for cyan text (used for notices).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Trait for rendering session output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Captured output for tests
pub trait Renderer: Send {
    /// Print a fragment of response text.
    ///
    /// This is called incrementally as fragments are streamed from the model
    /// and must reach the terminal before the next fragment is requested.
    fn print_text(&mut self, text: &str);

    /// Print a one-line notice such as a command result.
    fn print_info(&mut self, info: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Called when a response is complete.
    ///
    /// Terminates the streamed line, even when nothing was streamed.
    fn finish_response(&mut self);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    out: Box<dyn Write + Send>,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(Box::new(io::stdout()), use_color)
    }

    /// Creates a renderer writing to `out` instead of stdout.
    pub fn with_writer(out: Box<dyn Write + Send>, use_color: bool) -> Self {
        Self { out, use_color }
    }

    /// Flushes output to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.out.flush();
    }

    fn write_line(&mut self, color: &str, line: &str) {
        if self.use_color {
            let _ = writeln!(self.out, "{color}{line}{ANSI_RESET}");
        } else {
            let _ = writeln!(self.out, "{line}");
        }
        self.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        let _ = write!(self.out, "{text}");
        self.flush();
    }

    fn print_info(&mut self, info: &str) {
        // Multi-line notices (help) are colored per line so resets never span lines.
        for line in info.lines() {
            self.write_line(ANSI_CYAN, line);
        }
        if info.is_empty() {
            self.write_line(ANSI_CYAN, "");
        }
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn finish_response(&mut self) {
        let _ = writeln!(self.out);
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn plain_output() {
        let buf = SharedBuf::default();
        let mut renderer = PlainTextRenderer::with_writer(Box::new(buf.clone()), false);
        renderer.print_text("Hel");
        renderer.print_text("lo");
        renderer.finish_response();
        renderer.print_info("Available commands:\n  /bye - Exit the app");
        assert_eq!(
            buf.contents(),
            "Hello\nAvailable commands:\n  /bye - Exit the app\n"
        );
    }

    #[test]
    fn colored_notices() {
        let buf = SharedBuf::default();
        let mut renderer = PlainTextRenderer::with_writer(Box::new(buf.clone()), true);
        renderer.print_info("Coder changed to: Alpha");
        assert_eq!(
            buf.contents(),
            format!("{ANSI_CYAN}Coder changed to: Alpha{ANSI_RESET}\n")
        );
    }
}
