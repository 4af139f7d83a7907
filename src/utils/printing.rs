//! Printers for model responses that arrive in chunks.

use std::io::{self, stdout, Write};

#[cfg(feature = "terminal_printing")]
pub use markdown::IncrementalMarkdownPrinter;

const RULE_WIDTH: usize = 30;

/// Receives a streamed response chunk by chunk.
pub trait ResponsePrinter {
    /// Called once before the first chunk.
    fn begin(&mut self) -> io::Result<()>;
    fn push(&mut self, chunk: &str) -> io::Result<()>;
    /// Called once after the last chunk.
    fn finish(&mut self) -> io::Result<()>;
}

/// Prints chunks to stdout as they are received, between two horizontal rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainPrinter;

impl ResponsePrinter for PlainPrinter {
    fn begin(&mut self) -> io::Result<()> {
        writeln!(stdout().lock(), "{}", "-".repeat(RULE_WIDTH))
    }

    fn push(&mut self, chunk: &str) -> io::Result<()> {
        let mut out = stdout().lock();
        out.write_all(chunk.as_bytes())?;
        out.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        writeln!(stdout().lock(), "\n{}", "-".repeat(RULE_WIDTH))
    }
}

/// Discards every chunk. Used for batch generation, where only the files matter.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPrinter;

impl ResponsePrinter for SilentPrinter {
    fn begin(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn push(&mut self, _chunk: &str) -> io::Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(feature = "terminal_printing")]
mod markdown {
    use std::io::{self, stdout, Write};

    use termimad::crossterm::terminal::Clear;
    use termimad::crossterm::terminal::ClearType::FromCursorDown;
    use termimad::crossterm::{cursor, ExecutableCommand};
    use termimad::{FmtLine, FmtText, MadSkin};

    use super::ResponsePrinter;

    struct RenderedMarkdown {
        text: String,
        line_width: Vec<usize>,
    }

    impl From<FmtText<'_, '_>> for RenderedMarkdown {
        fn from(fmt_text: FmtText<'_, '_>) -> Self {
            let text = format!("{}", fmt_text);
            let line_width = fmt_text.lines.iter().map(FmtLine::visible_length).collect();
            Self {
                text,
                line_width,
            }
        }
    }

    /// Re-renders the whole response as markdown below an anchor every time a chunk arrives.
    ///
    /// Each chunk redraws the full buffer, so it reads best with responses that fit on screen.
    pub struct IncrementalMarkdownPrinter {
        pub skin: MadSkin,
        pub wrap_width: Option<usize>,
        hide_cursor: bool,
        cursor_anchor: Option<(u16, u16)>,
        markdown_string_buffer: String,
    }

    impl Default for IncrementalMarkdownPrinter {
        fn default() -> Self {
            Self::new(true)
        }
    }

    impl IncrementalMarkdownPrinter {
        pub fn new(hide_cursor: bool) -> Self {
            Self {
                skin: MadSkin::default(),
                wrap_width: None,
                hide_cursor,
                cursor_anchor: None,
                markdown_string_buffer: String::new(),
            }
        }

        fn print_rendered(&mut self, anchor: (u16, u16), rendered_markdown: &RenderedMarkdown) -> io::Result<()> {
            stdout()
                .execute(cursor::MoveTo(anchor.0, anchor.1))?
                .execute(Clear(FromCursorDown))?;
            let rows = rendered_markdown.line_width.len() as u16;
            let columns = rendered_markdown.line_width.last().copied().unwrap_or(0) as u16;
            let mut out = stdout().lock();
            write!(out, "{}", rendered_markdown.text)?;
            out.flush()?;
            drop(out);
            // the position is relative to the terminal, not to the scrollback, so the anchor drifts once the text scrolls
            let (mut column, mut row) = cursor::position()?;
            column = column.saturating_sub(columns);
            row = row.saturating_sub(rows);
            self.cursor_anchor = Some((column, row));
            Ok(())
        }
    }

    impl ResponsePrinter for IncrementalMarkdownPrinter {
        fn begin(&mut self) -> io::Result<()> {
            self.markdown_string_buffer.clear();
            self.cursor_anchor = Some(cursor::position()?);
            if self.hide_cursor {
                stdout().execute(cursor::Hide)?;
            }
            Ok(())
        }

        fn push(&mut self, chunk: &str) -> io::Result<()> {
            let anchor = match self.cursor_anchor {
                Some(anchor) => anchor,
                None => return Err(io::Error::new(io::ErrorKind::Other, "markdown printer used before begin")),
            };
            self.markdown_string_buffer.push_str(chunk);
            let rendered: RenderedMarkdown = FmtText::from(&self.skin, &self.markdown_string_buffer, self.wrap_width).into();
            self.print_rendered(anchor, &rendered)
        }

        fn finish(&mut self) -> io::Result<()> {
            self.cursor_anchor = None;
            if self.hide_cursor {
                stdout().execute(cursor::Show)?;
            }
            writeln!(stdout().lock())
        }
    }

    impl Drop for IncrementalMarkdownPrinter {
        fn drop(&mut self) {
            if self.cursor_anchor.is_some() && self.hide_cursor {
                let _ = stdout().execute(cursor::Show);
            }
        }
    }
}

#[cfg(test)]
mod test_printing {
    use super::{ResponsePrinter, SilentPrinter};

    #[test]
    fn test_silent_printer_accepts_chunks() {
        let mut printer = SilentPrinter;
        printer.begin().unwrap();
        printer.push("# Título").unwrap();
        printer.finish().unwrap();
    }
}
