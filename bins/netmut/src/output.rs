//! Text and JSON output.

use std::io::{self, Write};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Something the CLI can print in either format.
pub trait Printable: Serialize {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()>;

    fn print<W: Write>(&self, w: &mut W, format: OutputFormat) -> io::Result<()> {
        match format {
            OutputFormat::Text => self.print_text(w),
            OutputFormat::Json => {
                serde_json::to_writer(&mut *w, self)?;
                writeln!(w)
            }
        }
    }
}

impl<T: Printable> Printable for Vec<T> {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for item in self {
            item.print_text(w)?;
        }
        Ok(())
    }
}

/// Print `value` to stdout.
pub fn emit<T: Printable>(value: &T, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    value.print(&mut lock, format)
}
