use std::io::Write;
use std::path::PathBuf;

use csv_core::WriteResult;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Table,
    Jsonl,
    Csv,
}

#[derive(clap::Parser, Clone, Debug)]
#[group(id = "output::Args")]
pub struct Args {
    /// Write to this file instead of the terminal.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    #[arg(long, short = 'f', value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open the specified output file at {1:?}")]
    OpenOutputFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the output file at {1:?}")]
    WriteFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the terminal")]
    WriteStdout(#[source] std::io::Error),
    #[error("could not serialize a record to JSON")]
    SerializeJson(#[source] serde_json::Error),
}

/// Something that can be printed as a table row as well as serialized as JSON.
pub trait Record: serde::Serialize {
    fn headers() -> &'static [&'static str];
    fn row(&self) -> Vec<String>;
}

impl Args {
    pub fn to_output(&self) -> Result<Output, Error> {
        let io = match &self.output {
            None => Box::new(std::io::stdout().lock()) as Box<dyn Write>,
            Some(path) => Box::new(
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| Error::OpenOutputFile(e, path.clone()))?,
            ) as Box<dyn Write>,
        };
        Ok(Output::new(io, self.format, self.output.clone()))
    }
}

pub struct Output<W = Box<dyn Write>> {
    io: W,
    destination: Option<PathBuf>,
    formatter: Formatter,
}

enum Formatter {
    Csv { wrote_headers: bool },
    Table { comfy: comfy_table::Table, has_headers: bool },
    Jsonl,
}

impl<W: Write> Output<W> {
    /// `destination` is only used to describe write errors; `None` stands for the terminal.
    pub fn new(io: W, format: Format, destination: Option<PathBuf>) -> Self {
        let formatter = match format {
            Format::Table => {
                let mut comfy = comfy_table::Table::new();
                comfy.set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
                Formatter::Table { comfy, has_headers: false }
            }
            Format::Jsonl => Formatter::Jsonl,
            Format::Csv => Formatter::Csv { wrote_headers: false },
        };
        Self { io, destination, formatter }
    }

    pub fn record<R: Record>(&mut self, record: &R) -> Result<(), Error> {
        match &mut self.formatter {
            Formatter::Csv { wrote_headers } => {
                if !std::mem::replace(wrote_headers, true) {
                    self.write_csv_row(R::headers())?;
                }
                self.write_csv_row(&record.row())?;
            }
            Formatter::Table { comfy, has_headers } => {
                if !std::mem::replace(has_headers, true) {
                    comfy.set_header(R::headers());
                }
                comfy.add_row(record.row());
            }
            Formatter::Jsonl => {
                serde_json::to_writer(&mut self.io, record).map_err(Error::SerializeJson)?;
                writeln!(self.io).map_err(|e| self.write_error(e))?;
            }
        }
        Ok(())
    }

    fn write_csv_row<V: AsRef<str>>(&mut self, values: &[V]) -> Result<(), Error> {
        // Quoting at most doubles a field, plus the two quotes around it.
        let longest = values.iter().map(|v| v.as_ref().len()).max().unwrap_or(0);
        let mut buffer = vec![0; 2 + 2 * longest];
        let mut writer = csv_core::Writer::new();
        let mut line = Vec::new();
        for (index, value) in values.iter().enumerate() {
            if index != 0 {
                let (result, written) = writer.delimiter(&mut buffer);
                debug_assert!(matches!(result, WriteResult::InputEmpty));
                line.extend_from_slice(&buffer[..written]);
            }
            let (result, read, written) = writer.field(value.as_ref().as_bytes(), &mut buffer);
            debug_assert!(matches!(result, WriteResult::InputEmpty));
            debug_assert_eq!(read, value.as_ref().len());
            line.extend_from_slice(&buffer[..written]);
        }
        let (result, written) = writer.terminator(&mut buffer);
        debug_assert!(matches!(result, WriteResult::InputEmpty));
        line.extend_from_slice(&buffer[..written]);
        self.io.write_all(&line).map_err(|e| self.write_error(e))
    }

    fn write_error(&self, e: std::io::Error) -> Error {
        match &self.destination {
            None => Error::WriteStdout(e),
            Some(p) => Error::WriteFile(e, p.clone()),
        }
    }

    /// Flush everything out and hand the writer back.
    pub fn commit(mut self) -> Result<W, Error> {
        if let Formatter::Table { comfy, has_headers: true } = &self.formatter {
            writeln!(self.io, "{comfy}").map_err(|e| self.write_error(e))?;
        }
        self.io.flush().map_err(|e| self.write_error(e))?;
        Ok(self.io)
    }
}
