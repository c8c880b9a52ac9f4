//! Per-modifier output sinks. Each modifier's bin array is written as one
//! record per flush; modifiers naming the same destination share a stream,
//! so their records interleave in flush order on it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

use itertools::Itertools;
use radiometry::DColor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("unknown output format tag '{0}'")]
    BadFormat(char),
    #[error("cannot open output '{dest}': {source}")]
    Open {
        dest: String,
        #[source]
        source: io::Error,
    },
    #[error("error writing output record: {0}")]
    Write(#[from] io::Error),
    #[error("error closing output stream '{0}'")]
    Close(String),
}

/// Record encoding, selected by the single-letter tags of the output spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per record, three decimal components per bin.
    Ascii,
    /// Little-endian f32 components.
    Float,
    /// Little-endian f64 components.
    Double,
    /// 4-byte shared-exponent color encoding per bin.
    Color,
}

impl OutputFormat {
    pub fn from_tag(tag: char) -> Result<Self, OutputError> {
        match tag {
            'a' => Ok(OutputFormat::Ascii),
            'f' => Ok(OutputFormat::Float),
            'd' => Ok(OutputFormat::Double),
            'c' => Ok(OutputFormat::Color),
            other => Err(OutputError::BadFormat(other)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Ascii => "ascii",
            OutputFormat::Float => "float",
            OutputFormat::Double => "double",
            OutputFormat::Color => "color",
        }
    }
}

/// Where a modifier's records go.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Stdout,
    File(PathBuf),
    /// `!command` - records are piped to the command's stdin.
    Pipe(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub format: OutputFormat,
    pub dest: Destination,
}

impl OutputSpec {
    pub fn stdout(format: OutputFormat) -> Self {
        OutputSpec {
            format,
            dest: Destination::Stdout,
        }
    }

    /// Parses `"<tag>:<destination>"`; an empty or `-` destination is stdout,
    /// a leading `!` a command pipe. A bare `<tag>` also means stdout.
    pub fn parse(spec: &str) -> Result<Self, OutputError> {
        let mut parts = spec.splitn(2, ':');
        let tag_part = parts.next().unwrap_or("");
        let mut tag_chars = tag_part.chars();
        let tag = tag_chars.next().unwrap_or('a');
        if tag_chars.next().is_some() {
            return Err(OutputError::BadFormat(tag));
        }
        let format = OutputFormat::from_tag(tag)?;
        let dest = match parts.next() {
            None | Some("") | Some("-") => Destination::Stdout,
            Some(cmd) if cmd.starts_with('!') => Destination::Pipe(cmd[1..].to_string()),
            Some(path) => Destination::File(PathBuf::from(path)),
        };
        Ok(OutputSpec { format, dest })
    }

    fn key(&self) -> String {
        match &self.dest {
            Destination::Stdout => "-".to_string(),
            Destination::File(p) => p.display().to_string(),
            Destination::Pipe(cmd) => format!("!{}", cmd),
        }
    }
}

/// Encodes a radiometric triple into the 4-byte shared-exponent format:
/// three mantissa bytes scaled to the largest component plus an offset
/// exponent byte. All-zero bytes encode black.
pub fn encode_shared_exponent(c: DColor) -> [u8; 4] {
    const EXCESS: i32 = 128;
    let max = c.r.max(c.g).max(c.b);
    if max <= 1e-32 {
        return [0, 0, 0, 0];
    }
    let (mantissa, exp) = frexp(max);
    let scale = mantissa * 255.9999 / max;
    [
        (c.r.max(0.0) * scale) as u8,
        (c.g.max(0.0) * scale) as u8,
        (c.b.max(0.0) * scale) as u8,
        (exp + EXCESS) as u8,
    ]
}

/// Decodes the 4-byte shared-exponent format back to a triple.
pub fn decode_shared_exponent(bytes: [u8; 4]) -> DColor {
    const EXCESS: i32 = 128;
    if bytes[3] == 0 {
        return DColor::zero();
    }
    let scale = (bytes[3] as i32 - EXCESS - 8) as f64;
    let scale = scale.exp2();
    DColor {
        r: (bytes[0] as f64 + 0.5) * scale,
        g: (bytes[1] as f64 + 0.5) * scale,
        b: (bytes[2] as f64 + 0.5) * scale,
    }
}

/// Splits `v > 0` into `(m, e)` with `v = m * 2^e` and `m` in [0.5, 1).
fn frexp(v: f64) -> (f64, i32) {
    debug_assert!(v > 0.0);
    let e = v.log2().floor() as i32 + 1;
    (v * (-e as f64).exp2(), e)
}

/// In-memory sink endpoint for tests and embedding: clones share the buffer.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct StreamOut {
    writer: Box<dyn Write + Send>,
    child: Option<Child>,
    desc: String,
}

impl StreamOut {
    fn put_record(&mut self, format: OutputFormat, bins: &[DColor]) -> io::Result<()> {
        match format {
            OutputFormat::Ascii => {
                let line = bins
                    .iter()
                    .map(|b| format!("{:e} {:e} {:e}", b.r, b.g, b.b))
                    .join("\t");
                writeln!(self.writer, "{}", line)?;
            }
            OutputFormat::Float => {
                for b in bins {
                    for &v in &[b.r, b.g, b.b] {
                        self.writer.write_all(&(v as f32).to_le_bytes())?;
                    }
                }
            }
            OutputFormat::Double => {
                for b in bins {
                    for &v in &[b.r, b.g, b.b] {
                        self.writer.write_all(&v.to_le_bytes())?;
                    }
                }
            }
            OutputFormat::Color => {
                for b in bins {
                    self.writer.write_all(&encode_shared_exponent(*b))?;
                }
            }
        }
        self.writer.flush()
    }

    fn close(self) -> Result<(), OutputError> {
        let StreamOut {
            mut writer,
            child,
            desc,
        } = self;
        writer
            .flush()
            .map_err(|_| OutputError::Close(desc.clone()))?;
        drop(writer);
        if let Some(mut child) = child {
            let status = child.wait().map_err(|_| OutputError::Close(desc.clone()))?;
            if !status.success() {
                return Err(OutputError::Close(desc));
            }
        }
        Ok(())
    }
}

/// Open output streams, keyed by destination so modifiers sharing one
/// destination share one append-only stream.
#[derive(Default)]
pub struct SinkTable {
    streams: HashMap<String, StreamOut>,
}

impl SinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a stream exists for the spec's destination and returns its key.
    pub fn open(&mut self, spec: &OutputSpec) -> Result<String, OutputError> {
        let key = spec.key();
        if !self.streams.contains_key(&key) {
            let stream = Self::connect(spec)?;
            self.streams.insert(key.clone(), stream);
        }
        Ok(key)
    }

    /// Registers an in-memory endpoint under the spec's destination key,
    /// replacing whatever would have been opened for it.
    pub fn open_buffer(&mut self, spec: &OutputSpec, buffer: SharedBuffer) -> String {
        let key = spec.key();
        self.streams.insert(
            key.clone(),
            StreamOut {
                writer: Box::new(buffer),
                child: None,
                desc: format!("buffer:{}", key),
            },
        );
        key
    }

    fn connect(spec: &OutputSpec) -> Result<StreamOut, OutputError> {
        let desc = spec.key();
        let (writer, child): (Box<dyn Write + Send>, Option<Child>) = match &spec.dest {
            Destination::Stdout => (Box::new(io::stdout()), None),
            Destination::File(path) => {
                let file = File::create(path).map_err(|e| OutputError::Open {
                    dest: desc.clone(),
                    source: e,
                })?;
                (Box::new(BufWriter::new(file)), None)
            }
            Destination::Pipe(cmd) => {
                let mut child = Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .stdin(Stdio::piped())
                    .spawn()
                    .map_err(|e| OutputError::Open {
                        dest: desc.clone(),
                        source: e,
                    })?;
                let stdin = child.stdin.take().expect("piped stdin");
                (Box::new(stdin), Some(child))
            }
        };
        Ok(StreamOut {
            writer,
            child,
            desc,
        })
    }

    pub fn put_record(
        &mut self,
        key: &str,
        format: OutputFormat,
        bins: &[DColor],
    ) -> Result<(), OutputError> {
        let stream = self
            .streams
            .get_mut(key)
            .unwrap_or_else(|| panic!("no output stream under key '{}'", key));
        stream.put_record(format, bins)?;
        Ok(())
    }

    /// Flushes and closes every stream; pipe children must exit cleanly.
    pub fn close_all(self) -> Result<(), OutputError> {
        for (_, stream) in self.streams {
            stream.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_exponent_round_trip() {
        for &(r, g, b) in &[
            (0.0, 0.0, 0.0),
            (1.0, 0.5, 0.25),
            (123.0, 0.004, 17.5),
            (1e-6, 2e-6, 3e-6),
        ] {
            let c = DColor { r, g, b };
            let decoded = decode_shared_exponent(encode_shared_exponent(c));
            let max = r.max(g).max(b);
            // Quantization error is bounded by one mantissa step at the
            // shared exponent.
            let tol = (max / 256.0).max(1e-32) * 1.01;
            assert!((decoded.r - r).abs() <= tol, "{} vs {}", decoded.r, r);
            assert!((decoded.g - g).abs() <= tol, "{} vs {}", decoded.g, g);
            assert!((decoded.b - b).abs() <= tol, "{} vs {}", decoded.b, b);
        }
    }

    #[test]
    fn spec_parsing() {
        let s = OutputSpec::parse("a").unwrap();
        assert_eq!(s.format, OutputFormat::Ascii);
        assert_eq!(s.dest, Destination::Stdout);

        let s = OutputSpec::parse("d:out.dat").unwrap();
        assert_eq!(s.format, OutputFormat::Double);
        assert_eq!(s.dest, Destination::File(PathBuf::from("out.dat")));

        let s = OutputSpec::parse("c:!cat").unwrap();
        assert_eq!(s.format, OutputFormat::Color);
        assert_eq!(s.dest, Destination::Pipe("cat".to_string()));

        assert!(OutputSpec::parse("x:file").is_err());
    }

    #[test]
    fn ascii_records_share_a_stream_in_order() {
        let mut sinks = SinkTable::new();
        let spec = OutputSpec::stdout(OutputFormat::Ascii);
        let buffer = SharedBuffer::new();
        let key = sinks.open_buffer(&spec, buffer.clone());

        let one = DColor {
            r: 1.0,
            g: 2.0,
            b: 3.0,
        };
        sinks.put_record(&key, OutputFormat::Ascii, &[one]).unwrap();
        sinks
            .put_record(&key, OutputFormat::Ascii, &[DColor::zero(), one])
            .unwrap();

        let text = String::from_utf8(buffer.contents()).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "1e0 2e0 3e0");
        assert_eq!(lines[1], "0e0 0e0 0e0\t1e0 2e0 3e0");
    }
}
