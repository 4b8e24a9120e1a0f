use chronicle_types::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

const INITIAL_CAPACITY: usize = 64 * 1024;
const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// Reads a line-delimited file as an iterator of lossily-decoded lines.
///
/// Lines may contain invalid UTF-8 (tolerated via lossy conversion) and grow
/// up to `max_line_bytes` (default 64 MiB); beyond that the reader yields
/// `LineTooLarge` and further iteration stops. Zero-length lines are
/// dropped silently rather than yielded as empty strings.
pub struct LineReader<R> {
    inner: BufReader<R>,
    path: PathBuf,
    max_line_bytes: usize,
    offset: u64,
    done: bool,
}

impl LineReader<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| Error::FileUnreadable {
            path: path.clone(),
            source,
        })?;
        Ok(Self::with_capacity(file, path, MAX_LINE_BYTES))
    }
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R, path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(inner, path, MAX_LINE_BYTES)
    }

    pub fn with_capacity(inner: R, path: impl Into<PathBuf>, max_line_bytes: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(INITIAL_CAPACITY, inner),
            path: path.into(),
            max_line_bytes,
            offset: 0,
            done: false,
        }
    }

    /// Reads one raw line (without its trailing `\n`/`\r\n`), or `None` at
    /// EOF. Growth doubles the accumulation buffer implicitly via `Vec`
    /// until `max_line_bytes`, at which point this errors without
    /// attempting to resynchronise to the next line.
    fn read_raw_line(&mut self) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        let start_offset = self.offset;
        let mut buf: Vec<u8> = Vec::with_capacity(INITIAL_CAPACITY.min(self.max_line_bytes));
        loop {
            let available = self.inner.fill_buf().map_err(|source| Error::FileUnreadable {
                path: self.path.clone(),
                source,
            })?;
            if available.is_empty() {
                self.done = true;
                if buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(strip_crlf(buf)));
            }
            if let Some(pos) = available.iter().position(|&b| b == b'\n') {
                buf.extend_from_slice(&available[..pos]);
                let consumed = pos + 1;
                self.inner.consume(consumed);
                self.offset += consumed as u64;
                return Ok(Some(strip_crlf(buf)));
            }
            buf.extend_from_slice(available);
            let consumed = available.len();
            self.inner.consume(consumed);
            self.offset += consumed as u64;
            if buf.len() > self.max_line_bytes {
                self.done = true;
                return Err(Error::LineTooLarge {
                    path: self.path.clone(),
                    offset: start_offset,
                });
            }
        }
    }
}

fn strip_crlf(mut buf: Vec<u8>) -> Vec<u8> {
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    buf
}

impl<R: Read> Iterator for LineReader<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.read_raw_line() {
                Ok(None) => return None,
                Ok(Some(bytes)) if bytes.is_empty() => continue,
                Ok(Some(bytes)) => return Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn skips_blank_lines() {
        let data = b"a\n\nb\n\n\nc".to_vec();
        let reader = LineReader::new(Cursor::new(data), "test.jsonl");
        let lines: Vec<String> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn tolerates_invalid_utf8() {
        let mut data = b"valid\n".to_vec();
        data.extend_from_slice(&[0xff, 0xfe, b'\n']);
        data.extend_from_slice(b"trailing");
        let reader = LineReader::new(Cursor::new(data), "test.jsonl");
        let lines: Vec<String> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(lines[0], "valid");
        assert_eq!(lines[2], "trailing");
    }

    #[test]
    fn line_within_cap_succeeds() {
        let data = vec![b'x'; 100];
        let reader = LineReader::with_capacity(Cursor::new(data.clone()), "test.jsonl", 100);
        let lines: Vec<String> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 100);
    }

    #[test]
    fn line_over_cap_errors() {
        let data = vec![b'x'; 101];
        let mut reader = LineReader::with_capacity(Cursor::new(data), "test.jsonl", 100);
        let first = reader.next().unwrap();
        assert!(matches!(first, Err(Error::LineTooLarge { .. })));
    }

    #[test]
    fn crlf_is_stripped() {
        let data = b"a\r\nb\r\n".to_vec();
        let reader = LineReader::new(Cursor::new(data), "test.jsonl");
        let lines: Vec<String> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(lines, vec!["a", "b"]);
    }
}
