//! Low-level framing for the interrogation datafile format.
//!
//! The format is a plain-text stream of whitespace-separated integers, with
//! variable-length string fields framed by a length prefix: the byte length,
//! one separator character, then exactly that many bytes. An empty string
//! writes only its `0` length. This framing is a wire contract shared with
//! an existing deployed reader; the field ordering in each record must not
//! change.
//!
//! [`DatafileWriter`] appends to a growable string; [`DatafileReader`] is a
//! cursor over the whole file contents. Neither does any I/O of its own.

use crate::error::DbError;

/// Appends datafile fields to an output buffer.
///
/// This is a thin wrapper over `String`; it exists so every record spells
/// its fields the same way and the string framing lives in exactly one
/// place.
#[derive(Debug, Default)]
pub struct DatafileWriter {
    out: String,
}

impl DatafileWriter {
    pub fn new() -> Self {
        DatafileWriter::default()
    }

    /// Append an unsigned integer field.
    pub fn write_u32(&mut self, value: u32) {
        self.out.push_str(&value.to_string());
        self.out.push(' ');
    }

    /// Append a signed integer field.
    pub fn write_i64(&mut self, value: i64) {
        self.out.push_str(&value.to_string());
        self.out.push(' ');
    }

    /// Append a length-prefixed string field.
    ///
    /// The length is the byte length; an empty string writes only `0`.
    pub fn write_string(&mut self, value: &str) {
        self.out.push_str(&value.len().to_string());
        self.out.push(' ');
        if !value.is_empty() {
            self.out.push_str(value);
            self.out.push(' ');
        }
    }

    /// End the current record line.
    pub fn end_line(&mut self) {
        self.out.push('\n');
    }

    /// Consume the writer, returning the accumulated text.
    pub fn finish(self) -> String {
        self.out
    }
}

/// Cursor over datafile contents.
pub struct DatafileReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> DatafileReader<'a> {
    pub fn new(input: &'a str) -> Self {
        DatafileReader {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// Read the next whitespace-delimited token as raw bytes.
    fn next_token(&mut self) -> Result<&'a [u8], DbError> {
        self.skip_whitespace();
        if self.pos >= self.input.len() {
            return Err(DbError::datafile("unexpected end of file"));
        }
        let start = self.pos;
        while self.pos < self.input.len() && !self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        Ok(&self.input[start..self.pos])
    }

    /// Read an unsigned integer field.
    pub fn next_u32(&mut self) -> Result<u32, DbError> {
        let token = self.next_token()?;
        std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| DbError::datafile("expected unsigned integer"))
    }

    /// Read a signed integer field.
    pub fn next_i64(&mut self) -> Result<i64, DbError> {
        let token = self.next_token()?;
        std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| DbError::datafile("expected integer"))
    }

    /// Read a length-prefixed string field, as previously written by
    /// [`DatafileWriter::write_string`].
    pub fn next_string(&mut self) -> Result<String, DbError> {
        let length = self.next_u32()? as usize;
        if length == 0 {
            return Ok(String::new());
        }
        // Skip exactly one separator character, then take `length` bytes
        // verbatim; the payload may itself contain whitespace.
        self.pos += 1;
        if self.pos + length > self.input.len() {
            return Err(DbError::datafile("string field runs past end of file"));
        }
        let bytes = &self.input[self.pos..self.pos + length];
        self.pos += length;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DbError::datafile("string field is not valid utf-8"))
    }

    /// True if only whitespace remains.
    pub fn at_eof(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.input.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_round_trip() {
        let mut w = DatafileWriter::new();
        w.write_u32(42);
        w.write_i64(-7);
        w.end_line();
        let text = w.finish();

        let mut r = DatafileReader::new(&text);
        assert_eq!(r.next_u32().unwrap(), 42);
        assert_eq!(r.next_i64().unwrap(), -7);
        assert!(r.at_eof());
    }

    #[test]
    fn strings_round_trip_with_embedded_whitespace() {
        let mut w = DatafileWriter::new();
        w.write_string("int bar(const char *)");
        w.write_string("");
        w.write_string("Foo");
        let text = w.finish();

        let mut r = DatafileReader::new(&text);
        assert_eq!(r.next_string().unwrap(), "int bar(const char *)");
        assert_eq!(r.next_string().unwrap(), "");
        assert_eq!(r.next_string().unwrap(), "Foo");
    }

    #[test]
    fn empty_string_writes_only_its_length() {
        let mut w = DatafileWriter::new();
        w.write_string("");
        assert_eq!(w.finish(), "0 ");
    }

    #[test]
    fn truncated_string_is_an_error() {
        let mut r = DatafileReader::new("10 short");
        assert!(r.next_string().is_err());
    }

    #[test]
    fn eof_is_an_error_not_a_panic() {
        let mut r = DatafileReader::new("  \n ");
        assert!(r.next_u32().is_err());
    }
}
