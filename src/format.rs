//! Run file formats.

use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;

/// Run format interface. Defines how records are written to and read back from a run file.
///
/// A format must round-trip every record it accepts: decoding the encoded records yields
/// the same records in the same order.
pub trait RunFormat<T> {
    /// Encodes a record to the writer.
    fn encode<W: Write>(writer: &mut W, item: &T) -> io::Result<()>;

    /// Decodes the next record from the reader. Returns [`None`] at the end of the run.
    fn decode<R: BufRead>(reader: &mut R) -> io::Result<Option<T>>;
}

/// Newline delimited text format. Every record is stored as a single line.
///
/// This is the destination format of a text sort: one record per line, newline-terminated.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

impl RunFormat<String> for LineFormat {
    fn encode<W: Write>(writer: &mut W, item: &String) -> io::Result<()> {
        if item.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "record contains a line separator",
            ));
        }
        writer.write_all(item.as_bytes())?;
        writer.write_all(b"\n")
    }

    fn decode<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        // only the separator is stripped, a trailing '\r' belongs to the record
        if line.ends_with('\n') {
            line.pop();
        }

        return Ok(Some(line));
    }
}

/// RMP (Rust MessagePack) run format.
/// It uses MessagePack as a data serialization format.
/// For more information see https://msgpack.org/.
#[derive(Debug)]
pub struct RmpFormat<T> {
    item_type: PhantomData<T>,
}

impl<T> RunFormat<T> for RmpFormat<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    fn encode<W: Write>(writer: &mut W, item: &T) -> io::Result<()> {
        rmp_serde::encode::write(writer, item).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    fn decode<R: BufRead>(reader: &mut R) -> io::Result<Option<T>> {
        if reader.fill_buf()?.is_empty() {
            return Ok(None);
        }
        match rmp_serde::decode::from_read(reader) {
            Ok(item) => Ok(Some(item)),
            Err(err) => Err(io::Error::new(io::ErrorKind::InvalidData, err)),
        }
    }
}
