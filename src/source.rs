//! Record sources.

use std::io::{self, prelude::*};
use std::mem;

/// Creates a word tokenizer over the reader.
pub fn words<R: BufRead>(reader: R) -> Words<R> {
    Words {
        reader,
        word: String::new(),
        done: false,
    }
}

/// Word tokenizer. Yields maximal sequences of ASCII letters, any other byte separates words.
///
/// The input is consumed through the reader's buffer, so apart from that buffer only the current word
/// is held in memory however long the input lines are. Non-ASCII bytes, including bytes of invalid
/// UTF-8 sequences, are separators. A word interrupted by a read error is dropped.
pub struct Words<R> {
    reader: R,
    word: String,
    done: bool,
}

impl<R: BufRead> Iterator for Words<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let buf = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };

            if buf.is_empty() {
                self.done = true;
                return match self.word.is_empty() {
                    true => None,
                    false => Some(Ok(mem::take(&mut self.word))),
                };
            }

            let mut consumed = 0;
            let mut complete = false;
            for &byte in buf {
                consumed += 1;
                if byte.is_ascii_alphabetic() {
                    self.word.push(char::from(byte));
                } else if !self.word.is_empty() {
                    complete = true;
                    break;
                }
            }
            self.reader.consume(consumed);

            if complete {
                return Some(Ok(mem::take(&mut self.word)));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use rstest::*;

    use super::words;

    struct FailingReader {
        data: Option<&'static [u8]>,
    }

    impl io::Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.take() {
                Some(data) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(io::Error::new(io::ErrorKind::Other, "device failure")),
            }
        }
    }

    #[rstest]
    #[case("", vec![])]
    #[case("\n\n", vec![])]
    #[case("I have a dream", vec!["I", "have", "a", "dream"])]
    #[case("one,two;  three\n\nfour-five 6 sev3n\n", vec!["one", "two", "three", "four", "five", "sev", "n"])]
    #[case("caf\u{e9} na\u{ef}ve", vec!["caf", "na", "ve"])]
    fn test_words(#[case] text: &str, #[case] expected: Vec<&str>) {
        let actual: io::Result<Vec<String>> = words(io::Cursor::new(text)).collect();
        assert_eq!(actual.unwrap(), expected);
    }

    #[test]
    fn test_words_span_buffer_refills() {
        let text = "alpha beta,gamma\ndelta ".repeat(100);
        let reader = io::BufReader::with_capacity(3, io::Cursor::new(text));

        let actual: io::Result<Vec<String>> = words(reader).collect();
        let expected: Vec<&str> = ["alpha", "beta", "gamma", "delta"].repeat(100);
        assert_eq!(actual.unwrap(), expected);
    }

    #[test]
    fn test_words_invalid_utf8() {
        let actual: io::Result<Vec<String>> = words(io::BufReader::new(&b"ok \xffvalid\xfe\n"[..])).collect();
        assert_eq!(actual.unwrap(), vec!["ok", "valid"]);
    }

    #[test]
    fn test_words_read_error() {
        let reader = io::BufReader::new(FailingReader { data: Some(b"ok wor") });
        let mut tokens = words(reader);

        assert_eq!(tokens.next().unwrap().unwrap(), "ok");
        assert_eq!(tokens.next().unwrap().unwrap_err().kind(), io::ErrorKind::Other);
        assert!(tokens.next().is_none());
    }
}
