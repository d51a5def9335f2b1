/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

/// Iterates over the raw header fields of a message, yielding
/// `(name, value)` slices with the value still folded and including its
/// terminating CRLF.
pub(crate) struct HeaderIterator<'x> {
    message: &'x [u8],
    pos: usize,
    done: bool,
}

impl<'x> HeaderIterator<'x> {
    pub fn new(message: &'x [u8]) -> Self {
        HeaderIterator {
            message,
            pos: 0,
            done: false,
        }
    }

    /// Offset of the first body byte, valid once iteration has finished.
    pub fn body_offset(&self) -> usize {
        self.pos
    }
}

impl<'x> Iterator for HeaderIterator<'x> {
    type Item = (&'x [u8], &'x [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let bytes = self.message;
        let start = self.pos;

        match bytes.get(start) {
            None => {
                self.done = true;
                return None;
            }
            Some(b'\n') => {
                // empty line, headers end here
                self.pos = start + 1;
                self.done = true;
                return None;
            }
            Some(b'\r') if bytes.get(start + 1) == Some(&b'\n') => {
                self.pos = start + 2;
                self.done = true;
                return None;
            }
            _ => (),
        }

        let mut colon = None;
        let mut pos = start;
        while pos < bytes.len() {
            match bytes[pos] {
                b':' if colon.is_none() => {
                    colon = Some(pos);
                }
                b'\n' if !matches!(bytes.get(pos + 1), Some(b' ') | Some(b'\t')) => {
                    self.pos = pos + 1;
                    return Some(match colon {
                        Some(colon) => (&bytes[start..colon], &bytes[colon + 1..pos + 1]),
                        // no colon on this line, surface it as a bare name
                        None => (&bytes[start..pos + 1], b"".as_ref()),
                    });
                }
                _ => (),
            }
            pos += 1;
        }

        // truncated message without a final newline
        self.pos = bytes.len();
        self.done = true;
        match colon {
            Some(colon) => Some((&bytes[start..colon], &bytes[colon + 1..])),
            None => Some((&bytes[start..], b"".as_ref())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::HeaderIterator;

    #[test]
    fn header_iterator() {
        for (message, headers, body) in [
            (
                "From: a\r\nTo: b\r\nEmpty:\r\nMulti: 1\r\n 2\r\nSubject: c\r\n\r\nNot-header: ignore\r\n",
                vec![
                    ("From", " a\r\n"),
                    ("To", " b\r\n"),
                    ("Empty", "\r\n"),
                    ("Multi", " 1\r\n 2\r\n"),
                    ("Subject", " c\r\n"),
                ],
                "Not-header: ignore\r\n",
            ),
            (
                "A: X\r\nB : Y\t\r\n\tZ  \r\n\r\n C \r\nD \t E\r\n",
                vec![("A", " X\r\n"), ("B ", " Y\t\r\n\tZ  \r\n")],
                " C \r\nD \t E\r\n",
            ),
            ("Name: value", vec![("Name", " value")], ""),
            ("No colon line\r\n\r\nbody", vec![("No colon line\r\n", "")], "body"),
        ] {
            let mut iterator = HeaderIterator::new(message.as_bytes());
            let parsed = (&mut iterator)
                .map(|(name, value)| {
                    (
                        std::str::from_utf8(name).unwrap(),
                        std::str::from_utf8(value).unwrap(),
                    )
                })
                .collect::<Vec<_>>();
            assert_eq!(parsed, headers);
            assert_eq!(
                &message.as_bytes()[iterator.body_offset()..],
                body.as_bytes()
            );
        }
    }
}
