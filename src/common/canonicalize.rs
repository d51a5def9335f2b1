/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::io::Write;

/// Relaxed canonicalization of a header value: folded line breaks and runs
/// of WSP collapse into a single space, surrounding whitespace is dropped.
pub(crate) fn relaxed_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    let mut pending_wsp = false;

    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' => {
                pending_wsp = true;
            }
            '\r' => {
                let mut ahead = chars.clone();
                if ahead.next() == Some('\n') && matches!(ahead.next(), Some(' ' | '\t')) {
                    // folded line break, absorbed into the whitespace run
                    chars.next();
                    pending_wsp = true;
                } else {
                    if pending_wsp {
                        out.push(' ');
                        pending_wsp = false;
                    }
                    out.push('\r');
                }
            }
            _ => {
                if pending_wsp {
                    out.push(' ');
                    pending_wsp = false;
                }
                out.push(ch);
            }
        }
    }

    out.trim().to_string()
}

/// Relaxed canonicalization of one header field, `lowercase(name):value`,
/// without a trailing CRLF.
pub(crate) fn relaxed_header(name: &str, value: &str) -> String {
    let mut out = String::with_capacity(name.len() + value.len() + 1);
    for ch in name.chars() {
        if !ch.is_ascii_whitespace() {
            out.push(ch.to_ascii_lowercase());
        }
    }
    out.push(':');
    out.push_str(&relaxed_value(value));
    out
}

/// Streams the relaxed canonical form of a message body into `hasher`:
/// line terminators become CRLF, WSP runs collapse to a single space,
/// trailing whitespace and trailing empty lines are dropped, and the output
/// always ends with exactly one CRLF.
pub(crate) fn relaxed_body(body: &[u8], mut hasher: impl Write) -> std::io::Result<()> {
    let mut crlf_seq = 0;
    let mut last_ch = 0;

    for &ch in body {
        match ch {
            b' ' | b'\t' => {
                while crlf_seq > 0 {
                    hasher.write_all(b"\r\n")?;
                    crlf_seq -= 1;
                }
            }
            b'\n' => {
                crlf_seq += 1;
            }
            b'\r' => {}
            _ => {
                while crlf_seq > 0 {
                    hasher.write_all(b"\r\n")?;
                    crlf_seq -= 1;
                }
                if last_ch == b' ' || last_ch == b'\t' {
                    hasher.write_all(b" ")?;
                }
                hasher.write_all(&[ch])?;
            }
        }
        last_ch = ch;
    }

    hasher.write_all(b"\r\n")
}

#[cfg(test)]
mod test {
    use super::{relaxed_body, relaxed_header, relaxed_value};

    #[test]
    fn relaxed_header_canonicalization() {
        for (name, value, expected) in [
            ("A", " X\r\n", "a:X"),
            ("B ", " Y\t\r\n\tZ  \r\n", "b:Y Z"),
            (
                "From",
                " John\tdoe <jdoe@domain.com>\t\r\n",
                "from:John doe <jdoe@domain.com>",
            ),
            ("SUBJECT", "\ttest  \t  \r\n", "subject:test"),
            ("Empty", "\r\n", "empty:"),
        ] {
            assert_eq!(relaxed_header(name, value), expected);
        }
    }

    #[test]
    fn relaxed_value_idempotent() {
        for value in [
            " softfail (transitioning) client-ip=10.0.0.1;\r\n\thelo=d1.example\r\n",
            "i=1; a=rsa-sha256; d=example.org; s=arc; b=",
            "\t \t x \t ",
        ] {
            let once = relaxed_value(value);
            assert_eq!(relaxed_value(&once), once);
        }
    }

    #[test]
    fn relaxed_body_canonicalization() {
        for (body, expected) in [
            (" C \r\nD \t E\r\n", " C\r\nD E\r\n"),
            (" body \t   \r\n\r\n\r\n", " body\r\n"),
            ("abc", "abc\r\n"),
            ("", "\r\n"),
        ] {
            let mut out = Vec::new();
            relaxed_body(body.as_bytes(), &mut out).unwrap();
            assert_eq!(String::from_utf8(out).unwrap(), expected, "body {:?}", body);

            // canonical output is a fixed point
            let mut again = Vec::new();
            relaxed_body(expected.as_bytes(), &mut again).unwrap();
            assert_eq!(String::from_utf8(again).unwrap(), expected);
        }
    }
}
