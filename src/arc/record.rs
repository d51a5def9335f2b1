/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::fmt::Display;

use mail_parser::decoders::base64::base64_decode;

use crate::{common::tag::TagList, Error};

use super::ChainValidation;

/// A typed view over an ARC-Message-Signature or ARC-Seal tag set.
///
/// The record keeps the tag order of the string it was parsed from, so a
/// record built from a signing template emits its tags in template order
/// even after `i=`, `t=`, `bh=`, `cv=` or `b=` were rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    tags: TagList,
}

impl SignatureRecord {
    pub fn parse(value: &str) -> crate::Result<Self> {
        Ok(SignatureRecord {
            tags: TagList::parse(value)?,
        })
    }

    /// The `i=` instance, constrained to `1..=50`.
    pub fn instance(&self) -> crate::Result<u32> {
        let i = self.tags.get("i").ok_or(Error::MissingTag("i"))?;
        let i = i
            .parse::<u32>()
            .map_err(|_| Error::Malformed(format!("invalid i= value {:?}", i)))?;
        if (1..=50).contains(&i) {
            Ok(i)
        } else {
            Err(Error::Malformed(format!(
                "instance i={} outside the valid range",
                i
            )))
        }
    }

    pub fn domain(&self) -> crate::Result<&str> {
        match self.tags.get("d") {
            Some(d) if !d.is_empty() => Ok(d),
            _ => Err(Error::MissingTag("d")),
        }
    }

    pub fn selector(&self) -> crate::Result<&str> {
        match self.tags.get("s") {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(Error::MissingTag("s")),
        }
    }

    /// The signed header names from the `h=` tag, in their listed order.
    pub fn headers(&self) -> crate::Result<Vec<&str>> {
        let h = self.tags.get("h").ok_or(Error::MissingTag("h"))?;
        let mut headers = Vec::new();
        for name in h.split(':') {
            let name = name.trim();
            if name.is_empty()
                || name
                    .chars()
                    .any(|ch| ch.is_ascii_whitespace() || ch.is_ascii_control())
            {
                return Err(Error::Malformed(format!(
                    "invalid header name {:?} in h= tag",
                    name
                )));
            }
            headers.push(name);
        }
        Ok(headers)
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.tags.get("t").and_then(|t| t.parse().ok())
    }

    pub fn expiration(&self) -> Option<u64> {
        self.tags.get("x").and_then(|x| x.parse().ok())
    }

    /// Fails when the `x=` expiration lies in the past.
    pub fn validate(&self, now: u64) -> crate::Result<()> {
        match self.expiration() {
            Some(expiration) if expiration < now => Err(Error::Malformed(format!(
                "signature expired at {}",
                expiration
            ))),
            _ => Ok(()),
        }
    }

    /// The decoded `bh=` body hash.
    pub fn body_hash(&self) -> crate::Result<Vec<u8>> {
        match self.tags.get("bh") {
            Some(bh) if !bh.is_empty() => decode_b64(bh),
            _ => Err(Error::MissingTag("bh")),
        }
    }

    /// The decoded `b=` signature.
    pub fn signature(&self) -> crate::Result<Vec<u8>> {
        match self.tags.get("b") {
            Some(b) if !b.is_empty() => decode_b64(b),
            _ => Err(Error::MissingTag("b")),
        }
    }

    /// The `cv=` chain validity, present on Seal records only.
    pub fn chain_validation(&self) -> crate::Result<ChainValidation> {
        ChainValidation::parse(self.tags.get("cv").ok_or(Error::MissingTag("cv"))?)
    }

    /// Rejects algorithms and canonicalization modes other than the fixed
    /// `rsa-sha256` / `relaxed/relaxed` when the tags are present.
    pub(crate) fn check_algorithm(&self) -> crate::Result<()> {
        if let Some(a) = self.tags.get("a") {
            if !a.eq_ignore_ascii_case("rsa-sha256") {
                return Err(Error::Malformed(format!("unsupported algorithm {:?}", a)));
            }
        }
        if let Some(c) = self.tags.get("c") {
            if !c.eq_ignore_ascii_case("relaxed/relaxed") {
                return Err(Error::Malformed(format!(
                    "unsupported canonicalization {:?}",
                    c
                )));
            }
        }
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.tags.set(name, value);
    }

    /// Serializes in template order with the `b=` value cleared.
    pub fn to_unsigned_string(&self) -> String {
        self.tags.to_unsigned_string()
    }
}

impl Display for SignatureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.tags, f)
    }
}

fn decode_b64(value: &str) -> crate::Result<Vec<u8>> {
    base64_decode(
        value
            .bytes()
            .filter(|byte| !byte.is_ascii_whitespace())
            .collect::<Vec<_>>()
            .as_slice(),
    )
    .ok_or_else(|| Error::Malformed("invalid base64 value".to_string()))
}

/// Clears the value of the first `b=` tag of a raw header value, keeping
/// everything else byte-for-byte. The tag is located at tag boundaries so
/// base64 text of a preceding `bh=` tag is never clipped.
pub(crate) fn strip_signature(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut at_tag_start = true;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b';' => {
                at_tag_start = true;
            }
            b' ' | b'\t' | b'\r' | b'\n' => (),
            b'b' if at_tag_start => {
                let mut eq = pos + 1;
                while matches!(bytes.get(eq), Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n'))
                {
                    eq += 1;
                }
                if bytes.get(eq) == Some(&b'=') {
                    let mut end = eq + 1;
                    while end < bytes.len() && bytes[end] != b';' {
                        end += 1;
                    }
                    let mut out = String::with_capacity(value.len());
                    out.push_str(&value[..eq + 1]);
                    out.push_str(&value[end..]);
                    return out;
                }
                at_tag_start = false;
            }
            _ => {
                at_tag_start = false;
            }
        }
        pos += 1;
    }

    value.to_string()
}
