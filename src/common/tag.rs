/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::fmt::Display;

use crate::Error;

/// An ordered `k=v; k=v; …` tag list.
///
/// Parsing keeps the tags in their original order and emission replays that
/// order, so a signature built from a template string serializes with the
/// template's exact tag sequence even after individual tags were rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagList {
    tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tag {
    name: String,
    value: String,
}

impl TagList {
    pub fn parse(data: &str) -> crate::Result<Self> {
        let mut tags: Vec<Tag> = Vec::new();
        let mut parts = data.split(';').peekable();

        while let Some(part) = parts.next() {
            if parts.peek().is_none() && collapse_fws(part).is_empty() {
                // trailing ';' or whitespace
                break;
            }
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Malformed(format!("tag without '=' in {:?}", part)))?;
            let name = collapse_fws(name);
            if !is_tag_name(&name) {
                return Err(Error::Malformed(format!("invalid tag name {:?}", name)));
            }
            let value = collapse_fws(value);
            if value.chars().any(|ch| ch.is_ascii_control()) {
                return Err(Error::Malformed(format!(
                    "control character in value of tag {:?}",
                    name
                )));
            }
            if tags.iter().any(|tag| tag.name == name) {
                return Err(Error::Malformed(format!("duplicate tag {:?}", name)));
            }
            tags.push(Tag { name, value });
        }

        Ok(TagList { tags })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.name == name)
            .map(|tag| tag.value.as_str())
    }

    /// Rewrites a tag in place, keeping its position, or appends it.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(tag) = self.tags.iter_mut().find(|tag| tag.name == name) {
            tag.value = value;
        } else {
            self.tags.push(Tag {
                name: name.to_string(),
                value,
            });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .map(|tag| (tag.name.as_str(), tag.value.as_str()))
    }

    /// Serializes with the `b=` value cleared, the form covered by the
    /// signature itself.
    pub fn to_unsigned_string(&self) -> String {
        let mut out = String::with_capacity(64);
        self.write(&mut out, true);
        out
    }

    fn write(&self, out: &mut String, unsigned: bool) {
        for (pos, tag) in self.tags.iter().enumerate() {
            if pos > 0 {
                out.push_str("; ");
            }
            out.push_str(&tag.name);
            out.push('=');
            if unsigned && tag.name == "b" {
                continue;
            }
            if tag.name == "h" && tag.value.contains(':') {
                for (num, item) in tag.value.split(':').enumerate() {
                    if num > 0 {
                        out.push_str(" : ");
                    }
                    for ch in item.trim().chars() {
                        out.push(ch.to_ascii_lowercase());
                    }
                }
            } else {
                out.push_str(&tag.value);
            }
        }
    }
}

impl Display for TagList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::with_capacity(64);
        self.write(&mut out, false);
        f.write_str(&out)
    }
}

fn is_tag_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .map_or(false, |ch| ch.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

// Folding whitespace runs become a single space, leading and trailing
// whitespace is dropped.
fn collapse_fws(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_wsp = false;
    for ch in value.chars() {
        if matches!(ch, ' ' | '\t' | '\r' | '\n') {
            pending_wsp = !out.is_empty();
        } else {
            if pending_wsp {
                out.push(' ');
                pending_wsp = false;
            }
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::TagList;

    #[test]
    fn tag_list_parse() {
        let tags = TagList::parse(
            "i=1; a=rsa-sha256; c=relaxed/relaxed; d=example.org;\r\n\ts=arc; t=; b=",
        )
        .unwrap();
        assert_eq!(tags.get("i"), Some("1"));
        assert_eq!(tags.get("a"), Some("rsa-sha256"));
        assert_eq!(tags.get("d"), Some("example.org"));
        assert_eq!(tags.get("s"), Some("arc"));
        assert_eq!(tags.get("t"), Some(""));
        assert_eq!(tags.get("b"), Some(""));
        assert_eq!(tags.get("x"), None);

        // folded values unfold into single spaces
        let tags = TagList::parse("a=one\r\n two;b = three ").unwrap();
        assert_eq!(tags.get("a"), Some("one two"));
        assert_eq!(tags.get("b"), Some("three"));

        for invalid in [
            "a=1; a=2",     // duplicate
            "a=1;;b=2",     // empty tag
            "a=1; novalue", // no '='
            "9a=1",         // bad name
        ] {
            assert!(TagList::parse(invalid).is_err(), "accepted {:?}", invalid);
        }
    }

    #[test]
    fn tag_list_preserves_template_order() {
        let template = "i=; cv=; a=rsa-sha256; d=example.org; s=arc; t=; b=";
        let mut tags = TagList::parse(template).unwrap();
        tags.set("t", "1755918846");
        tags.set("cv", "none");
        tags.set("i", "1");
        tags.set("b", "Zm9v");
        assert_eq!(
            tags.to_string(),
            "i=1; cv=none; a=rsa-sha256; d=example.org; s=arc; t=1755918846; b=Zm9v"
        );
        assert_eq!(
            tags.to_unsigned_string(),
            "i=1; cv=none; a=rsa-sha256; d=example.org; s=arc; t=1755918846; b="
        );
    }

    #[test]
    fn tag_list_signed_header_list() {
        let mut tags = TagList::parse("h=Subject:From:To; b=abc").unwrap();
        assert_eq!(tags.to_string(), "h=subject : from : to; b=abc");
        assert_eq!(tags.to_unsigned_string(), "h=subject : from : to; b=");

        // a single name carries no colon and is emitted untouched
        tags.set("h", "Subject");
        assert_eq!(tags.to_string(), "h=Subject; b=abc");
    }
}
