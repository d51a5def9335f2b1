/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use mail_parser::{parsers::MessageStream, HeaderValue};

use crate::Error;

use super::headers::HeaderIterator;

/// A borrowed view over a raw message: the ordered header fields, the
/// mailboxes of the `From:` header and the body byte range.
#[derive(Debug, Clone)]
pub struct AuthenticatedMessage<'x> {
    pub(crate) headers: Vec<(&'x [u8], &'x [u8])>,
    pub(crate) from: Vec<String>,
    pub(crate) raw_message: &'x [u8],
    pub(crate) body_offset: usize,
}

impl<'x> AuthenticatedMessage<'x> {
    pub fn parse(raw_message: &'x [u8]) -> crate::Result<Self> {
        let mut headers = Vec::new();
        let mut from = Vec::new();

        let mut header_iterator = HeaderIterator::new(raw_message);
        for (name, value) in &mut header_iterator {
            if name.eq_ignore_ascii_case(b"from") {
                match MessageStream::new(value).parse_address() {
                    HeaderValue::Address(addr) => {
                        if let Some(addr) = addr.address {
                            from.push(addr.to_string());
                        }
                    }
                    HeaderValue::AddressList(list) => {
                        from.extend(
                            list.into_iter()
                                .filter_map(|addr| addr.address.map(|addr| addr.to_string())),
                        );
                    }
                    HeaderValue::Group(group) => {
                        from.extend(
                            group
                                .addresses
                                .into_iter()
                                .filter_map(|addr| addr.address.map(|addr| addr.to_string())),
                        );
                    }
                    HeaderValue::GroupList(group_list) => {
                        from.extend(group_list.into_iter().flat_map(|group| {
                            group
                                .addresses
                                .into_iter()
                                .filter_map(|addr| addr.address.map(|addr| addr.to_string()))
                        }));
                    }
                    _ => (),
                }
            }
            headers.push((name, value));
        }

        if headers.is_empty() {
            return Err(Error::Malformed("no headers found".to_string()));
        }

        Ok(AuthenticatedMessage {
            headers,
            from,
            raw_message,
            body_offset: header_iterator.body_offset(),
        })
    }

    /// The raw body bytes following the header section.
    pub fn body(&self) -> &'x [u8] {
        self.raw_message
            .get(self.body_offset..)
            .unwrap_or_default()
    }

    /// The ordered header view as UTF-8, dropping fields that are not
    /// valid UTF-8 (they cannot be named by a signature).
    pub(crate) fn header_view(&self) -> Vec<(&'x str, &'x str)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                match (std::str::from_utf8(name), std::str::from_utf8(value)) {
                    (Ok(name), Ok(value)) => Some((name, value)),
                    _ => None,
                }
            })
            .collect()
    }
}
