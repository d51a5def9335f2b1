/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::{collections::BTreeMap, time::SystemTime};

use sha2::{Digest, Sha256};

use crate::{
    common::{
        canonicalize::{relaxed_body, relaxed_header},
        message::AuthenticatedMessage,
    },
    Error, Resolver,
};

use super::{
    record::{strip_signature, SignatureRecord},
    ChainValidation, ARC_AUTHENTICATION_RESULTS, ARC_MESSAGE_SIGNATURE, ARC_SEAL,
};

/// The ARC headers of one chain instance, as `(name, raw value)` pairs.
pub(crate) type Hops<'x> = BTreeMap<u32, Vec<(&'x str, &'x str)>>;

impl Resolver {
    /// Walks all prior ARC hops of `message` and returns the chain validity
    /// that this hop's Seal should carry.
    ///
    /// Protocol violations (malformed headers, broken set structure) are
    /// surfaced as errors; failed cryptographic verification and an
    /// exhausted chain length yield `ChainValidation::Fail`.
    pub async fn validate_chain(
        &self,
        message: &AuthenticatedMessage<'_>,
    ) -> crate::Result<ChainValidation> {
        let hops = collect_hops(message)?;
        let my_instance = hops.keys().next_back().copied().unwrap_or(0) + 1;

        if my_instance == 1 {
            // first hop, nothing to validate
            return Ok(ChainValidation::None);
        }
        if my_instance > 51 {
            return Ok(ChainValidation::Fail);
        }

        check_structure(&hops)?;

        let target = my_instance - 1;
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0);

        if self.verify_signature(message, &hops, target, now).await?
            && self.verify_seal(&hops, target).await?
        {
            Ok(ChainValidation::Pass)
        } else {
            Ok(ChainValidation::Fail)
        }
    }

    // Verifies the ARC-Message-Signature of the most recent prior hop:
    // body hash plus RSA signature over the signed headers and the
    // unsigned AMS itself.
    async fn verify_signature(
        &self,
        message: &AuthenticatedMessage<'_>,
        hops: &Hops<'_>,
        target: u32,
        now: u64,
    ) -> crate::Result<bool> {
        let (_, value) = find_header(&hops[&target], ARC_MESSAGE_SIGNATURE).unwrap();
        let record = SignatureRecord::parse(value)?;
        record.check_algorithm()?;
        record.validate(now)?;

        let signed_headers = record.headers()?;
        let body_hash = record.body_hash()?;
        let signature = record.signature()?;

        let mut hasher = Sha256::new();
        relaxed_body(message.body(), &mut hasher)?;
        if hasher.finalize().as_slice() != body_hash {
            return Ok(false);
        }

        let data = signing_data(
            &message.header_view(),
            &signed_headers,
            &strip_signature(value),
        );

        let key = match self.txt_key(record.selector()?, record.domain()?).await {
            Ok(key) => key,
            Err(Error::DnsTemp(err)) => return Err(Error::DnsTemp(err)),
            Err(_) => return Ok(false),
        };
        Ok(key.verify(data.as_bytes(), &signature).is_ok())
    }

    // Verifies the ARC-Seal of the most recent prior hop over the
    // accumulated chain.
    async fn verify_seal(&self, hops: &Hops<'_>, target: u32) -> crate::Result<bool> {
        let (_, value) = find_header(&hops[&target], ARC_SEAL).unwrap();
        let record = SignatureRecord::parse(value)?;
        record.check_algorithm()?;
        let signature = record.signature()?;

        let data = seal_signing_data(hops, target);

        let key = match self.txt_key(record.selector()?, record.domain()?).await {
            Ok(key) => key,
            Err(Error::DnsTemp(err)) => return Err(Error::DnsTemp(err)),
            Err(_) => return Ok(false),
        };
        Ok(key.verify(data.as_bytes(), &signature).is_ok())
    }
}

/// Buckets all `ARC-*` headers of the message by their `i=` tag.
pub(crate) fn collect_hops<'x>(message: &AuthenticatedMessage<'x>) -> crate::Result<Hops<'x>> {
    let mut hops: Hops = BTreeMap::new();
    for (name, value) in &message.headers {
        let name = match std::str::from_utf8(name) {
            Ok(name) if name.get(..4).map_or(false, |p| p.eq_ignore_ascii_case("arc-")) => name,
            _ => continue,
        };
        let value = std::str::from_utf8(value)
            .map_err(|_| Error::Malformed(format!("{} header is not valid UTF-8", name)))?;
        let instance = instance_tag(value).ok_or_else(|| {
            Error::Malformed(format!("{} header without a valid i= tag", name))
        })?;
        hops.entry(instance).or_default().push((name, value));
    }
    Ok(hops)
}

/// The integer value of the first `i=` tag of a header value, if any.
pub(crate) fn instance_tag(value: &str) -> Option<u32> {
    for part in value.split(';') {
        if let Some(i) = part.trim().strip_prefix("i=") {
            return i.trim().parse().ok();
        }
    }
    None
}

// Every instance from 1 to the chain length must exist and consist of
// exactly one ARC-Authentication-Results, one ARC-Message-Signature and one
// ARC-Seal, with cv=none at the first instance and cv=pass afterwards.
fn check_structure(hops: &Hops<'_>) -> crate::Result<()> {
    let length = match hops.keys().next_back() {
        Some(length) => *length,
        None => return Ok(()),
    };

    for instance in 1..=length {
        let hop = hops.get(&instance).ok_or_else(|| {
            Error::StructureViolation(format!("chain is not continuous at i={}", instance))
        })?;
        if hop.len() != 3 {
            return Err(Error::StructureViolation(format!(
                "instance {} carries {} ARC headers instead of 3",
                instance,
                hop.len()
            )));
        }
        for name in [ARC_AUTHENTICATION_RESULTS, ARC_MESSAGE_SIGNATURE, ARC_SEAL] {
            if hop
                .iter()
                .filter(|(header, _)| header.eq_ignore_ascii_case(name))
                .count()
                != 1
            {
                return Err(Error::StructureViolation(format!(
                    "instance {} does not carry exactly one {}",
                    instance, name
                )));
            }
        }

        let (_, seal) = find_header(hop, ARC_SEAL).unwrap();
        let cv = SignatureRecord::parse(seal)?.chain_validation()?;
        let expected = if instance == 1 {
            ChainValidation::None
        } else {
            ChainValidation::Pass
        };
        if cv != expected {
            return Err(Error::StructureViolation(format!(
                "unexpected cv={} at i={}",
                cv, instance
            )));
        }
    }

    Ok(())
}

fn find_header<'x>(hop: &[(&'x str, &'x str)], name: &str) -> Option<(&'x str, &'x str)> {
    hop.iter()
        .copied()
        .find(|(header, _)| header.eq_ignore_ascii_case(name))
}

/// Builds the AMS signing data: for every name in `h=`, one occurrence of
/// that header consumed from the bottom of the message up, each in relaxed
/// canonical form followed by CRLF, then the unsigned AMS itself without a
/// trailing CRLF.
pub(crate) fn signing_data(
    headers: &[(&str, &str)],
    signed_headers: &[impl AsRef<str>],
    unsigned_value: &str,
) -> String {
    let mut data = String::with_capacity(256);

    for (pos, name) in signed_headers.iter().enumerate() {
        let name = name.as_ref();
        let occurrences = headers
            .iter()
            .filter(|(header, _)| header.trim().eq_ignore_ascii_case(name))
            .copied()
            .collect::<Vec<_>>();
        // repeated h= mentions consume successive occurrences bottom-up
        let used = signed_headers[..pos]
            .iter()
            .filter(|prior| prior.as_ref().eq_ignore_ascii_case(name))
            .count();
        if let Some((header, value)) = occurrences
            .len()
            .checked_sub(used + 1)
            .and_then(|index| occurrences.get(index).copied())
        {
            data.push_str(&relaxed_header(header, value));
            data.push_str("\r\n");
        }
    }

    data.push_str(&relaxed_header("arc-message-signature", unsigned_value));
    data
}

/// Builds the Seal signing data over hops `1..=target` in ascending order,
/// each header as `lowercase(name):canonicalized value` plus CRLF; the
/// target Seal comes last with its `b=` cleared and no trailing CRLF.
pub(crate) fn seal_signing_data(hops: &Hops<'_>, target: u32) -> String {
    let mut data = String::with_capacity(512);

    for (&instance, hop) in hops.iter() {
        if instance > target {
            break;
        }
        for name in [ARC_AUTHENTICATION_RESULTS, ARC_MESSAGE_SIGNATURE] {
            if let Some((header, value)) = find_header(hop, name) {
                data.push_str(&relaxed_header(header, value));
                data.push_str("\r\n");
            }
        }
        if let Some((header, value)) = find_header(hop, ARC_SEAL) {
            if instance == target {
                data.push_str(&relaxed_header(header, &strip_signature(value)));
                break;
            }
            data.push_str(&relaxed_header(header, value));
            data.push_str("\r\n");
        }
    }

    data
}

#[cfg(test)]
mod test {
    use crate::{arc::ChainValidation, common::message::AuthenticatedMessage, Error, Resolver};

    use super::{instance_tag, signing_data};

    fn arc_set(instance: u32, cv: &str) -> String {
        format!(
            concat!(
                "ARC-Seal: i={i}; cv={cv}; a=rsa-sha256; d=d.example; s=arc; t=1; b=Zm9v\r\n",
                "ARC-Message-Signature: i={i}; a=rsa-sha256; c=relaxed/relaxed; ",
                "d=d.example; s=arc; t=1; h=From; ",
                "bh=Ck5SoRNWUpSR4X0COv7R5ub2pUTtl6xz4dTFz++ji4M=; b=Zm9v\r\n",
                "ARC-Authentication-Results: i={i}; mx.d.example; spf=pass\r\n",
            ),
            i = instance,
            cv = cv,
        )
    }

    fn message_with(sets: &[String]) -> String {
        format!(
            "{}From: jqd@d1.example\r\nSubject: x\r\n\r\nbody\r\n",
            sets.concat()
        )
    }

    #[tokio::test]
    async fn chain_with_no_arc_headers_is_none() {
        let resolver = Resolver::new_google().unwrap();
        let raw = message_with(&[]);
        let message = AuthenticatedMessage::parse(raw.as_bytes()).unwrap();
        assert_eq!(
            resolver.validate_chain(&message).await.unwrap(),
            ChainValidation::None
        );
    }

    #[tokio::test]
    async fn chain_structure_violations() {
        let resolver = Resolver::new_google().unwrap();

        // instance gap
        let raw = message_with(&[arc_set(1, "none"), arc_set(3, "pass")]);
        let message = AuthenticatedMessage::parse(raw.as_bytes()).unwrap();
        assert!(matches!(
            resolver.validate_chain(&message).await,
            Err(Error::StructureViolation(_))
        ));

        // wrong cv at the first instance
        let raw = message_with(&[arc_set(1, "pass"), arc_set(2, "pass")]);
        let message = AuthenticatedMessage::parse(raw.as_bytes()).unwrap();
        assert!(matches!(
            resolver.validate_chain(&message).await,
            Err(Error::StructureViolation(_))
        ));

        // duplicate member within a set
        let raw = message_with(&[
            arc_set(1, "none"),
            "ARC-Seal: i=1; cv=none; a=rsa-sha256; d=d.example; s=arc; b=Zm9v\r\n".to_string(),
        ]);
        let message = AuthenticatedMessage::parse(raw.as_bytes()).unwrap();
        assert!(matches!(
            resolver.validate_chain(&message).await,
            Err(Error::StructureViolation(_))
        ));

        // missing i= tag is malformed
        let raw = message_with(&["ARC-Seal: cv=none; d=d.example; s=arc; b=Zm9v\r\n".to_string()]);
        let message = AuthenticatedMessage::parse(raw.as_bytes()).unwrap();
        assert!(matches!(
            resolver.validate_chain(&message).await,
            Err(Error::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn chain_too_long_fails() {
        let resolver = Resolver::new_google().unwrap();
        let sets = (1..=51)
            .map(|i| arc_set(i, if i == 1 { "none" } else { "pass" }))
            .collect::<Vec<_>>();
        let raw = message_with(&sets);
        let message = AuthenticatedMessage::parse(raw.as_bytes()).unwrap();
        assert_eq!(
            resolver.validate_chain(&message).await.unwrap(),
            ChainValidation::Fail
        );
    }

    #[tokio::test]
    async fn broken_signature_fails_without_dns() {
        // the mocked resolver has no key record, so the hop cannot verify
        let resolver = Resolver::new_google().unwrap();
        let raw = message_with(&[arc_set(1, "none")]);
        let message = AuthenticatedMessage::parse(raw.as_bytes()).unwrap();
        assert_eq!(
            resolver.validate_chain(&message).await.unwrap(),
            ChainValidation::Fail
        );
    }

    #[test]
    fn instance_tag_scan() {
        assert_eq!(instance_tag("i=7; cv=pass; b="), Some(7));
        assert_eq!(instance_tag(" i=1; mx.example; spf=pass"), Some(1));
        assert_eq!(instance_tag("cv=pass; b="), None);
        assert_eq!(instance_tag("i=x; cv=pass"), None);
    }

    #[test]
    fn signing_data_consumes_headers_bottom_up() {
        let headers = [
            ("Received", " first\r\n"),
            ("From", " a@d.example\r\n"),
            ("Received", " second\r\n"),
        ];
        let data = signing_data(
            &headers,
            &["Received", "Received", "From", "To"],
            "i=1; h=received : received : from : to; b=",
        );
        assert_eq!(
            data,
            concat!(
                "received:second\r\n",
                "received:first\r\n",
                "from:a@d.example\r\n",
                "arc-message-signature:i=1; h=received : received : from : to; b=",
            )
        );
    }
}
