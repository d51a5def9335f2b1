/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::{fmt::Display, net::IpAddr, sync::Arc};

use common::{crypto::DomainKey, lru::TxtCache};
use dmarc::Dmarc;
use trust_dns_resolver::{
    error::{ResolveError, ResolveErrorKind},
    TokioAsyncResolver,
};

pub mod arc;
pub mod common;
pub mod dmarc;

/// Cached DNS adapter used to fetch `_domainkey` and `_dmarc` TXT records.
#[derive(Debug)]
pub struct Resolver {
    pub(crate) resolver: TokioAsyncResolver,
    pub(crate) cache_txt: TxtCache<Txt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Txt {
    DomainKey(Arc<DomainKey>),
    Dmarc(Arc<Dmarc>),
    Error(Error),
}

/// External SPF engine.
///
/// The result line is embedded verbatim (minus `;`) into the composed
/// Authentication-Results header, so it is expected in the usual
/// `{result} ({comment}) client-ip=…; envelope-from=…; helo=…` shape.
pub trait SpfEvaluator {
    fn eval_spf(&self, helo: &str, mail_from: &str, ip: IpAddr) -> Result<String>;
}

/// External DKIM engine.
///
/// `Ok(None)` means the message carried no valid signature records; any
/// error aborts the operation that requested the verification.
pub trait DkimVerifier {
    fn verify_dkim(&self, raw_message: &[u8]) -> Result<Option<DkimOutcome>>;
}

/// The passing DKIM signature reported by a [`DkimVerifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DkimOutcome {
    /// The `i=` identity of the signature (or its `d=` domain when the
    /// signature carries no identity). A leading `@` is allowed.
    pub identity: String,
    /// The `s=` selector.
    pub selector: String,
    /// The raw signature bytes from the `b=` tag.
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid header, record or tag syntax.
    Malformed(String),
    /// A required tag is absent from a signature record.
    MissingTag(&'static str),
    /// The ARC set layout or continuity rules are violated.
    StructureViolation(String),
    /// No usable public key record exists for the signing domain.
    KeyUnavailable,
    /// Hash or signature mismatch, or an unusable key.
    CryptoFail(String),
    /// Transient DNS failure, the caller may retry.
    DnsTemp(String),
    /// Permanent DNS failure.
    DnsPerm(String),
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Malformed(details) => write!(f, "Malformed value: {}", details),
            Error::MissingTag(tag) => write!(f, "Missing '{}=' tag.", tag),
            Error::StructureViolation(details) => {
                write!(f, "Invalid ARC chain structure: {}", details)
            }
            Error::KeyUnavailable => write!(f, "Public key record unavailable."),
            Error::CryptoFail(details) => write!(f, "Cryptography layer error: {}", details),
            Error::DnsTemp(details) => write!(f, "Temporary DNS failure: {}", details),
            Error::DnsPerm(details) => write!(f, "Permanent DNS failure: {}", details),
            Error::Io(details) => write!(f, "I/O error: {}", details),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<rsa::errors::Error> for Error {
    fn from(err: rsa::errors::Error) -> Self {
        Error::CryptoFail(err.to_string())
    }
}

impl From<ResolveError> for Error {
    fn from(err: ResolveError) -> Self {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => Error::DnsPerm(err.to_string()),
            _ => Error::DnsTemp(err.to_string()),
        }
    }
}
