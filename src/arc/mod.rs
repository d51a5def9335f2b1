/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

pub mod record;
pub mod seal;
pub mod verify;

use std::fmt::Display;

use crate::Error;

pub(crate) const ARC_AUTHENTICATION_RESULTS: &str = "ARC-Authentication-Results";
pub(crate) const ARC_MESSAGE_SIGNATURE: &str = "ARC-Message-Signature";
pub(crate) const ARC_SEAL: &str = "ARC-Seal";

/// Chain validity as carried in the `cv=` tag of an ARC-Seal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainValidation {
    None,
    Pass,
    Fail,
}

impl ChainValidation {
    pub(crate) fn parse(value: &str) -> crate::Result<Self> {
        if value.eq_ignore_ascii_case("none") {
            Ok(ChainValidation::None)
        } else if value.eq_ignore_ascii_case("pass") {
            Ok(ChainValidation::Pass)
        } else if value.eq_ignore_ascii_case("fail") {
            Ok(ChainValidation::Fail)
        } else {
            Err(Error::Malformed(format!("invalid cv= value {:?}", value)))
        }
    }
}

impl Display for ChainValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChainValidation::None => "none",
            ChainValidation::Pass => "pass",
            ChainValidation::Fail => "fail",
        })
    }
}

/// The four header values produced when sealing one hop. Values carry no
/// header name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSet {
    pub auth_results: String,
    pub arc_auth_results: String,
    pub arc_signature: String,
    pub arc_seal: String,
}

impl SealedSet {
    /// Serializes the set as header fields ready to prepend to the message.
    pub fn to_header(&self) -> String {
        format!(
            "{}: {}\r\n{}: {}\r\n{}: {}\r\nAuthentication-Results: {}\r\n",
            ARC_SEAL,
            self.arc_seal,
            ARC_MESSAGE_SIGNATURE,
            self.arc_signature,
            ARC_AUTHENTICATION_RESULTS,
            self.arc_auth_results,
            self.auth_results,
        )
    }
}
