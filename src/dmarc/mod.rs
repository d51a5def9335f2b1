/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

pub mod psl;
pub mod verify;

use std::{fmt::Display, sync::Arc};

use crate::{
    common::{
        resolver::{TxtRecord, TxtRecordParser},
        tag::TagList,
    },
    Error, Txt,
};

/// The alignment-relevant part of a `_dmarc.{domain}` policy record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dmarc {
    pub(crate) p: Policy,
    pub(crate) aspf: Alignment,
    pub(crate) adkim: Alignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    None,
    Quarantine,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Relaxed,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmarcResult {
    None,
    Pass,
    Fail,
}

/// Outcome of a DMARC evaluation for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmarcOutcome {
    pub result: DmarcResult,
    /// The published `p=` policy, absent when no record exists.
    pub policy: Option<Policy>,
    pub from_domain: String,
}

impl TxtRecordParser for Dmarc {
    fn parse(bytes: &[u8]) -> crate::Result<Self> {
        let record = std::str::from_utf8(bytes)
            .map_err(|_| Error::Malformed("DMARC record is not valid UTF-8".to_string()))?;
        let tags = TagList::parse(record)?;

        let mut dmarc = Dmarc {
            p: Policy::None,
            aspf: Alignment::Relaxed,
            adkim: Alignment::Relaxed,
        };
        for (name, value) in tags.iter() {
            match name {
                "p" => dmarc.p = Policy::parse(value)?,
                "aspf" => dmarc.aspf = Alignment::parse(value)?,
                "adkim" => dmarc.adkim = Alignment::parse(value)?,
                // v=, pct=, rua= and friends do not participate in alignment
                _ => (),
            }
        }

        Ok(dmarc)
    }
}

impl TxtRecord for Dmarc {
    fn into_txt(record: Arc<Self>) -> Txt {
        Txt::Dmarc(record)
    }

    fn unwrap_txt(txt: Txt) -> crate::Result<Arc<Self>> {
        match txt {
            Txt::Dmarc(record) => Ok(record),
            Txt::Error(err) => Err(err),
            _ => Err(Error::Malformed("cached record type mismatch".to_string())),
        }
    }
}

impl Policy {
    fn parse(value: &str) -> crate::Result<Self> {
        if value.eq_ignore_ascii_case("none") {
            Ok(Policy::None)
        } else if value.eq_ignore_ascii_case("quarantine") {
            Ok(Policy::Quarantine)
        } else if value.eq_ignore_ascii_case("reject") {
            Ok(Policy::Reject)
        } else {
            Err(Error::Malformed(format!("unknown policy {:?}", value)))
        }
    }
}

impl Alignment {
    fn parse(value: &str) -> crate::Result<Self> {
        if value.eq_ignore_ascii_case("r") {
            Ok(Alignment::Relaxed)
        } else if value.eq_ignore_ascii_case("s") {
            Ok(Alignment::Strict)
        } else {
            Err(Error::Malformed(format!(
                "unknown alignment flag {:?}",
                value
            )))
        }
    }
}

impl Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Policy::None => "none",
            Policy::Quarantine => "quarantine",
            Policy::Reject => "reject",
        })
    }
}

impl Display for DmarcResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DmarcResult::None => "none",
            DmarcResult::Pass => "pass",
            DmarcResult::Fail => "fail",
        })
    }
}

impl DmarcOutcome {
    pub(crate) fn none(from_domain: String) -> Self {
        DmarcOutcome {
            result: DmarcResult::None,
            policy: None,
            from_domain,
        }
    }

    /// The `dmarc=…` clause of an Authentication-Results header.
    pub fn as_auth_result(&self) -> String {
        match &self.policy {
            Some(policy) => format!(
                "dmarc={} (p={}) header.from={}",
                self.result, policy, self.from_domain
            ),
            None => format!("dmarc=none (no policy) header.from={}", self.from_domain),
        }
    }
}
