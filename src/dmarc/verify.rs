/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use crate::{common::message::AuthenticatedMessage, Error, Resolver};

use super::{psl::PslIndex, Alignment, DmarcOutcome, DmarcResult};

impl Resolver {
    /// Evaluates DMARC alignment of the SPF and DKIM outcomes against the
    /// RFC5322.From domain of `message`.
    ///
    /// `spf_result` and `dkim_result` are the bare result words
    /// (`pass`, `softfail`, …); the domains are the ones those mechanisms
    /// authenticated, when known.
    pub async fn verify_dmarc(
        &self,
        psl: &PslIndex,
        message: &AuthenticatedMessage<'_>,
        spf_result: &str,
        spf_domain: Option<&str>,
        dkim_result: &str,
        dkim_domain: Option<&str>,
    ) -> crate::Result<DmarcOutcome> {
        let from_domain = match message.from.as_slice() {
            [mailbox] => mailbox
                .rsplit_once('@')
                .map(|(_, domain)| domain.to_string())
                .filter(|domain| !domain.is_empty())
                .ok_or_else(|| {
                    Error::Malformed(format!("no domain in From address {:?}", mailbox))
                })?,
            _ => {
                return Err(Error::Malformed(
                    "message must carry exactly one From mailbox".to_string(),
                ))
            }
        };

        let record = match self.txt_dmarc(&from_domain).await {
            Ok(record) => record,
            Err(Error::DnsPerm(_)) | Err(Error::Malformed(_)) => {
                return Ok(DmarcOutcome::none(from_domain));
            }
            Err(err) => return Err(err),
        };

        let spf_aligned = aligned(psl, record.aspf, spf_result, &from_domain, spf_domain);
        let dkim_aligned = aligned(psl, record.adkim, dkim_result, &from_domain, dkim_domain);

        Ok(DmarcOutcome {
            result: if spf_aligned || dkim_aligned {
                DmarcResult::Pass
            } else {
                DmarcResult::Fail
            },
            policy: Some(record.p),
            from_domain,
        })
    }
}

fn aligned(
    psl: &PslIndex,
    alignment: Alignment,
    result: &str,
    received: &str,
    expected: Option<&str>,
) -> bool {
    let expected = match expected {
        Some(expected) => expected,
        None => return false,
    };
    if result != "pass" {
        return false;
    }
    match alignment {
        Alignment::Relaxed => psl
            .org_domain(received)
            .eq_ignore_ascii_case(&psl.org_domain(expected)),
        Alignment::Strict => received.eq_ignore_ascii_case(expected),
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use crate::{
        common::{message::AuthenticatedMessage, resolver::TxtRecordParser},
        dmarc::{psl::PslIndex, Dmarc, DmarcResult, Policy},
        Resolver,
    };

    #[tokio::test]
    async fn dmarc_verify() {
        let resolver = Resolver::new_google().unwrap();
        let psl = PslIndex::new();

        for (dmarc_dns, dmarc_record) in [
            (
                "_dmarc.d1.example.",
                "k=rsa; v=DMARC1; p=reject; pct=100; rua=mailto:noc@d1.example",
            ),
            (
                "_dmarc.mail.replit.app.",
                "v=DMARC1; p=reject; aspf=r; adkim=r; pct=100",
            ),
            (
                "_dmarc.test.replit.app.",
                "v=DMARC1; p=reject; aspf=s; adkim=s; pct=100",
            ),
        ] {
            resolver.txt_add(
                dmarc_dns,
                Dmarc::parse(dmarc_record.as_bytes()).unwrap(),
                Instant::now() + Duration::new(3200, 0),
            );
        }

        for (
            from,
            spf_result,
            spf_domain,
            dkim_result,
            dkim_domain,
            expected_result,
            expected_policy,
        ) in [
            // DKIM aligned, SPF softfail
            (
                "jqd@d1.example",
                "softfail",
                Some("d1.example"),
                "pass",
                Some("d1.example"),
                DmarcResult::Pass,
                Some(Policy::Reject),
            ),
            // relaxed alignment accepts the organisational domain
            (
                "jqd@mail.replit.app",
                "pass",
                Some("smtp.mail.replit.app"),
                "fail",
                None,
                DmarcResult::Pass,
                Some(Policy::Reject),
            ),
            // strict alignment rejects a sibling domain
            (
                "jqd@test.replit.app",
                "pass",
                Some("smtp.test.replit.app"),
                "pass",
                Some("replit.app"),
                DmarcResult::Fail,
                Some(Policy::Reject),
            ),
            // nothing passed at all
            (
                "jqd@d1.example",
                "fail",
                Some("d1.example"),
                "fail",
                None,
                DmarcResult::Fail,
                Some(Policy::Reject),
            ),
            // no policy record published
            (
                "jqd@nowhere.example",
                "pass",
                Some("nowhere.example"),
                "pass",
                Some("nowhere.example"),
                DmarcResult::None,
                None,
            ),
        ] {
            let message = format!("From: {}\r\n\r\n", from);
            let message = AuthenticatedMessage::parse(message.as_bytes()).unwrap();
            let outcome = resolver
                .verify_dmarc(
                    &psl,
                    &message,
                    spf_result,
                    spf_domain,
                    dkim_result,
                    dkim_domain,
                )
                .await
                .unwrap();
            assert_eq!(outcome.result, expected_result, "from {}", from);
            assert_eq!(outcome.policy, expected_policy, "from {}", from);
        }
    }

    #[tokio::test]
    async fn dmarc_requires_single_from() {
        let resolver = Resolver::new_google().unwrap();
        let psl = PslIndex::new();
        for message in [
            "To: arc@dmarc.example\r\n\r\n",
            "From: a@d1.example, b@d2.example\r\n\r\n",
        ] {
            let message = AuthenticatedMessage::parse(message.as_bytes()).unwrap();
            assert!(resolver
                .verify_dmarc(&psl, &message, "pass", None, "pass", None)
                .await
                .is_err());
        }
    }

    #[test]
    fn dmarc_auth_result_clause() {
        use crate::dmarc::DmarcOutcome;

        let outcome = DmarcOutcome {
            result: DmarcResult::Pass,
            policy: Some(Policy::Reject),
            from_domain: "d1.example".to_string(),
        };
        assert_eq!(
            outcome.as_auth_result(),
            "dmarc=pass (p=reject) header.from=d1.example"
        );
        assert_eq!(
            DmarcOutcome::none("d1.example".to_string()).as_auth_result(),
            "dmarc=none (no policy) header.from=d1.example"
        );
    }
}
