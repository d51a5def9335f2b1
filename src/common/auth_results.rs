/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::net::IpAddr;

use mail_builder::encoders::base64::base64_encode;

use crate::{
    dmarc::psl::PslIndex, DkimOutcome, DkimVerifier, Resolver, SpfEvaluator,
};

use super::message::AuthenticatedMessage;

/// Composes the Authentication-Results value for one SMTP transaction by
/// running SPF, DKIM and DMARC over `message`:
///
/// `{auth_service}; spf=…; dkim=…; dmarc=… (p=…) header.from=…`
pub async fn compose_auth_results(
    resolver: &Resolver,
    psl: &PslIndex,
    spf: &impl SpfEvaluator,
    dkim: &impl DkimVerifier,
    auth_service: &str,
    message: &AuthenticatedMessage<'_>,
    helo: &str,
    mail_from: &str,
    ip: IpAddr,
) -> crate::Result<String> {
    let spf_line = spf.eval_spf(helo, mail_from, ip)?;
    let dkim_outcome = dkim.verify_dkim(message.raw_message)?;

    let dkim_line = match &dkim_outcome {
        Some(outcome) => dkim_auth_result(outcome)?,
        None => "fail (no valid signature records)".to_string(),
    };

    let spf_result = spf_line.split(' ').next().unwrap_or_default().to_string();
    let spf_domain = spf_envelope_domain(&spf_line);
    let dkim_result = dkim_line.split(' ').next().unwrap_or_default().to_string();
    let dkim_domain = dkim_outcome.as_ref().map(|outcome| {
        let identity = outcome.identity.trim_start_matches('@');
        identity
            .rsplit_once('@')
            .map_or(identity, |(_, domain)| domain)
            .to_string()
    });

    let dmarc = resolver
        .verify_dmarc(
            psl,
            message,
            &spf_result,
            spf_domain.as_deref(),
            &dkim_result,
            dkim_domain.as_deref(),
        )
        .await?;

    Ok(format!(
        "{}; spf={}; dkim={}; {}",
        auth_service,
        spf_line.replace(';', ""),
        dkim_line,
        dmarc.as_auth_result()
    ))
}

fn dkim_auth_result(outcome: &DkimOutcome) -> crate::Result<String> {
    let identity = outcome.identity.trim_start_matches('@');
    let mut b = String::from_utf8(base64_encode(&outcome.signature)?).unwrap_or_default();
    b.truncate(8);
    Ok(format!(
        "pass header.i={} header.s={} header.b={}",
        identity, outcome.selector, b
    ))
}

// Recovers the envelope-from domain from the `envelope-from={addr}` clause
// of the SPF result line.
fn spf_envelope_domain(spf_line: &str) -> Option<String> {
    for part in spf_line.split(' ') {
        if let Some(envelope) = part.strip_prefix("envelope-from=") {
            let (_, domain) = envelope.split_once('@')?;
            let domain = domain
                .trim_matches(|ch| matches!(ch, '<' | '>' | ';'))
                .trim();
            return (!domain.is_empty()).then(|| domain.to_string());
        }
    }
    None
}
