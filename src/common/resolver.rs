/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::{borrow::Cow, sync::Arc};

use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::ResolveError,
    system_conf::read_system_conf,
    AsyncResolver,
};

use crate::{common::crypto::DomainKey, dmarc::Dmarc, Error, Resolver, Txt};

use super::lru::TxtCache;

pub(crate) trait TxtRecordParser: Sized {
    fn parse(bytes: &[u8]) -> crate::Result<Self>;
}

pub(crate) trait TxtRecord: TxtRecordParser {
    fn into_txt(record: Arc<Self>) -> Txt;
    fn unwrap_txt(txt: Txt) -> crate::Result<Arc<Self>>;
}

impl Resolver {
    pub fn new_cloudflare() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::cloudflare(), ResolverOpts::default(), 128)
    }

    pub fn new_google() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::google(), ResolverOpts::default(), 128)
    }

    pub fn new_quad9() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::quad9(), ResolverOpts::default(), 128)
    }

    pub fn new_system_conf() -> Result<Self, ResolveError> {
        let (config, options) = read_system_conf()?;
        Self::with_capacity(config, options, 128)
    }

    pub fn with_capacity(
        config: ResolverConfig,
        options: ResolverOpts,
        capacity: usize,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            resolver: AsyncResolver::tokio(config, options)?,
            cache_txt: TxtCache::with_capacity(capacity),
        })
    }

    /// Fetches the public key record at `{selector}._domainkey.{domain}`.
    pub async fn txt_key(&self, selector: &str, domain: &str) -> crate::Result<Arc<DomainKey>> {
        self.txt_lookup::<DomainKey>(format!("{}._domainkey.{}.", selector, domain))
            .await
    }

    /// Fetches the DMARC policy record at `_dmarc.{domain}`.
    pub async fn txt_dmarc(&self, domain: &str) -> crate::Result<Arc<Dmarc>> {
        self.txt_lookup::<Dmarc>(format!("_dmarc.{}.", domain)).await
    }

    pub(crate) async fn txt_lookup<T: TxtRecord>(&self, key: String) -> crate::Result<Arc<T>> {
        if let Some(value) = self.cache_txt.get(&key) {
            return T::unwrap_txt(value);
        }

        #[cfg(any(test, feature = "test"))]
        if true {
            return Err(Error::DnsPerm(format!("no record for {}", key)));
        }

        let txt_lookup = self.resolver.txt_lookup(key.as_str()).await?;
        let mut result = Err(Error::Malformed("no usable TXT record".to_string()));
        let records = txt_lookup.as_lookup().record_iter().filter_map(|record| {
            let txt_data = record.data()?.as_txt()?.txt_data();
            match txt_data.len() {
                1 => Cow::from(txt_data[0].as_ref()).into(),
                0 => None,
                _ => {
                    let mut entry = Vec::with_capacity(255 * txt_data.len());
                    for data in txt_data {
                        entry.extend_from_slice(data);
                    }
                    Cow::from(entry).into()
                }
            }
        });

        // the first record that parses for the requested type wins
        for record in records {
            result = T::parse(record.as_ref());
            if result.is_ok() {
                break;
            }
        }

        let txt = match result {
            Ok(record) => T::into_txt(Arc::new(record)),
            Err(err) => Txt::Error(err),
        };
        T::unwrap_txt(
            self.cache_txt
                .insert(key, txt, txt_lookup.valid_until()),
        )
    }

    /// Seeds the TXT cache, which the test configuration consults instead
    /// of the network.
    #[cfg(any(test, feature = "test"))]
    pub fn txt_add<T: TxtRecord>(
        &self,
        name: impl Into<String>,
        record: T,
        valid_until: std::time::Instant,
    ) {
        self.cache_txt
            .insert(name.into(), T::into_txt(Arc::new(record)), valid_until);
    }
}
