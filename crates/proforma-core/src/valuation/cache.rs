use std::num::NonZeroUsize;

use lru::LruCache;
use rust_decimal::Decimal;

use super::dcf::dcf_value;
use crate::types::{Money, Rate};
use crate::ProFormaResult;

pub const DEFAULT_CAPACITY: usize = 128;

type DcfKey = (Vec<Decimal>, Decimal, Option<Decimal>, Option<u32>);

/// Memoised [`dcf_value`] for WACC/growth sweeps.
///
/// Owned by the caller and passed by `&mut`; share it across threads only
/// behind a lock.
#[derive(Debug)]
pub struct DcfCache {
    entries: LruCache<DcfKey, Money>,
    hits: u64,
    misses: u64,
}

impl Default for DcfCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DcfCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A zero capacity falls back to one entry.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn dcf_value(
        &mut self,
        cash_flows: &[Money],
        discount_rate: Rate,
        terminal_value: Option<Money>,
        terminal_year: Option<u32>,
    ) -> ProFormaResult<Money> {
        let key: DcfKey = (
            cash_flows.iter().map(|cf| cf.normalize()).collect(),
            discount_rate.normalize(),
            terminal_value.map(|tv| tv.normalize()),
            terminal_year,
        );
        if let Some(value) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(*value);
        }

        self.misses += 1;
        let value = dcf_value(cash_flows, discount_rate, terminal_value, terminal_year)?;
        self.entries.put(key, value);
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }
}
