use core::{num::NonZeroU64, time::Duration};
use std::{borrow::Cow, collections::BTreeMap, io::Read};

use anyhow::Result;
use nonzero_ext::nonzero;
use serde::{de::IgnoredAny, Deserialize, Serialize};

use crate::phase0::primitives::{Epoch, Slot, UnixSeconds};

/// Chain parameters customizable at runtime.
///
/// Only the parameters that affect time keeping and epoch boundaries are present.
/// Configurations written for full consensus clients can still be loaded.
/// Variables not known here are collected in `unknown` and otherwise ignored.
#[expect(
    clippy::unsafe_derive_deserialize,
    reason = "A false positive triggered by `nonzero!`. \
              The `unsafe` block in `nonzero!` only operates on the literal passed to it."
)]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,

    // Genesis
    pub min_genesis_time: UnixSeconds,

    // Time parameters
    pub seconds_per_slot: NonZeroU64,
    pub slots_per_epoch: NonZeroU64,

    // Collect unknown variables in a map so callers can warn about them.
    #[expect(
        clippy::zero_sized_map_values,
        reason = "False positive. Serde can only flatten structs and maps."
    )]
    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, IgnoredAny>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Use `default` as the default `config_name` and override it in `Config::mainnet`.
            // This keeps custom networks apart from mainnet if `CONFIG_NAME` is omitted.
            config_name: Cow::Borrowed("default"),
            min_genesis_time: 0,
            seconds_per_slot: nonzero!(12_u64),
            slots_per_epoch: nonzero!(32_u64),
            unknown: BTreeMap::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            config_name: Cow::Borrowed("mainnet"),
            min_genesis_time: 1_606_824_000,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn minimal() -> Self {
        Self {
            config_name: Cow::Borrowed("minimal"),
            min_genesis_time: 1_578_009_600,
            seconds_per_slot: nonzero!(6_u64),
            slots_per_epoch: nonzero!(8_u64),
            ..Self::default()
        }
    }

    pub fn from_yaml(reader: impl Read) -> Result<Self> {
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    #[must_use]
    pub const fn slot_duration(&self) -> Duration {
        Duration::from_secs(self.seconds_per_slot.get())
    }

    #[must_use]
    pub const fn slots_in(&self, epochs: Epoch) -> Slot {
        epochs.saturating_mul(self.slots_per_epoch.get())
    }

    #[must_use]
    pub fn unknown_variables(&self) -> impl Iterator<Item = &str> {
        self.unknown.keys().map(String::as_str)
    }
}
