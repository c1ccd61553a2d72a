//! A [`Stream`]-based slot timer.
//!
//! This is implemented using [`Interval`]. The API of [`Interval`] uses [`Instant`]s, which are
//! opaque. There is no way to directly convert a Unix timestamp to an [`Instant`], so [`ticks`]
//! samples [`Instant::now`] and [`SystemTime::now`] together and assumes they refer to the same
//! point in time.
//!
//! An [`Interval`] may produce items late, but the delays do not accumulate.
//! Each [`Tick`] carries the time at which its slot starts rather than the time it was produced.
//!
//! [`Instant`]:  std::time::Instant
//! [`Interval`]: tokio::time::Interval

use core::{error::Error, time::Duration};
use std::time::{Instant, SystemTime, SystemTimeError};

use anyhow::Result;
use futures::stream::{Stream, StreamExt as _};
use helper_functions::misc;
use thiserror::Error;
use tokio_stream::wrappers::IntervalStream;
use types::{
    config::Config,
    phase0::{
        consts::GENESIS_SLOT,
        primitives::{Epoch, Slot, UnixSeconds},
    },
};

#[cfg(test)]
mod fake_time;

pub trait InstantLike: Sized {
    fn checked_add(self, duration: Duration) -> Option<Self>;
}

pub trait SystemTimeLike: Copy {
    type Error: Error + Send + Sync + 'static;

    const UNIX_EPOCH: Self;

    fn duration_since(self, earlier: Self) -> Result<Duration, Self::Error>;
}

impl InstantLike for Instant {
    fn checked_add(self, duration: Duration) -> Option<Self> {
        Self::checked_add(&self, duration)
    }
}

impl SystemTimeLike for SystemTime {
    type Error = SystemTimeError;

    const UNIX_EPOCH: Self = Self::UNIX_EPOCH;

    fn duration_since(self, earlier: Self) -> Result<Duration, Self::Error> {
        Self::duration_since(&self, earlier)
    }
}

/// The start of a slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Tick {
    pub slot: Slot,
    pub time: UnixSeconds,
}

impl Tick {
    #[must_use]
    pub const fn start_of_slot(config: &Config, genesis_time: UnixSeconds, slot: Slot) -> Self {
        Self {
            slot,
            time: misc::compute_timestamp_at_slot(config, genesis_time, slot),
        }
    }

    /// Tick for the slot in progress at `time`.
    ///
    /// `time` is kept as is. It may be later than the start of the slot.
    #[must_use]
    pub const fn at_time(config: &Config, genesis_time: UnixSeconds, time: UnixSeconds) -> Self {
        Self {
            slot: misc::slot_at_time(config, genesis_time, time),
            time,
        }
    }

    pub fn current(config: &Config, genesis_time: UnixSeconds) -> Result<Self> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs();

        Ok(Self::at_time(config, genesis_time, now))
    }

    #[must_use]
    pub const fn epoch(self, config: &Config) -> Epoch {
        misc::compute_epoch_at_slot(config, self.slot)
    }

    #[must_use]
    pub const fn is_start_of_epoch(self, config: &Config) -> bool {
        misc::is_epoch_start(config, self.slot)
    }

    fn next(self, config: &Config, genesis_time: UnixSeconds) -> Result<Self> {
        let next_slot = self.slot.checked_add(1).ok_or(ClockError::RanOutOfSlots)?;
        Ok(Self::start_of_slot(config, genesis_time, next_slot))
    }
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum ClockError {
    #[error("time of next tick overflowed")]
    NextInstantOverflow,
    #[error("ran out of slots")]
    RanOutOfSlots,
}

/// Produces a [`Tick`] at the start of every slot, beginning with the next one.
///
/// If called before genesis, the first tick is the one for `GENESIS_SLOT`.
pub fn ticks(
    config: &Config,
    genesis_time: UnixSeconds,
) -> Result<impl Stream<Item = Result<Tick>> + use<'_>> {
    let now_instant = Instant::now();
    let now_system_time = SystemTime::now();

    let (mut next_tick, next_instant) =
        next_tick_with_instant(config, now_instant, now_system_time, genesis_time)?;

    let interval = tokio::time::interval_at(next_instant.into(), config.slot_duration());

    Ok(IntervalStream::new(interval).map(move |_| {
        let current_tick = next_tick;
        next_tick = current_tick.next(config, genesis_time)?;
        Ok(current_tick)
    }))
}

fn next_tick_with_instant<I: InstantLike, S: SystemTimeLike>(
    config: &Config,
    now_instant: I,
    now_system_time: S,
    genesis_time: UnixSeconds,
) -> Result<(Tick, I)> {
    let unix_epoch_to_now = now_system_time.duration_since(S::UNIX_EPOCH)?;
    let unix_epoch_to_genesis = Duration::from_secs(genesis_time);

    // Some platforms do not support `Instant`s before an arbitrary platform dependent epoch.
    // Subtracting `Duration`s from `Instant`s could panic there. `InstantLike` only allows adding.
    let (next_slot, now_to_next_tick) = if unix_epoch_to_now <= unix_epoch_to_genesis {
        (GENESIS_SLOT, unix_epoch_to_genesis - unix_epoch_to_now)
    } else {
        let slot_duration = config.slot_duration();
        let genesis_to_now = unix_epoch_to_now - unix_epoch_to_genesis;
        let slots_since_genesis = genesis_to_now.as_secs() / slot_duration.as_secs();
        let genesis_to_current_slot =
            Duration::from_secs(slots_since_genesis * slot_duration.as_secs());
        let current_slot = GENESIS_SLOT + slots_since_genesis;

        if genesis_to_now == genesis_to_current_slot {
            (current_slot, Duration::ZERO)
        } else {
            let next_slot = current_slot
                .checked_add(1)
                .ok_or(ClockError::RanOutOfSlots)?;

            (
                next_slot,
                genesis_to_current_slot + slot_duration - genesis_to_now,
            )
        }
    };

    let next_tick = Tick::start_of_slot(config, genesis_time, next_slot);

    let next_instant = now_instant
        .checked_add(now_to_next_tick)
        .ok_or(ClockError::NextInstantOverflow)?;

    Ok((next_tick, next_instant))
}
