use core::ops::Range;

use types::{
    config::Config,
    phase0::{
        consts::GENESIS_SLOT,
        primitives::{Epoch, Slot, UnixSeconds},
    },
};

#[must_use]
pub const fn compute_epoch_at_slot(config: &Config, slot: Slot) -> Epoch {
    slot / config.slots_per_epoch.get()
}

#[must_use]
pub const fn compute_start_slot_at_epoch(config: &Config, epoch: Epoch) -> Slot {
    config.slots_in(epoch)
}

#[must_use]
pub const fn is_epoch_start(config: &Config, slot: Slot) -> bool {
    slots_since_epoch_start(config, slot) == 0
}

#[must_use]
pub const fn slots_since_epoch_start(config: &Config, slot: Slot) -> u64 {
    slot % config.slots_per_epoch.get()
}

#[must_use]
pub const fn slots_in_epoch(config: &Config, epoch: Epoch) -> Range<Slot> {
    compute_start_slot_at_epoch(config, epoch)
        ..compute_start_slot_at_epoch(config, epoch.saturating_add(1))
}

/// Time at which `slot` starts.
#[must_use]
pub const fn compute_timestamp_at_slot(
    config: &Config,
    genesis_time: UnixSeconds,
    slot: Slot,
) -> UnixSeconds {
    let slots_since_genesis = slot.saturating_sub(GENESIS_SLOT);
    genesis_time.saturating_add(slots_since_genesis.saturating_mul(config.seconds_per_slot.get()))
}

/// Slot in progress at `time`.
///
/// Times before genesis are mapped to `GENESIS_SLOT`.
#[must_use]
pub const fn slot_at_time(config: &Config, genesis_time: UnixSeconds, time: UnixSeconds) -> Slot {
    GENESIS_SLOT + time.saturating_sub(genesis_time) / config.seconds_per_slot.get()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_epoch_at_slot() {
        let config = Config::minimal();

        assert_eq!(compute_epoch_at_slot(&config, 9), 1);
        assert_eq!(compute_epoch_at_slot(&config, 8), 1);
        assert_eq!(compute_epoch_at_slot(&config, 7), 0);
    }

    #[test]
    fn test_start_slot_at_epoch() {
        assert_eq!(compute_start_slot_at_epoch(&Config::minimal(), 1), 8);
        assert_eq!(compute_start_slot_at_epoch(&Config::mainnet(), 2), 64);
    }

    #[test]
    fn test_slots_in_epoch() {
        assert_eq!(slots_in_epoch(&Config::minimal(), 2), 16..24);
    }

    #[test_case(0 => true)]
    #[test_case(1 => false)]
    #[test_case(8 => true)]
    #[test_case(15 => false)]
    fn test_is_epoch_start(slot: Slot) -> bool {
        is_epoch_start(&Config::minimal(), slot)
    }

    #[test_case(0 => 1000)]
    #[test_case(1 => 1012)]
    #[test_case(10 => 1120)]
    fn test_timestamp_at_slot(slot: Slot) -> UnixSeconds {
        compute_timestamp_at_slot(&Config::mainnet(), 1000, slot)
    }

    #[test_case(999 => 0; "before genesis")]
    #[test_case(1000 => 0)]
    #[test_case(1011 => 0)]
    #[test_case(1012 => 1)]
    #[test_case(1125 => 10)]
    fn test_slot_at_time(time: UnixSeconds) -> Slot {
        slot_at_time(&Config::mainnet(), 1000, time)
    }
}
