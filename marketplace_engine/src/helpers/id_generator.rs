//! Process-wide 64-bit id generation.
//!
//! Ids have the layout `[timestamp-ms : 41][machine : 8][sequence : 15]`, with the timestamp
//! measured from a fixed custom epoch. Ids from one process are strictly monotonic; ids across
//! processes are unique as long as each process carries a distinct machine id.

use std::{
    sync::{Mutex, OnceLock},
    thread,
    time::Duration,
};

use chrono::{TimeZone, Utc};
use thiserror::Error;

const MACHINE_BITS: u8 = 8;
const SEQUENCE_BITS: u8 = 15;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

static GENERATOR: OnceLock<IdGenerator> = OnceLock::new();

#[derive(Debug, Clone, Error)]
pub enum IdGeneratorError {
    #[error("The id generator has not been initialized")]
    Uninitialized,
    #[error("The id generator has already been initialized")]
    AlreadyInitialized,
    #[error("The system clock is before the id epoch")]
    ClockBeforeEpoch,
}

pub struct IdGenerator {
    machine_id: u8,
    // (last timestamp in ms since the epoch, sequence within that millisecond)
    state: Mutex<(u64, u64)>,
}

impl IdGenerator {
    /// Install the process-wide generator. Returns an error if it has already been installed.
    pub fn init(machine_id: u8) -> Result<(), IdGeneratorError> {
        let gen = IdGenerator { machine_id, state: Mutex::new((0, 0)) };
        GENERATOR.set(gen).map_err(|_| IdGeneratorError::AlreadyInitialized)
    }

    /// Generate the next id from the process-wide generator.
    pub fn next_id() -> Result<i64, IdGeneratorError> {
        let gen = GENERATOR.get().ok_or(IdGeneratorError::Uninitialized)?;
        gen.generate()
    }

    fn epoch_millis() -> Result<u64, IdGeneratorError> {
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let delta = Utc::now().signed_duration_since(epoch).num_milliseconds();
        u64::try_from(delta).map_err(|_| IdGeneratorError::ClockBeforeEpoch)
    }

    fn generate(&self) -> Result<i64, IdGeneratorError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let now = Self::epoch_millis()?;
            let (last_ms, seq) = *state;
            if now > last_ms {
                *state = (now, 0);
                return Ok(self.compose(now, 0));
            }
            if seq < MAX_SEQUENCE {
                *state = (last_ms, seq + 1);
                return Ok(self.compose(last_ms, seq + 1));
            }
            // sequence exhausted within this millisecond. Wait for the clock to tick over.
            thread::sleep(Duration::from_micros(100));
        }
    }

    fn compose(&self, millis: u64, seq: u64) -> i64 {
        let id = (millis << (MACHINE_BITS + SEQUENCE_BITS)) | ((self.machine_id as u64) << SEQUENCE_BITS) | seq;
        id as i64
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    fn test_generator() -> IdGenerator {
        IdGenerator { machine_id: 7, state: Mutex::new((0, 0)) }
    }

    #[test]
    fn ids_are_monotonic_and_unique() {
        let gen = test_generator();
        let mut last = 0i64;
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = gen.generate().unwrap();
            assert!(id > last, "ids must be strictly increasing");
            assert!(seen.insert(id));
            last = id;
        }
    }

    #[test]
    fn machine_id_lands_in_the_right_bits() {
        let gen = test_generator();
        let id = gen.generate().unwrap() as u64;
        assert_eq!((id >> SEQUENCE_BITS) & 0xFF, 7);
    }

    #[test]
    fn uninitialized_generator_errors() {
        // GENERATOR is process-global, so only assert when no other test has installed it.
        if GENERATOR.get().is_none() {
            assert!(matches!(IdGenerator::next_id(), Err(IdGeneratorError::Uninitialized)));
        }
    }
}
