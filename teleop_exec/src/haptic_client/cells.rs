//! Shared state between the haptic thread and the main loop

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use comms_if::eqpt::haptic::{HapticDemand, HapticReading};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An `f64` which can be shared between threads, stored as its bit pattern.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

/// The haptic exchange state.
///
/// Each value is its own cell, a reader may see a new position with an old force. The haptic
/// thread writes the reading and reads the demand, the main loop does the opposite.
#[derive(Debug)]
pub struct HapticCells {
    pub finger_pos: AtomicF64,
    pub finger_force: AtomicF64,

    pub vibration: AtomicF64,
    pub hardness: AtomicF64,

    /// False once the exchange thread has stopped
    pub alive: AtomicBool,

    /// Number of completed exchanges
    pub num_exchanges: AtomicU64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }
}

impl HapticCells {
    pub fn new(demand: HapticDemand, alive: bool) -> Self {
        Self {
            finger_pos: AtomicF64::new(0.0),
            finger_force: AtomicF64::new(0.0),
            vibration: AtomicF64::new(demand.vibration),
            hardness: AtomicF64::new(demand.hardness),
            alive: AtomicBool::new(alive),
            num_exchanges: AtomicU64::new(0),
        }
    }

    pub fn reading(&self) -> HapticReading {
        HapticReading {
            finger_pos: self.finger_pos.load(),
            finger_force: self.finger_force.load(),
        }
    }

    pub fn store_reading(&self, reading: &HapticReading) {
        self.finger_pos.store(reading.finger_pos);
        self.finger_force.store(reading.finger_force);
        self.num_exchanges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn demand(&self) -> HapticDemand {
        HapticDemand {
            vibration: self.vibration.load(),
            hardness: self.hardness.load(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_atomic_f64() {
        let a = AtomicF64::new(-1.5);
        assert_eq!(a.load(), -1.5);
        a.store(1043.25);
        assert_eq!(a.load(), 1043.25);
    }

    #[test]
    fn test_initial_cells() {
        let cells = HapticCells::new(HapticDemand::default(), true);
        assert_eq!(cells.demand().vibration, 0.0);
        assert_eq!(cells.demand().hardness, 500.0);
        assert_eq!(cells.reading(), HapticReading::default());
    }
}
