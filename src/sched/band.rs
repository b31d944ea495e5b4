//! Priority bands.
//!
//! | priority   | band | ordering                     |
//! |------------|------|------------------------------|
//! | [100, 150) | L1   | shortest approximate burst   |
//! | [50, 100)  | L2   | highest priority             |
//! | [0, 50)    | L3   | arrival order                |

use core::fmt;

/// Lowest valid priority.
pub const MIN_PRIORITY: i32 = 0;
/// One past the highest valid priority.
pub const MAX_PRIORITY: i32 = 150;
/// Lowest priority of band L1.
pub const L1_MIN_PRIORITY: i32 = 100;
/// Lowest priority of band L2.
pub const L2_MIN_PRIORITY: i32 = 50;

/// A contiguous priority range served by one ready queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    /// Shortest remaining time, preemptive
    L1,
    /// Strict priority, non-preemptive
    L2,
    /// Round robin, timer-preemptive
    L3,
}

impl Band {
    /// Band for `priority`, or `None` when it is outside [0, 150).
    pub fn of(priority: i32) -> Option<Band> {
        match priority {
            L1_MIN_PRIORITY..=149 => Some(Band::L1),
            L2_MIN_PRIORITY..=99 => Some(Band::L2),
            MIN_PRIORITY..=49 => Some(Band::L3),
            _ => None,
        }
    }

    /// The band a thread of this band is promoted into by aging.
    pub fn promotion(self) -> Option<Band> {
        match self {
            Band::L1 => None,
            Band::L2 => Some(Band::L1),
            Band::L3 => Some(Band::L2),
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Band::L1 => "L1",
            Band::L2 => "L2",
            Band::L3 => "L3",
        };
        f.write_str(name)
    }
}
