//! Physical header position to BCM channel mapping for the 40-pin Raspberry Pi header.

use filament_traits::PinNumbering;

use crate::error::{HwError, Result};

/// Highest BCM channel exposed on the 40-pin header.
pub const MAX_BCM: u8 = 27;

/// `BOARD_TO_BCM[n - 1]` is the BCM channel at header position `n`;
/// `None` marks power and ground positions.
const BOARD_TO_BCM: [Option<u8>; 40] = [
    None,     // 1  3V3
    None,     // 2  5V
    Some(2),  // 3
    None,     // 4  5V
    Some(3),  // 5
    None,     // 6  GND
    Some(4),  // 7
    Some(14), // 8
    None,     // 9  GND
    Some(15), // 10
    Some(17), // 11
    Some(18), // 12
    Some(27), // 13
    None,     // 14 GND
    Some(22), // 15
    Some(23), // 16
    None,     // 17 3V3
    Some(24), // 18
    Some(10), // 19
    None,     // 20 GND
    Some(9),  // 21
    Some(25), // 22
    Some(11), // 23
    Some(8),  // 24
    None,     // 25 GND
    Some(7),  // 26
    Some(0),  // 27
    Some(1),  // 28
    Some(5),  // 29
    None,     // 30 GND
    Some(6),  // 31
    Some(12), // 32
    Some(13), // 33
    None,     // 34 GND
    Some(19), // 35
    Some(16), // 36
    Some(26), // 37
    Some(20), // 38
    None,     // 39 GND
    Some(21), // 40
];

/// Resolve a configured pin to the BCM channel used by the GPIO driver.
pub fn to_bcm(pin: u8, numbering: PinNumbering) -> Result<u8> {
    let resolved = match numbering {
        PinNumbering::Bcm => (pin <= MAX_BCM).then_some(pin),
        PinNumbering::Board => pin
            .checked_sub(1)
            .and_then(|idx| BOARD_TO_BCM.get(usize::from(idx)).copied().flatten()),
    };
    resolved.ok_or(HwError::InvalidPin { pin, numbering })
}
