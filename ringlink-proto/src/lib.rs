//! Ringlink wire protocol - fixed 16-byte command frames
//!
//! Every command sent to the ring travels in a [`Frame`]: the command bytes
//! at the front, zero padding, and an 8-bit additive checksum in the last
//! byte. The reboot command is the one exception and uses its own layout.

pub mod ble;

use std::fmt;

/// Size of every command frame on the wire
pub const FRAME_SIZE: usize = 16;

/// Longest command that still leaves room for the checksum byte
pub const MAX_COMMAND_LEN: usize = FRAME_SIZE - 1;

/// Opcode of the reboot command, also used as its trailer byte
pub const REBOOT_OPCODE: u8 = 0x08;

/// Errors produced while turning a hex command into a frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("invalid hex command {command:?}: {reason}")]
    InvalidHex { command: String, reason: String },
    #[error("command too long for {FRAME_SIZE}-byte frame: {command} ({len} bytes)")]
    TooLong { command: String, len: usize },
}

/// A complete 16-byte command frame
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_SIZE]);

impl Frame {
    /// The reboot frame: `08 00 .. 00 08`, no checksum
    pub const fn reboot() -> Self {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[0] = REBOOT_OPCODE;
        bytes[FRAME_SIZE - 1] = REBOOT_OPCODE;
        Self(bytes)
    }

    /// Build a checksummed frame from raw command bytes
    pub fn from_command(command: &[u8]) -> Result<Self, FrameError> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(FrameError::TooLong {
                command: data_encoding::HEXUPPER.encode(command),
                len: command.len(),
            });
        }

        let mut bytes = [0u8; FRAME_SIZE];
        bytes[..command.len()].copy_from_slice(command);
        bytes[FRAME_SIZE - 1] = checksum(&bytes[..MAX_COMMAND_LEN]);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    pub fn checksum(&self) -> u8 {
        self.0[FRAME_SIZE - 1]
    }

    /// True when the frame carries the reboot layout
    pub fn is_reboot(&self) -> bool {
        *self == Self::reboot()
    }

    /// Uppercase hex without separators, e.g. `A10404000000000000000000000000A9`
    pub fn to_hex(&self) -> String {
        data_encoding::HEXUPPER.encode(&self.0)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({self})")
    }
}

/// Unsigned 8-bit sum of `bytes`, modulo 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Strip whitespace and hyphens and uppercase, so `"a1-04 04"` becomes `"A10404"`
pub fn normalize(hex: &str) -> String {
    hex.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Parse a hex command (case-insensitive, spaces and hyphens allowed)
pub fn parse_hex(hex: &str) -> Result<Vec<u8>, FrameError> {
    let clean = normalize(hex);
    data_encoding::HEXUPPER
        .decode(clean.as_bytes())
        .map_err(|e| FrameError::InvalidHex {
            command: hex.to_string(),
            reason: e.to_string(),
        })
}

/// Encode a hex command into its wire frame.
///
/// The reboot command (`08`) is matched after normalization and gets the
/// fixed reboot layout; anything else goes through the checksum path.
pub fn encode(hex: &str) -> Result<Frame, FrameError> {
    if normalize(hex) == ble::commands::REBOOT {
        return Ok(Frame::reboot());
    }
    let command = parse_hex(hex)?;
    Frame::from_command(&command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_raw_frame() {
        let frame = encode(ble::commands::START_RAW).unwrap();
        let mut expected = [0u8; FRAME_SIZE];
        expected[..3].copy_from_slice(&[0xA1, 0x04, 0x04]);
        expected[15] = 0xA9;
        assert_eq!(frame.as_bytes(), &expected);
    }

    #[test]
    fn checksum_wraps() {
        let frame = encode("FF FF FF").unwrap();
        assert_eq!(frame.checksum(), 0xFD);
        let sum = frame.as_bytes()[..15]
            .iter()
            .map(|b| *b as u32)
            .sum::<u32>();
        assert_eq!(frame.checksum() as u32, sum % 256);
    }

    #[test]
    fn checksum_over_full_command() {
        for len in 0..=MAX_COMMAND_LEN {
            let command: Vec<u8> = (0..len as u8).map(|i| i.wrapping_mul(37).wrapping_add(11)).collect();
            let frame = Frame::from_command(&command).unwrap();
            assert_eq!(&frame.as_bytes()[..len], &command[..]);
            assert!(frame.as_bytes()[len..15].iter().all(|b| *b == 0));
            assert_eq!(frame.checksum(), checksum(&frame.as_bytes()[..15]));
        }
    }

    #[test]
    fn reboot_layout() {
        for spelling in ["08", " 08 ", "0-8"] {
            let frame = encode(spelling).unwrap();
            assert_eq!(
                frame.to_hex(),
                "08000000000000000000000000000008",
                "spelling {spelling:?}"
            );
            assert!(frame.is_reboot());
        }
    }

    #[test]
    fn case_and_separators() {
        assert_eq!(encode("a1-04 04").unwrap(), encode("A10404").unwrap());
        assert_eq!(normalize(" a1-0 2 "), "A102");
    }

    #[test]
    fn rejects_oversized_command() {
        let hex = "01".repeat(16);
        assert_eq!(
            encode(&hex),
            Err(FrameError::TooLong {
                command: hex.clone(),
                len: 16
            })
        );
        assert!(encode(&"01".repeat(15)).is_ok());
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(encode("ZZ"), Err(FrameError::InvalidHex { .. })));
        assert!(matches!(encode("A10"), Err(FrameError::InvalidHex { .. })));
    }

    #[test]
    fn display_is_spaced_hex() {
        let frame = encode(ble::commands::STOP_CAMERA).unwrap();
        assert_eq!(
            frame.to_string(),
            "02 06 00 00 00 00 00 00 00 00 00 00 00 00 00 08"
        );
    }
}
