//! Command identifier width selection.
//!
//! Both endpoints of a link must run the same width; nothing on the wire says which
//! one is in use.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use hashrpc_hash::MessageId;

use crate::error::{FrameError, Result};

/// Width of the command identifier carried in each envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RpcHashWidth {
    /// 4-byte little-endian command ids (the 32-bit hash).
    #[default]
    FourBytes = 0,
    /// 8-byte little-endian command ids (the 64-bit hash).
    EightBytes = 1,
}

impl RpcHashWidth {
    /// Number of bytes a command id occupies at this width.
    pub const fn byte_len(self) -> usize {
        match self {
            Self::FourBytes => 4,
            Self::EightBytes => 8,
        }
    }

    /// Select a width from its byte length (4 or 8).
    pub fn from_byte_len(len: usize) -> Result<Self> {
        match len {
            4 => Ok(Self::FourBytes),
            8 => Ok(Self::EightBytes),
            other => Err(FrameError::InvalidHashWidth(format!("{other} bytes"))),
        }
    }

    /// The identifier of `id` that travels at this width.
    pub fn command_id(self, id: MessageId) -> CommandId {
        match self {
            Self::FourBytes => CommandId::Id32(id.id32),
            Self::EightBytes => CommandId::Id64(id.id64),
        }
    }

    /// Encode the command bytes for `id` at this width.
    pub fn encode_command(self, id: MessageId) -> Bytes {
        self.command_id(id).to_bytes()
    }

    /// Parse raw command bytes as an identifier of this width.
    ///
    /// The byte length must match the width exactly.
    pub fn parse_command(self, bytes: &[u8]) -> Result<CommandId> {
        let mismatch = || FrameError::CommandWidthMismatch {
            expected: self.byte_len(),
            found: bytes.len(),
        };
        match self {
            Self::FourBytes => {
                let raw: [u8; 4] = bytes.try_into().map_err(|_| mismatch())?;
                Ok(CommandId::Id32(u32::from_le_bytes(raw)))
            }
            Self::EightBytes => {
                let raw: [u8; 8] = bytes.try_into().map_err(|_| mismatch())?;
                Ok(CommandId::Id64(u64::from_le_bytes(raw)))
            }
        }
    }
}

impl TryFrom<u8> for RpcHashWidth {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::FourBytes),
            1 => Ok(Self::EightBytes),
            other => Err(FrameError::InvalidHashWidth(format!(
                "discriminant {other}"
            ))),
        }
    }
}

impl FromStr for RpcHashWidth {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "4" | "four" | "4-byte" => Ok(Self::FourBytes),
            "8" | "eight" | "8-byte" => Ok(Self::EightBytes),
            other => Err(FrameError::InvalidHashWidth(other.to_string())),
        }
    }
}

impl fmt::Display for RpcHashWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-byte", self.byte_len())
    }
}

/// A command identifier parsed at a specific width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    Id32(u32),
    Id64(u64),
}

impl CommandId {
    /// The width this identifier was parsed at.
    pub fn width(self) -> RpcHashWidth {
        match self {
            Self::Id32(_) => RpcHashWidth::FourBytes,
            Self::Id64(_) => RpcHashWidth::EightBytes,
        }
    }

    /// Little-endian wire bytes.
    pub fn to_bytes(self) -> Bytes {
        match self {
            Self::Id32(id) => Bytes::copy_from_slice(&id.to_le_bytes()),
            Self::Id64(id) => Bytes::copy_from_slice(&id.to_le_bytes()),
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id32(id) => write!(f, "{id:#010x}"),
            Self::Id64(id) => write!(f, "{id:#018x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping() -> MessageId {
        MessageId::from_name("Game.PingMessage")
    }

    #[test]
    fn default_width_is_four_bytes() {
        assert_eq!(RpcHashWidth::default(), RpcHashWidth::FourBytes);
    }

    #[test]
    fn encode_command_is_little_endian() {
        let id = ping();
        assert_eq!(
            RpcHashWidth::FourBytes.encode_command(id).as_ref(),
            &[0x29, 0x95, 0xe6, 0xdc]
        );
        assert_eq!(
            RpcHashWidth::EightBytes.encode_command(id).as_ref(),
            &id.id64.to_le_bytes()
        );
    }

    #[test]
    fn parse_matches_encode_per_width() {
        let id = ping();
        for width in [RpcHashWidth::FourBytes, RpcHashWidth::EightBytes] {
            let bytes = width.encode_command(id);
            assert_eq!(width.parse_command(&bytes).unwrap(), width.command_id(id));
        }
    }

    #[test]
    fn parse_rejects_wrong_length() {
        let eight = RpcHashWidth::EightBytes.encode_command(ping());
        assert!(matches!(
            RpcHashWidth::FourBytes.parse_command(&eight),
            Err(FrameError::CommandWidthMismatch {
                expected: 4,
                found: 8
            })
        ));
        assert!(matches!(
            RpcHashWidth::EightBytes.parse_command(&[1, 2, 3]),
            Err(FrameError::CommandWidthMismatch {
                expected: 8,
                found: 3
            })
        ));
        assert!(RpcHashWidth::FourBytes.parse_command(&[]).is_err());
    }

    #[test]
    fn invalid_configuration_values_are_rejected() {
        assert!(matches!(
            RpcHashWidth::try_from(2u8),
            Err(FrameError::InvalidHashWidth(_))
        ));
        assert!(matches!(
            RpcHashWidth::from_byte_len(2),
            Err(FrameError::InvalidHashWidth(_))
        ));
        assert!(matches!(
            "16".parse::<RpcHashWidth>(),
            Err(FrameError::InvalidHashWidth(_))
        ));
    }

    #[test]
    fn parses_configuration_spellings() {
        assert_eq!("4".parse::<RpcHashWidth>().unwrap(), RpcHashWidth::FourBytes);
        assert_eq!(
            " Eight ".parse::<RpcHashWidth>().unwrap(),
            RpcHashWidth::EightBytes
        );
        assert_eq!(RpcHashWidth::try_from(1u8).unwrap(), RpcHashWidth::EightBytes);
        assert_eq!(RpcHashWidth::from_byte_len(4).unwrap(), RpcHashWidth::FourBytes);
        assert_eq!(RpcHashWidth::EightBytes.to_string(), "8-byte");
    }

    #[test]
    fn command_id_reports_its_width() {
        assert_eq!(CommandId::Id32(1).width(), RpcHashWidth::FourBytes);
        assert_eq!(CommandId::Id64(1).width(), RpcHashWidth::EightBytes);
        assert_eq!(CommandId::Id32(0xab).to_string(), "0x000000ab");
    }
}
