//! Wire-level enums: frame types, rpc types, services, and function IDs

use std::fmt;

use super::error::FormatError;

/// Frame type carried in the low three bits of byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Complete message in one frame
    Single = 0x00,
    /// First frame of a fragmented message
    First = 0x01,
    /// Middle frame of a fragmented message
    Consecutive = 0x02,
    /// Final frame of a fragmented message
    Last = 0x03,
}

impl FrameType {
    /// Parse from the three-bit wire value
    pub fn from_bits(bits: u8) -> Result<Self, FormatError> {
        match bits {
            0x00 => Ok(Self::Single),
            0x01 => Ok(Self::First),
            0x02 => Ok(Self::Consecutive),
            0x03 => Ok(Self::Last),
            _ => Err(FormatError::InvalidFrameType { bits }),
        }
    }

    /// Convert to the three-bit wire value
    #[must_use]
    pub const fn as_bits(self) -> u8 {
        self as u8
    }
}

/// Direction/kind of an RPC message, two bits in byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RpcType {
    /// Application-initiated request expecting exactly one response
    Request = 0x00,
    /// Head-unit response correlated to a request
    Response = 0x01,
    /// Unsolicited head-unit notification
    Notification = 0x02,
}

impl RpcType {
    /// Parse from the two-bit wire value
    pub fn from_bits(bits: u8) -> Result<Self, FormatError> {
        match bits {
            0x00 => Ok(Self::Request),
            0x01 => Ok(Self::Response),
            0x02 => Ok(Self::Notification),
            _ => Err(FormatError::InvalidRpcType { bits }),
        }
    }

    /// Convert to the two-bit wire value
    #[must_use]
    pub const fn as_bits(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RpcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "Request",
            Self::Response => "Response",
            Self::Notification => "Notification",
        };
        write!(f, "{name}")
    }
}

/// Logical service a frame belongs to, byte 2 of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServiceType {
    /// Session control traffic
    Control = 0x00,
    /// RPC messages (JSON + optional bulk binary payload)
    Rpc = 0x07,
    /// PCM audio service
    Audio = 0x0A,
    /// H.264 video service
    Video = 0x0B,
    /// Raw bulk-data transfer
    Bulk = 0x0F,
}

impl ServiceType {
    /// Parse from the wire byte
    pub fn from_byte(byte: u8) -> Result<Self, FormatError> {
        match byte {
            0x00 => Ok(Self::Control),
            0x07 => Ok(Self::Rpc),
            0x0A => Ok(Self::Audio),
            0x0B => Ok(Self::Video),
            0x0F => Ok(Self::Bulk),
            _ => Err(FormatError::InvalidServiceType { byte }),
        }
    }

    /// Convert to the wire byte
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether frames on this service carry the RPC binary sub-header
    #[must_use]
    pub const fn carries_rpc_payload(self) -> bool {
        matches!(self, Self::Rpc)
    }
}

/// Identifier of a known RPC operation.
///
/// The full head-unit catalogue is far larger; this enum covers the
/// operations the SDK itself issues or observes. Values the crate does
/// not know decode to [`FunctionId::Unknown`] so a newer head unit never
/// kills the session by using an ID we have not heard of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionId {
    /// Session registration
    RegisterAppInterface,
    /// Session teardown
    UnregisterAppInterface,
    /// Global property update (keyboard properties and friends)
    SetGlobalProperties,
    /// Upload one choice cell as a single-cell interaction choice set
    CreateInteractionChoiceSet,
    /// Present a choice interaction or keyboard
    PerformInteraction,
    /// Remove a previously uploaded interaction choice set
    DeleteInteractionChoiceSet,
    /// Modal alert
    Alert,
    /// Upload a file or piece of artwork
    PutFile,
    /// Remove a previously uploaded file
    DeleteFile,
    /// Query a system capability
    GetSystemCapability,
    /// Dismiss an in-progress interaction by cancel ID
    CancelInteraction,
    /// HMI level / system context notification
    OnHmiStatus,
    /// Keyboard input notification during a keyboard interaction
    OnKeyboardInput,
    /// Display capability change notification
    OnSystemCapabilityUpdated,
    /// Catch-all for IDs this crate does not model
    Unknown(u32),
}

impl FunctionId {
    /// Convert to the 32-bit wire value
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::RegisterAppInterface => 1,
            Self::UnregisterAppInterface => 2,
            Self::SetGlobalProperties => 3,
            Self::CreateInteractionChoiceSet => 9,
            Self::PerformInteraction => 10,
            Self::DeleteInteractionChoiceSet => 11,
            Self::Alert => 12,
            Self::PutFile => 32,
            Self::DeleteFile => 33,
            Self::GetSystemCapability => 48,
            Self::CancelInteraction => 58,
            Self::OnHmiStatus => 0x8001,
            Self::OnKeyboardInput => 0x8002,
            Self::OnSystemCapabilityUpdated => 0x8003,
            Self::Unknown(raw) => raw,
        }
    }

    /// Parse from the 32-bit wire value
    #[must_use]
    pub const fn from_u32(raw: u32) -> Self {
        match raw {
            1 => Self::RegisterAppInterface,
            2 => Self::UnregisterAppInterface,
            3 => Self::SetGlobalProperties,
            9 => Self::CreateInteractionChoiceSet,
            10 => Self::PerformInteraction,
            11 => Self::DeleteInteractionChoiceSet,
            12 => Self::Alert,
            32 => Self::PutFile,
            33 => Self::DeleteFile,
            48 => Self::GetSystemCapability,
            58 => Self::CancelInteraction,
            0x8001 => Self::OnHmiStatus,
            0x8002 => Self::OnKeyboardInput,
            0x8003 => Self::OnSystemCapabilityUpdated,
            other => Self::Unknown(other),
        }
    }

    /// Whether the ID names a notification rather than a request/response pair
    #[must_use]
    pub const fn is_notification(self) -> bool {
        matches!(
            self,
            Self::OnHmiStatus | Self::OnKeyboardInput | Self::OnSystemCapabilityUpdated
        )
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisterAppInterface => write!(f, "RegisterAppInterface"),
            Self::UnregisterAppInterface => write!(f, "UnregisterAppInterface"),
            Self::SetGlobalProperties => write!(f, "SetGlobalProperties"),
            Self::CreateInteractionChoiceSet => write!(f, "CreateInteractionChoiceSet"),
            Self::PerformInteraction => write!(f, "PerformInteraction"),
            Self::DeleteInteractionChoiceSet => write!(f, "DeleteInteractionChoiceSet"),
            Self::Alert => write!(f, "Alert"),
            Self::PutFile => write!(f, "PutFile"),
            Self::DeleteFile => write!(f, "DeleteFile"),
            Self::GetSystemCapability => write!(f, "GetSystemCapability"),
            Self::CancelInteraction => write!(f, "CancelInteraction"),
            Self::OnHmiStatus => write!(f, "OnHmiStatus"),
            Self::OnKeyboardInput => write!(f, "OnKeyboardInput"),
            Self::OnSystemCapabilityUpdated => write!(f, "OnSystemCapabilityUpdated"),
            Self::Unknown(raw) => write!(f, "Unknown({raw:#x})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_roundtrip() {
        for ft in [
            FrameType::Single,
            FrameType::First,
            FrameType::Consecutive,
            FrameType::Last,
        ] {
            assert_eq!(FrameType::from_bits(ft.as_bits()).unwrap(), ft);
        }
    }

    #[test]
    fn test_frame_type_rejects_out_of_range() {
        for bits in 4..8 {
            assert!(matches!(
                FrameType::from_bits(bits),
                Err(FormatError::InvalidFrameType { .. })
            ));
        }
    }

    #[test]
    fn test_rpc_type_rejects_reserved() {
        assert!(matches!(
            RpcType::from_bits(0x03),
            Err(FormatError::InvalidRpcType { bits: 0x03 })
        ));
    }

    #[test]
    fn test_service_type_roundtrip() {
        for st in [
            ServiceType::Control,
            ServiceType::Rpc,
            ServiceType::Audio,
            ServiceType::Video,
            ServiceType::Bulk,
        ] {
            assert_eq!(ServiceType::from_byte(st.as_byte()).unwrap(), st);
        }
        assert!(ServiceType::from_byte(0x42).is_err());
    }

    #[test]
    fn test_function_id_unknown_preserves_raw() {
        let id = FunctionId::from_u32(0xDEAD);
        assert_eq!(id, FunctionId::Unknown(0xDEAD));
        assert_eq!(id.as_u32(), 0xDEAD);
    }
}
