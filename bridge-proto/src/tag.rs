use crate::error::ProtoError;

/// The control tag alphabet shared by both simulator wire protocols.
/// `Skip`'s meaning is direction-dependent (see pipeline docs): it means
/// "advance step without payload" on the NEST->TVB receive side and
/// "per-step sentinel, continue" on the TVB->NEST emit side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlTag {
    Payload = 0,
    Skip = 1,
    End = 2,
}

impl TryFrom<u8> for ControlTag {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Payload),
            1 => Ok(Self::Skip),
            2 => Ok(Self::End),
            other => Err(ProtoError::BadTag(other)),
        }
    }
}

impl From<ControlTag> for u8 {
    fn from(tag: ControlTag) -> Self {
        tag as u8
    }
}
