//! Client protocol opcodes.
//!
//! Every client frame body starts with a little-endian `u16` opcode. Inbound
//! opcodes select a packet event; outbound opcodes head the frames built by
//! those events.

use std::fmt;

/// Client → server opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RecvOp {
    CheckPassword = 0x0001,
    SelectWorld = 0x0005,
    SelectCharacter = 0x0013,
    CharEnterGame = 0x0014,
    SelectCharacterInitSPW = 0x001C,
    SelectCharacterSPW = 0x001D,
}

impl RecvOp {
    pub const ALL: [RecvOp; 6] = [
        RecvOp::CheckPassword,
        RecvOp::SelectWorld,
        RecvOp::SelectCharacter,
        RecvOp::CharEnterGame,
        RecvOp::SelectCharacterInitSPW,
        RecvOp::SelectCharacterSPW,
    ];

    pub const fn code(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for RecvOp {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        RecvOp::ALL
            .into_iter()
            .find(|op| op.code() == code)
            .ok_or(code)
    }
}

impl From<RecvOp> for u16 {
    fn from(op: RecvOp) -> Self {
        op.code()
    }
}

impl fmt::Display for RecvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:04X})", self, self.code())
    }
}

/// Server → client opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SendOp {
    CheckPasswordResult = 0x0000,
    SelectWorldResult = 0x000B,
    SelectCharacterResult = 0x000C,
    BroadcastMsg = 0x0044,
    SetField = 0x008D,
}

impl SendOp {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

impl From<SendOp> for u16 {
    fn from(op: SendOp) -> Self {
        op.code()
    }
}
