use crate::decode::Position;

/// Errors raised while reading an NCS container or decoding its bytecode.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("bad signature: expected \"NCS V1.0\"")]
    BadSignature,

    #[error("bad program marker: expected 0x42, found 0x{found:02X}")]
    BadMarker { found: u8 },

    #[error("declared size 0x{declared:X} exceeds buffer length 0x{len:X}")]
    SizeMismatch { declared: u32, len: usize },

    #[error("offset out of bounds: offset=0x{offset:X}, len=0x{len:X}")]
    OutOfBounds { offset: usize, len: usize },

    #[error("invalid opcode: 0x{opcode:02X} at pos=0x{pos:X}")]
    InvalidOpcode { opcode: u8, pos: Position },

    #[error("invalid type byte 0x{ty:02X} for {mnemonic} at pos=0x{pos:X}")]
    InvalidType {
        ty: u8,
        mnemonic: &'static str,
        pos: Position,
    },

    #[error("jump target out of range at pos=0x{pos:X} (offset {offset})")]
    JumpOutOfRange { pos: Position, offset: i32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Refused mutation of a subroutine's inference state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("subroutine 0x{position:X} is already prototyped and frozen")]
    Frozen { position: Position },

    #[error("no subroutine state at 0x{position:X}")]
    Unknown { position: Position },
}

/// Reasons the frame walk could not settle a subroutine's signature.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("no reachable RETN")]
    NoReturn,

    #[error("RETN heights disagree: {first} vs {other}")]
    InconsistentReturn { first: i64, other: i64 },

    #[error("frame left {height} extra cells at RETN")]
    Unbalanced { height: i64 },

    #[error("frame height {height} exceeds the stack limit")]
    Overflow { height: i64 },

    #[error("call to unresolved subroutine 0x{callee:X}")]
    UnresolvedCallee { callee: Position },

    #[error("unknown engine routine {routine}")]
    UnknownAction { routine: u16 },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Non-fatal diagnostic: a reachable subroutine fell back to heuristics.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("subroutine 0x{position:08X} could not be prototyped structurally")]
pub struct StructuralAmbiguity {
    pub position: Position,
}
