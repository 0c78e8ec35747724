use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete value types the NCS stack machine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Void,
    Int,
    Float,
    String,
    Object,
    /// Three consecutive float cells.
    Vector,
    /// A structure occupying the given number of cells.
    Struct(u16),
    /// Engine structure (effect, event, location, talent, ...), by index 0..=9.
    Engine(u8),
    /// Deferred action argument; lives in saved state, not on the stack.
    Action,
    /// Known to hold a value, type undetermined.
    Any,
}

impl TypeTag {
    /// Number of stack cells a value of this type occupies.
    pub fn cell_size(&self) -> usize {
        match self {
            TypeTag::Void | TypeTag::Action => 0,
            TypeTag::Vector => 3,
            TypeTag::Struct(cells) => *cells as usize,
            _ => 1,
        }
    }

    /// Decode a single-type byte as found on RSADD, CONST and unary ops.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x03 => Some(TypeTag::Int),
            0x04 => Some(TypeTag::Float),
            0x05 => Some(TypeTag::String),
            0x06 => Some(TypeTag::Object),
            0x10..=0x19 => Some(TypeTag::Engine(code - 0x10)),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<u8> {
        match self {
            TypeTag::Int => Some(0x03),
            TypeTag::Float => Some(0x04),
            TypeTag::String => Some(0x05),
            TypeTag::Object => Some(0x06),
            TypeTag::Engine(i) if *i <= 9 => Some(0x10 + i),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeTag::Void)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Void => write!(f, "void"),
            TypeTag::Int => write!(f, "int"),
            TypeTag::Float => write!(f, "float"),
            TypeTag::String => write!(f, "string"),
            TypeTag::Object => write!(f, "object"),
            TypeTag::Vector => write!(f, "vector"),
            TypeTag::Struct(cells) => write!(f, "struct[{}]", cells),
            TypeTag::Engine(i) => write!(f, "engine{}", i),
            TypeTag::Action => write!(f, "action"),
            TypeTag::Any => write!(f, "any"),
        }
    }
}

/// Operand pair encoded in the type byte of a binary instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandTypes {
    pub code: u8,
    pub lhs: TypeTag,
    pub rhs: TypeTag,
}

/// Type byte of struct-vs-struct comparisons, which carry an explicit width.
pub const STRUCT_PAIR: u8 = 0x24;

impl OperandTypes {
    /// Decode a binary type byte. For `STRUCT_PAIR` the caller supplies the
    /// width in cells via `struct_cells`.
    pub fn from_code(code: u8, struct_cells: u16) -> Option<Self> {
        use TypeTag::*;
        let (lhs, rhs) = match code {
            0x20 => (Int, Int),
            0x21 => (Float, Float),
            0x22 => (Object, Object),
            0x23 => (String, String),
            STRUCT_PAIR => (Struct(struct_cells), Struct(struct_cells)),
            0x25 => (Int, Float),
            0x26 => (Float, Int),
            0x30..=0x39 => (Engine(code - 0x30), Engine(code - 0x30)),
            0x3A => (Vector, Vector),
            0x3B => (Vector, Float),
            0x3C => (Float, Vector),
            _ => return None,
        };
        Some(Self { code, lhs, rhs })
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.lhs, TypeTag::Struct(_) | TypeTag::Vector)
    }

    /// Result type of an arithmetic instruction over these operands.
    pub fn result(&self) -> TypeTag {
        use TypeTag::*;
        match (self.lhs, self.rhs) {
            (Vector, _) | (_, Vector) => Vector,
            (Int, Int) => Int,
            (Float, _) | (_, Float) => Float,
            (String, String) => String,
            (lhs, _) => lhs,
        }
    }
}
