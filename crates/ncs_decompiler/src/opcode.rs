/// Raw NCS opcodes. Every instruction is `opcode`, `type`, then operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    CpDownSp = 0x01,
    RsAdd = 0x02,
    CpTopSp = 0x03,
    Const = 0x04,
    Action = 0x05,
    LogAnd = 0x06,
    LogOr = 0x07,
    IncOr = 0x08,
    ExcOr = 0x09,
    BoolAnd = 0x0A,
    Equal = 0x0B,
    NEqual = 0x0C,
    Geq = 0x0D,
    Gt = 0x0E,
    Lt = 0x0F,
    Leq = 0x10,
    ShLeft = 0x11,
    ShRight = 0x12,
    UShRight = 0x13,
    Add = 0x14,
    Sub = 0x15,
    Mul = 0x16,
    Div = 0x17,
    Mod = 0x18,
    Neg = 0x19,
    Comp = 0x1A,
    MovSp = 0x1B,
    StoreStateAll = 0x1C,
    Jmp = 0x1D,
    Jsr = 0x1E,
    Jz = 0x1F,
    Retn = 0x20,
    Destruct = 0x21,
    Not = 0x22,
    DecISp = 0x23,
    IncISp = 0x24,
    Jnz = 0x25,
    CpDownBp = 0x26,
    CpTopBp = 0x27,
    DecIBp = 0x28,
    IncIBp = 0x29,
    SaveBp = 0x2A,
    RestoreBp = 0x2B,
    StoreState = 0x2C,
    Nop = 0x2D,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        let op = match value {
            0x01 => CpDownSp,
            0x02 => RsAdd,
            0x03 => CpTopSp,
            0x04 => Const,
            0x05 => Action,
            0x06 => LogAnd,
            0x07 => LogOr,
            0x08 => IncOr,
            0x09 => ExcOr,
            0x0A => BoolAnd,
            0x0B => Equal,
            0x0C => NEqual,
            0x0D => Geq,
            0x0E => Gt,
            0x0F => Lt,
            0x10 => Leq,
            0x11 => ShLeft,
            0x12 => ShRight,
            0x13 => UShRight,
            0x14 => Add,
            0x15 => Sub,
            0x16 => Mul,
            0x17 => Div,
            0x18 => Mod,
            0x19 => Neg,
            0x1A => Comp,
            0x1B => MovSp,
            0x1C => StoreStateAll,
            0x1D => Jmp,
            0x1E => Jsr,
            0x1F => Jz,
            0x20 => Retn,
            0x21 => Destruct,
            0x22 => Not,
            0x23 => DecISp,
            0x24 => IncISp,
            0x25 => Jnz,
            0x26 => CpDownBp,
            0x27 => CpTopBp,
            0x28 => DecIBp,
            0x29 => IncIBp,
            0x2A => SaveBp,
            0x2B => RestoreBp,
            0x2C => StoreState,
            0x2D => Nop,
            other => return Err(other),
        };
        Ok(op)
    }
}

impl Opcode {
    pub fn mnemonic(&self) -> &'static str {
        use Opcode::*;
        match self {
            CpDownSp => "CPDOWNSP",
            RsAdd => "RSADD",
            CpTopSp => "CPTOPSP",
            Const => "CONST",
            Action => "ACTION",
            LogAnd => "LOGANDII",
            LogOr => "LOGORII",
            IncOr => "INCORII",
            ExcOr => "EXCORII",
            BoolAnd => "BOOLANDII",
            Equal => "EQUAL",
            NEqual => "NEQUAL",
            Geq => "GEQ",
            Gt => "GT",
            Lt => "LT",
            Leq => "LEQ",
            ShLeft => "SHLEFTII",
            ShRight => "SHRIGHTII",
            UShRight => "USHRIGHTII",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MODII",
            Neg => "NEG",
            Comp => "COMPI",
            MovSp => "MOVSP",
            StoreStateAll => "STORE_STATEALL",
            Jmp => "JMP",
            Jsr => "JSR",
            Jz => "JZ",
            Retn => "RETN",
            Destruct => "DESTRUCT",
            Not => "NOTI",
            DecISp => "DECISP",
            IncISp => "INCISP",
            Jnz => "JNZ",
            CpDownBp => "CPDOWNBP",
            CpTopBp => "CPTOPBP",
            DecIBp => "DECIBP",
            IncIBp => "INCIBP",
            SaveBp => "SAVEBP",
            RestoreBp => "RESTOREBP",
            StoreState => "STORE_STATE",
            Nop => "NOP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip_covers_every_opcode() {
        for b in 0x01u8..=0x2D {
            let op = Opcode::try_from(b).unwrap();
            assert_eq!(op as u8, b);
        }
        assert_eq!(Opcode::try_from(0x00), Err(0x00));
        assert_eq!(Opcode::try_from(0x2E), Err(0x2E));
    }
}
