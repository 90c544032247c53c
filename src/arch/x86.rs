//! 32-bit x86 operands and mnemonics, in MASM syntax.

use std::fmt::{self, Display};

/// Bytes per stack slot.
pub const DWORD: u32 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register {
    Eax,
    Ebx,
    Ecx,
    Edx,
    Esi,
    Ebp,
    Esp,
    Al,
    Cl,
    Xmm0,
    Xmm1,
}

impl Display for Register {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Register::*;

        let name = match self {
            Eax => "eax",
            Ebx => "ebx",
            Ecx => "ecx",
            Edx => "edx",
            Esi => "esi",
            Ebp => "ebp",
            Esp => "esp",
            Al => "al",
            Cl => "cl",
            Xmm0 => "xmm0",
            Xmm1 => "xmm1",
        };

        fmt.write_str(name)
    }
}

/// Width of a memory access.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Size {
    Byte,
    Dword,
    Qword,
}

impl Display for Size {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Size::Byte => "byte",
            Size::Dword => "dword",
            Size::Qword => "qword",
        };

        fmt.write_str(name)
    }
}

/// What a memory operand is relative to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Base {
    Register(Register),

    /// A data symbol, such as the display table.
    Symbol(&'static str),
}

/// `size ptr [base +/- displacement]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Memory {
    pub size: Size,
    pub base: Base,
    pub displacement: i32,
}

impl Memory {
    pub fn new(size: Size, base: Register, displacement: i32) -> Self {
        Memory {
            size,
            base: Base::Register(base),
            displacement,
        }
    }

    /// Same base, moved by some bytes.
    pub fn offset(self, bytes: i32) -> Self {
        Memory {
            displacement: self.displacement + bytes,
            ..self
        }
    }

    pub fn sized(self, size: Size) -> Self {
        Memory { size, ..self }
    }
}

impl Display for Memory {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} ptr [", self.size)?;
        match self.base {
            Base::Register(register) => write!(fmt, "{}", register)?,
            Base::Symbol(symbol) => fmt.write_str(symbol)?,
        }

        match self.displacement {
            0 => (),
            displacement if displacement < 0 => write!(fmt, " - {}", -(displacement as i64))?,
            displacement => write!(fmt, " + {}", displacement)?,
        }

        fmt.write_str("]")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Register(Register),
    Memory(Memory),
    Immediate(i32),

    /// Raw text, such as a jump target or a format string.
    Text(String),
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(register) => write!(fmt, "{}", register),
            Operand::Memory(memory) => write!(fmt, "{}", memory),
            Operand::Immediate(value) => write!(fmt, "{}", value),
            Operand::Text(text) => fmt.write_str(text),
        }
    }
}

impl From<Register> for Operand {
    fn from(register: Register) -> Self {
        Operand::Register(register)
    }
}

impl From<Memory> for Operand {
    fn from(memory: Memory) -> Self {
        Operand::Memory(memory)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Immediate(value)
    }
}

impl From<u32> for Operand {
    fn from(value: u32) -> Self {
        Operand::Immediate(value as i32)
    }
}

impl From<String> for Operand {
    fn from(text: String) -> Self {
        Operand::Text(text)
    }
}

impl From<&String> for Operand {
    fn from(text: &String) -> Self {
        Operand::Text(text.clone())
    }
}

macro_rules! opcodes {
    ($($opcode:ident => $mnemonic:literal),+ $(,)?) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        pub enum Opcode {
            $($opcode),+
        }

        impl Display for Opcode {
            fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mnemonic = match self {
                    $(Opcode::$opcode => $mnemonic),+
                };

                fmt.pad(mnemonic)
            }
        }
    };
}

opcodes! {
    Mov => "mov",
    Movzx => "movzx",
    Lea => "lea",
    Push => "push",
    Pop => "pop",
    Add => "add",
    Sub => "sub",
    Imul => "imul",
    Cdq => "cdq",
    Idiv => "idiv",
    Neg => "neg",
    Not => "not",
    And => "and",
    Or => "or",
    Xor => "xor",
    Shl => "shl",
    Shr => "shr",
    Cmp => "cmp",
    Test => "test",
    Sete => "sete",
    Setne => "setne",
    Setl => "setl",
    Setle => "setle",
    Setg => "setg",
    Setge => "setge",
    Seta => "seta",
    Setae => "setae",
    Setb => "setb",
    Setbe => "setbe",
    Jmp => "jmp",
    Jz => "jz",
    Jnz => "jnz",
    Jle => "jle",
    Jge => "jge",
    Call => "call",
    Ret => "ret",
    Movsd => "movsd",
    Addsd => "addsd",
    Subsd => "subsd",
    Mulsd => "mulsd",
    Divsd => "divsd",
    Comisd => "comisd",
    Xorpd => "xorpd",
    Cvtsi2sd => "cvtsi2sd",
    Printf => "printf",
    Invoke => "invoke",
    Exit => "exit",
}
