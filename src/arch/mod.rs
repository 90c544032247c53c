//! Assembly listings.
//!
//! Code is generated into an [`AsmCode`], a flat sequence of
//! [`Command`]s. Its [`Display`] implementation produces a complete
//! MASM32 source file: the runtime include, the display table used to
//! reach variables of enclosing functions, every user function and
//! finally the program entry point at `start:`.

use std::fmt::{self, Display};

mod x86;

pub use x86::{Base, Memory, Opcode, Operand, Register, Size, DWORD};

/// Data symbol holding the frame pointer of the active function at each
/// lexical level.
pub const DISPLAY: &str = "display";

/// Program entry point.
pub const START: &str = "start";

/// One line of a listing.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Instruction {
        opcode: Opcode,
        operands: Vec<Operand>,
    },

    Label(String),
}

impl Display for Command {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (opcode, operands) = match self {
            Command::Label(label) => return write!(fmt, "{}:", label),
            Command::Instruction { opcode, operands } => (opcode, operands),
        };

        // Runtime macros take their arguments in parentheses
        if let Opcode::Printf = opcode {
            write!(fmt, "\t{}(", opcode)?;
            write_operands(fmt, operands)?;
            return fmt.write_str(")");
        }

        if operands.is_empty() {
            write!(fmt, "\t{}", opcode)
        } else {
            write!(fmt, "\t{:7} ", opcode)?;
            write_operands(fmt, operands)
        }
    }
}

fn write_operands(fmt: &mut fmt::Formatter<'_>, operands: &[Operand]) -> fmt::Result {
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            fmt.write_str(", ")?;
        }

        write!(fmt, "{}", operand)?;
    }

    Ok(())
}

/// A complete program listing.
#[derive(Clone, Debug, Default)]
pub struct AsmCode {
    /// Number of lexical levels, main program included.
    pub levels: u32,
    pub commands: Vec<Command>,
}

impl AsmCode {
    /// Instructions only, in order, without labels.
    pub fn instructions(&self) -> impl Iterator<Item = (Opcode, &[Operand])> {
        self.commands.iter().filter_map(|command| match command {
            Command::Instruction { opcode, operands } => Some((*opcode, operands.as_slice())),
            Command::Label(_) => None,
        })
    }
}

impl Display for AsmCode {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(fmt, "include c:\\masm32\\include\\masm32rt.inc")?;
        writeln!(fmt, ".xmm")?;
        writeln!(fmt, ".data?")?;
        writeln!(fmt, "{} dd {} dup(?)", DISPLAY, self.levels.max(1))?;
        writeln!(fmt, ".code")?;

        for command in &self.commands {
            writeln!(fmt, "{}", command)?;
        }

        writeln!(fmt, "end {}", START)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_format() {
        let code = AsmCode {
            levels: 1,
            commands: vec![
                Command::Label(START.into()),
                Command::Instruction {
                    opcode: Opcode::Push,
                    operands: vec![Register::Ebp.into()],
                },
                Command::Instruction {
                    opcode: Opcode::Printf,
                    operands: vec![Operand::Text("\"%d\"".into()), Register::Eax.into()],
                },
                Command::Instruction {
                    opcode: Opcode::Exit,
                    operands: vec![],
                },
            ],
        };

        let listing = code.to_string();
        let lines: Vec<_> = listing.lines().collect();

        assert_eq!(lines[0], "include c:\\masm32\\include\\masm32rt.inc");
        assert_eq!(lines[3], "display dd 1 dup(?)");
        assert_eq!(lines[5], "start:");
        assert_eq!(lines[6], "\tpush    ebp");
        assert_eq!(lines[7], "\tprintf(\"%d\", eax)");
        assert_eq!(lines[8], "\texit");
        assert_eq!(lines[9], "end start");
    }
}
