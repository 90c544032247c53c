/// Appends an instruction to the code being generated.
///
/// `emit!(self, Mov, Register::Eax, memory)` pushes `mov eax, <memory>`.
/// Operands are anything convertible into [`crate::arch::Operand`].
macro_rules! emit {
    ($cx:expr, $opcode:ident) => {
        $cx.push($crate::arch::Opcode::$opcode, ::std::vec::Vec::new())
    };

    ($cx:expr, $opcode:ident, $($operand:expr),+ $(,)?) => {
        $cx.push(
            $crate::arch::Opcode::$opcode,
            ::std::vec![$($crate::arch::Operand::from($operand)),+],
        )
    };
}
