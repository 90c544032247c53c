//! Code generation.
//!
//! The generator walks each function's typed tree once and lowers it to
//! a stack machine on top of the x86 hardware stack: every expression
//! leaves exactly one value on the stack, statements leave nothing.
//! Values move in dwords, so an `n`-byte value takes `n / 4` pushes.
//!
//! # Frames
//! Each function keeps its own frame pointer in `ebp` and registers it in
//! the display table under its lexical level. Variables of enclosing
//! functions are then reached through `esi`, loaded from the display.
//!
//! ```text
//! ebp + 12 + ...  arguments, pushed left to right
//! ebp + 8         return address
//! ebp + 4         caller's display entry for this level
//! ebp             caller's ebp
//! ebp - ...       locals, then temporaries
//! ```

use std::mem;

use thiserror::Error;

use crate::{
    arch::{AsmCode, Base, Command, Memory, Opcode, Operand, Register, Size, DISPLAY, DWORD, START},
    ast::{Ast, Function, Program},
    source::Located,
    types::{Signature, Type},
};

mod expr;
mod stmt;

/// Saved display entry, saved `ebp` and return address.
const FRAME_LINK: u32 = 12;

pub type Generate<T> = Result<T, Located<GenerateError>>;

/// Valid programs that have no lowering.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("String values can only be written as constants")]
    RuntimeString,

    #[error("Functions cannot return values of type {0}")]
    AggregateResult(Type),
}

/// Lowers a whole program to an assembly listing.
pub fn generate(program: &Program) -> Generate<AsmCode> {
    let mut cx = Generator {
        ast: &program.ast,
        commands: Vec::new(),
        code: Vec::new(),
        labels: 0,
        level: 0,
        parameters: vec![0],
        frame: 0,
        frame_max: 0,
        loops: Vec::new(),
    };

    for (index, function) in program.functions.iter().enumerate() {
        cx.parameters = parameter_blocks(&program.functions, index);
        cx.function(function)?;
    }

    cx.parameters = vec![0];
    cx.main(&program.main)?;

    let levels = program
        .functions
        .iter()
        .map(|function| function.signature.level + 1)
        .max()
        .unwrap_or(1);

    Ok(AsmCode {
        levels,
        commands: cx.commands,
    })
}

/// Jump targets of the innermost loop.
struct Loop {
    next: String,
    end: String,
}

struct Generator<'a> {
    ast: &'a Ast,

    /// Finished functions.
    commands: Vec<Command>,

    /// Function being generated.
    code: Vec<Command>,

    labels: u32,
    level: u32,

    /// Bytes of arguments taken by the active function at each level.
    parameters: Vec<u32>,

    /// Bytes below `ebp` in use, locals included.
    frame: u32,
    frame_max: u32,

    loops: Vec<Loop>,
}

impl<'a> Generator<'a> {
    fn push(&mut self, opcode: Opcode, operands: Vec<Operand>) {
        self.code.push(Command::Instruction { opcode, operands });
    }

    fn function(&mut self, function: &Function) -> Generate<()> {
        let signature = &function.signature;
        log::debug!("Generating function `{}`", signature.name.as_ref());

        let result = &signature.result;
        if !matches!(result, Type::Nil | Type::Integer | Type::Char | Type::Double) {
            let error = GenerateError::AggregateResult(result.clone());
            return Err(Located::at(error, signature.name.location().clone()));
        }

        self.enter(function)?;
        let body = mem::take(&mut self.code);

        let display = display(signature.level);
        self.label(&function_label(signature));
        emit!(self, Push, display);
        emit!(self, Push, Register::Ebp);
        emit!(self, Mov, Register::Ebp, Register::Esp);
        emit!(self, Mov, display, Register::Ebp);
        emit!(self, Sub, Register::Esp, self.frame_max);
        self.code.extend(body);

        // `result` is always the first local
        let result_slot = Memory::new(Size::Dword, Register::Ebp, -(result.size() as i32));
        match result {
            Type::Integer | Type::Char => emit!(self, Mov, Register::Eax, result_slot),
            Type::Double => emit!(self, Movsd, Register::Xmm0, result_slot.sized(Size::Qword)),
            _ => (),
        }

        emit!(self, Mov, Register::Esp, Register::Ebp);
        emit!(self, Pop, Register::Ebp);
        emit!(self, Pop, display);
        emit!(self, Ret);

        self.commands.append(&mut self.code);
        Ok(())
    }

    fn main(&mut self, main: &Function) -> Generate<()> {
        log::debug!("Generating main program `{}`", main.signature.name.as_ref());

        self.enter(main)?;
        let body = mem::take(&mut self.code);

        self.label(START);
        emit!(self, Push, Register::Ebp);
        emit!(self, Mov, Register::Ebp, Register::Esp);
        emit!(self, Mov, display(0), Register::Ebp);
        emit!(self, Sub, Register::Esp, self.frame_max);
        self.code.extend(body);

        emit!(self, Mov, Register::Esp, Register::Ebp);
        emit!(self, Pop, Register::Ebp);
        emit!(self, Exit);

        self.commands.append(&mut self.code);
        Ok(())
    }

    /// Generates a function body into `code`, leaving the frame size in
    /// `frame_max`.
    fn enter(&mut self, function: &Function) -> Generate<()> {
        self.level = function.signature.level;
        self.frame = function.locals.size();
        self.frame_max = self.frame;
        self.loops.clear();
        self.code.clear();

        self.statement(function.body)
    }

    /// Allocates a fresh label.
    fn new_label(&mut self, prefix: &str) -> String {
        let label = format!("{}_{}", prefix, self.labels);
        self.labels += 1;

        log::trace!("Allocated label `{}`", label);
        label
    }

    fn label(&mut self, label: &str) {
        self.code.push(Command::Label(label.to_owned()));
    }

    /// Reserves a frame slot below the locals. Slots are released by
    /// restoring `frame` to an earlier value.
    fn temporary(&mut self, size: u32) -> Memory {
        self.frame += size;
        self.frame_max = self.frame_max.max(self.frame);

        Memory::new(Size::Dword, Register::Ebp, -(self.frame as i32))
    }

    /// Pushes a value from memory, highest dword first so that the lowest
    /// one ends up on top.
    fn push_memory(&mut self, memory: Memory, size: u32) {
        for dword in (0..size / DWORD).rev() {
            emit!(self, Push, memory.sized(Size::Dword).offset((dword * DWORD) as i32));
        }
    }

    /// Pops a value into memory. Inverse of [`Generator::push_memory()`].
    fn pop_memory(&mut self, memory: Memory, size: u32) {
        for dword in 0..size / DWORD {
            emit!(self, Pop, memory.sized(Size::Dword).offset((dword * DWORD) as i32));
        }
    }

    fn discard(&mut self, size: u32) {
        if size > 0 {
            emit!(self, Add, Register::Esp, size);
        }
    }
}

/// Display entry for a lexical level.
fn display(level: u32) -> Memory {
    Memory {
        size: Size::Dword,
        base: Base::Symbol(DISPLAY),
        displacement: (level * DWORD) as i32,
    }
}

fn function_label(signature: &Signature) -> String {
    format!("fn_{}_{}", signature.name.as_ref(), signature.id.0)
}

/// Argument block sizes of a function and of every function enclosing it,
/// indexed by lexical level.
///
/// Functions are listed innermost first, so the parent of a function is
/// the first one after it that sits one level up.
fn parameter_blocks(functions: &[Function], index: usize) -> Vec<u32> {
    let function = &functions[index];
    let level = function.signature.level as usize;

    let mut blocks = vec![0; level + 1];
    blocks[level] = function.signature.parameters.size();

    let mut wanted = level;
    for outer in &functions[index + 1..] {
        let outer_level = outer.signature.level as usize;
        if outer_level + 1 == wanted {
            blocks[outer_level] = outer.signature.parameters.size();
            wanted = outer_level;
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    fn listing(source: &str) -> Vec<String> {
        let program = parse_source(source.as_bytes(), "test").unwrap();
        let code = generate(&program).unwrap();

        code.to_string()
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect()
    }

    fn contains(lines: &[String], expected: &[&str]) -> bool {
        lines
            .windows(expected.len())
            .any(|window| window.iter().zip(expected).all(|(line, expected)| line == expected))
    }

    #[test]
    fn main_frame() {
        let lines = listing("var x: integer; d: double; begin end.");
        assert!(contains(
            &lines,
            &[
                "start:",
                "push ebp",
                "mov ebp, esp",
                "mov dword ptr [display], ebp",
                "sub esp, 12",
            ]
        ));

        assert!(contains(&lines, &["mov esp, ebp", "pop ebp", "exit", "end start"]));
    }

    #[test]
    fn function_frames() {
        let lines = listing("function f(a, b: integer): integer; begin result := b; end; begin end.");

        assert!(contains(
            &lines,
            &[
                "fn_f_1:",
                "push dword ptr [display + 4]",
                "push ebp",
                "mov ebp, esp",
                "mov dword ptr [display + 4], ebp",
                "sub esp, 4",
                "push dword ptr [ebp + 12]",
                "pop dword ptr [ebp - 4]",
                "mov eax, dword ptr [ebp - 4]",
                "mov esp, ebp",
                "pop ebp",
                "pop dword ptr [display + 4]",
                "ret",
            ]
        ));

        assert!(lines.contains(&"display dd 2 dup(?)".to_string()));
    }

    #[test]
    fn outer_variables_go_through_the_display() {
        let lines = listing(
            "var g: integer; \
             procedure p(a: integer); \
               procedure q; begin a := g; end; \
             begin q; end; \
             begin p(1); end.",
        );

        assert!(contains(
            &lines,
            &[
                "mov esi, dword ptr [display]",
                "push dword ptr [esi - 4]",
                "mov esi, dword ptr [display + 4]",
                "pop dword ptr [esi + 12]",
            ]
        ));

        assert!(contains(&lines, &["push 1", "call fn_p_1", "add esp, 4"]));
    }

    #[test]
    fn aggregate_results_are_rejected() {
        let source = "type a = array[1..2] of integer; function f: a; begin end; begin end.";
        let program = parse_source(source.as_bytes(), "test").unwrap();

        let error = generate(&program).unwrap_err();
        assert!(matches!(error.val(), GenerateError::AggregateResult(_)));
    }

    #[test]
    fn parents_follow_their_children() {
        let program = parse_source(
            "procedure a(x: integer); \
               procedure b(y, z: integer); procedure c; begin end; begin end; \
             begin end; \
             begin end."
                .as_bytes(),
            "test",
        )
        .unwrap();

        let names: Vec<_> = program
            .functions
            .iter()
            .map(|function| function.signature.name.as_ref().to_string())
            .collect();

        assert_eq!(names, vec!["c", "b", "a"]);
        assert_eq!(parameter_blocks(&program.functions, 0), vec![0, 4, 8, 0]);
    }
}
