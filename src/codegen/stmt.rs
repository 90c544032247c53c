//! Statements.

use super::{Generate, GenerateError, Generator, Loop};

use crate::{
    arch::{Memory, Opcode, Operand, Register, Size, DWORD},
    ast::{NodeId, NodeKind, Value},
    source::Located,
    symbols::SymbolCategory,
    types::Type,
};

impl<'a> Generator<'a> {
    pub(super) fn statement(&mut self, id: NodeId) -> Generate<()> {
        let ast = self.ast;
        let node = &ast[id];

        match &node.kind {
            NodeKind::Block(statements) => {
                for &statement in statements {
                    self.statement(statement)?;
                }

                Ok(())
            }

            NodeKind::Assign { target, value } => {
                self.expr(*value)?;
                self.store(*target)
            }

            NodeKind::If {
                condition,
                then,
                otherwise,
            } => {
                let else_label = self.new_label("else");
                let end_label = self.new_label("endif");

                self.condition(*condition)?;
                emit!(self, Jz, &else_label);

                self.statement(*then)?;
                if let Some(otherwise) = otherwise {
                    emit!(self, Jmp, &end_label);
                    self.label(&else_label);
                    self.statement(*otherwise)?;
                } else {
                    self.label(&else_label);
                }

                self.label(&end_label);
                Ok(())
            }

            NodeKind::While { condition, body } => {
                let condition_label = self.new_label("while_cond");
                let body_label = self.new_label("while_body");
                let end_label = self.new_label("while_end");

                emit!(self, Jmp, &condition_label);
                self.label(&body_label);

                self.loop_body(*body, &condition_label, &end_label)?;

                self.label(&condition_label);
                self.condition(*condition)?;
                emit!(self, Jnz, &body_label);
                self.label(&end_label);

                Ok(())
            }

            NodeKind::For {
                counter,
                from,
                to,
                downto,
                body,
            } => self.for_loop(*counter, *from, *to, *downto, *body),

            NodeKind::Continue => {
                let next = self.loops.last().expect("continue outside a loop").next.clone();
                emit!(self, Jmp, next);
                Ok(())
            }

            NodeKind::Break => {
                let end = self.loops.last().expect("break outside a loop").end.clone();
                emit!(self, Jmp, end);
                Ok(())
            }

            NodeKind::Read { targets, newline } => self.read(targets, *newline),
            NodeKind::Write { args, newline } => self.write(args, *newline),

            NodeKind::Call { .. } => {
                self.expr(id)?;
                self.discard(node.ty.size());
                Ok(())
            }

            _ => unreachable!("expression in statement position"),
        }
    }

    /// Evaluates a condition into the zero flag.
    fn condition(&mut self, condition: NodeId) -> Generate<()> {
        self.expr(condition)?;
        emit!(self, Pop, Register::Eax);
        emit!(self, Test, Register::Eax, Register::Eax);

        Ok(())
    }

    fn loop_body(&mut self, body: NodeId, next: &str, end: &str) -> Generate<()> {
        self.loops.push(Loop {
            next: next.to_owned(),
            end: end.to_owned(),
        });

        let result = self.statement(body);
        self.loops.pop();

        result
    }

    /// The bound is evaluated once and kept in a hidden frame slot.
    fn for_loop(
        &mut self,
        counter: NodeId,
        from: NodeId,
        to: NodeId,
        downto: bool,
        body: NodeId,
    ) -> Generate<()> {
        let condition_label = self.new_label("for_cond");
        let body_label = self.new_label("for_body");
        let next_label = self.new_label("for_next");
        let end_label = self.new_label("for_end");

        self.expr(from)?;
        self.store(counter)?;

        let frame = self.frame;
        let bound = self.temporary(DWORD);
        self.expr(to)?;
        emit!(self, Pop, bound);

        emit!(self, Jmp, &condition_label);
        self.label(&body_label);
        self.loop_body(body, &next_label, &end_label)?;

        self.label(&next_label);
        let step = self.resolve(counter)?;
        if downto {
            emit!(self, Sub, step, 1);
        } else {
            emit!(self, Add, step, 1);
        }

        self.label(&condition_label);
        let current = self.resolve(counter)?;
        emit!(self, Mov, Register::Eax, current);
        emit!(self, Cmp, Register::Eax, bound);
        if downto {
            emit!(self, Jge, &body_label);
        } else {
            emit!(self, Jle, &body_label);
        }

        self.label(&end_label);
        self.frame = frame;

        Ok(())
    }

    /// One `scanf` per target, reading straight into its storage.
    fn read(&mut self, targets: &[NodeId], newline: bool) -> Generate<()> {
        for &target in targets {
            let format = match self.ast[target].ty {
                Type::Integer => "%d",
                Type::Double => "%lf",
                Type::Char => "%c",
                ref ty => unreachable!("cannot read into {}", ty),
            };

            self.address(target)?;
            emit!(self, Pop, Register::Eax);

            // Only the low byte is read
            if let Type::Char = self.ast[target].ty {
                emit!(self, Mov, Memory::new(Size::Dword, Register::Eax, 0), 0);
            }

            self.scanf(format, Some(Register::Eax));
        }

        if newline {
            self.scanf("%*[^\\n]%*c", None);
        }

        Ok(())
    }

    fn scanf(&mut self, format: &str, target: Option<Register>) {
        let mut operands = vec![
            Operand::Text("crt_scanf".into()),
            Operand::Text(format!("cfm$(\"{}\")", format)),
        ];

        operands.extend(target.map(Operand::from));
        self.push(Opcode::Invoke, operands);
    }

    /// A single `printf` for the whole statement. Constants are embedded in
    /// the format string, variables of the current frame are passed as
    /// they are and anything else goes through a temporary.
    fn write(&mut self, args: &[NodeId], newline: bool) -> Generate<()> {
        let ast = self.ast;
        let frame = self.frame;

        let mut format = String::new();
        let mut operands = Vec::new();

        for &arg in args {
            let node = &ast[arg];
            if let Some(value) = ast.value(arg) {
                escape(&constant_text(value), &mut format);
                continue;
            }

            let (conversion, size) = match node.ty {
                Type::Integer => ("%d", Size::Dword),
                Type::Char => ("%c", Size::Dword),
                Type::Double => ("%f", Size::Qword),
                _ => return Err(Located::at(GenerateError::RuntimeString, node.location.clone())),
            };

            format.push_str(conversion);

            let memory = match self.direct(arg) {
                Some(memory) => memory,
                None => {
                    self.expr(arg)?;

                    let temporary = self.temporary(node.ty.size());
                    self.pop_memory(temporary, node.ty.size());
                    temporary
                }
            };

            operands.push(Operand::from(memory.sized(size)));
        }

        if newline {
            format.push_str("\\n");
        }

        if !format.is_empty() {
            operands.insert(0, Operand::Text(format!("\"{}\"", format)));
            self.push(Opcode::Printf, operands);
        }

        self.frame = frame;
        Ok(())
    }

    /// Operand for a variable of the current frame, without any code.
    fn direct(&mut self, id: NodeId) -> Option<Memory> {
        let ast = self.ast;
        match &ast[id].kind {
            NodeKind::Var(symbol) => {
                let slot = symbol.slot?;
                let direct = slot.level == self.level
                    && matches!(symbol.category, SymbolCategory::Var | SymbolCategory::Const);

                if direct {
                    self.resolve(id).ok()
                } else {
                    None
                }
            }

            _ => None,
        }
    }
}

/// Text of a constant as `printf` would show it.
fn constant_text(value: &Value) -> String {
    match value {
        Value::Integer(integer) => integer.to_string(),
        Value::Double(double) => format!("{:.6}", double),
        Value::Char(c) => (*c as char).to_string(),
        Value::String(string) => string.clone(),
        Value::Array(_) | Value::Record(_) => unreachable!("aggregates are not written"),
    }
}

/// Escapes text for a format string literal.
fn escape(text: &str, format: &mut String) {
    for c in text.chars() {
        match c {
            '%' => format.push_str("%%"),
            '\\' => format.push_str("\\\\"),
            '"' => format.push_str("\\q"),
            '\n' => format.push_str("\\n"),
            '\t' => format.push_str("\\t"),
            c => format.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{codegen::generate, parse_source};

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
    fn if_else() {
        let lines = listing("var x: integer; begin if x < 1 then x := 1 else x := 2; end.");

        assert!(contains(
            &lines,
            &[
                "push dword ptr [ebp - 4]",
                "push 1",
                "pop ebx",
                "pop eax",
                "cmp eax, ebx",
                "setl al",
                "movzx eax, al",
                "neg eax",
                "push eax",
                "pop eax",
                "test eax, eax",
                "jz else_0",
                "push 1",
                "pop dword ptr [ebp - 4]",
                "jmp endif_1",
                "else_0:",
                "push 2",
                "pop dword ptr [ebp - 4]",
                "endif_1:",
            ]
        ));
    }

    #[test]
    fn while_with_break() {
        let lines = listing("var x: integer; begin while x do begin x := x - 1; break; end; end.");

        assert!(contains(&lines, &["jmp while_cond_0", "while_body_1:"]));
        assert!(lines.contains(&"jmp while_end_2".to_string()));
        assert!(contains(
            &lines,
            &[
                "while_cond_0:",
                "push dword ptr [ebp - 4]",
                "pop eax",
                "test eax, eax",
                "jnz while_body_1",
                "while_end_2:",
            ]
        ));
    }

    #[test]
    fn for_keeps_its_bound() {
        let lines = listing("var i, n: integer; begin for i := n downto 1 do continue; end.");

        assert!(lines.contains(&"sub esp, 12".to_string()));
        assert!(contains(
            &lines,
            &[
                "push dword ptr [ebp - 8]",
                "pop dword ptr [ebp - 4]",
                "push 1",
                "pop dword ptr [ebp - 12]",
                "jmp for_cond_0",
                "for_body_1:",
                "jmp for_next_2",
                "for_next_2:",
                "sub dword ptr [ebp - 4], 1",
                "for_cond_0:",
                "mov eax, dword ptr [ebp - 4]",
                "cmp eax, dword ptr [ebp - 12]",
                "jge for_body_1",
                "for_end_3:",
            ]
        ));
    }

    #[test]
    fn write_format() {
        let lines = listing(
            "var x: integer; d: double; c: char; \
             begin writeln('x = ', x, ' 100%', d + 1, c); end.",
        );

        assert!(lines.contains(
            &"printf(\"x = %d 100%%%f%c\\n\", dword ptr [ebp - 4], qword ptr [ebp - 24], dword ptr [ebp - 16])"
                .to_string()
        ));

        assert!(lines.contains(&"sub esp, 24".to_string()));
    }

    #[test]
    fn array_constants_fill_every_dword() {
        let lines = listing("var a: array[1..2] of double = (1, 2.5); begin end.");

        assert!(contains(
            &lines,
            &[
                "push 1074003968",
                "push 0",
                "push 1072693248",
                "push 0",
                "pop dword ptr [ebp - 16]",
                "pop dword ptr [ebp - 12]",
                "pop dword ptr [ebp - 8]",
                "pop dword ptr [ebp - 4]",
            ]
        ));
    }

    #[test]
    fn double_arithmetic_and_comparison() {
        let lines = listing(
            "var d: double; i: integer; \
             begin d := d * i; if d < 1.5 then i := 1; end.",
        );

        assert!(contains(
            &lines,
            &[
                "push dword ptr [ebp - 4]",
                "push dword ptr [ebp - 8]",
                "push dword ptr [ebp - 12]",
                "cvtsi2sd xmm0, dword ptr [esp]",
                "sub esp, 4",
                "movsd qword ptr [esp], xmm0",
                "movsd xmm1, qword ptr [esp]",
                "add esp, 8",
                "movsd xmm0, qword ptr [esp]",
                "add esp, 8",
                "mulsd xmm0, xmm1",
                "sub esp, 8",
                "movsd qword ptr [esp], xmm0",
                "pop dword ptr [ebp - 8]",
                "pop dword ptr [ebp - 4]",
            ]
        ));

        assert!(contains(
            &lines,
            &[
                "push 1073217536",
                "push 0",
                "movsd xmm1, qword ptr [esp]",
                "add esp, 8",
                "movsd xmm0, qword ptr [esp]",
                "add esp, 8",
                "comisd xmm0, xmm1",
                "setb al",
                "movzx eax, al",
                "neg eax",
                "push eax",
                "pop eax",
                "test eax, eax",
                "jz else_0",
            ]
        ));
    }

    #[test]
    fn integer_division() {
        let lines = listing("var a, b: integer; begin a := a div b; b := a mod 3; end.");

        assert!(contains(
            &lines,
            &[
                "push dword ptr [ebp - 4]",
                "push dword ptr [ebp - 8]",
                "pop ebx",
                "pop eax",
                "cdq",
                "idiv ebx",
                "push eax",
                "pop dword ptr [ebp - 4]",
                "push dword ptr [ebp - 4]",
                "push 3",
                "pop ebx",
                "pop eax",
                "cdq",
                "idiv ebx",
                "mov eax, edx",
                "push eax",
                "pop dword ptr [ebp - 8]",
            ]
        ));
    }

    #[test]
    fn runtime_strings_are_rejected() {
        let source = "var s: string; begin s := 'abc'; end.";
        let program = parse_source(source.as_bytes(), "test").unwrap();
        assert!(generate(&program).is_err());

        let source = "var s: string; begin write(s); end.";
        let program = parse_source(source.as_bytes(), "test").unwrap();
        assert!(generate(&program).is_err());
    }

    #[test]
    fn read_into_variables() {
        let lines = listing("var a: array[1..3] of char; i: integer; begin readln(a[i]); end.");

        assert!(contains(
            &lines,
            &[
                "lea eax, dword ptr [ebp - 12]",
                "push eax",
                "push dword ptr [ebp - 16]",
                "pop ebx",
                "sub ebx, 1",
                "imul ebx, 4",
                "add dword ptr [esp], ebx",
                "pop eax",
                "mov dword ptr [eax], 0",
                "invoke crt_scanf, cfm$(\"%c\"), eax",
            ]
        ));
    }
}
