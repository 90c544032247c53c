//! Expressions and memory references.

use super::{function_label, Generate, GenerateError, Generator, FRAME_LINK};

use crate::{
    arch::{Memory, Register, Size, DWORD},
    ast::{Node, NodeId, NodeKind, Value},
    ops::Operator,
    source::Located,
    symbols::{SlotKind, Symbol, SymbolCategory, ADDRESS_SIZE},
    types::{Signature, Type, STRING_SIZE},
};

/// Where a memory reference lives.
pub(super) enum Place {
    /// Known operand. Its base register is only valid until the next
    /// instruction that is not part of the access.
    Memory(Memory),

    /// Address on top of the stack.
    Stack,
}

impl<'a> Generator<'a> {
    /// Pushes the value of an expression.
    pub(super) fn expr(&mut self, id: NodeId) -> Generate<()> {
        let ast = self.ast;
        let node = &ast[id];

        match &node.kind {
            NodeKind::Const(value) | NodeKind::TypedConst(value) => self.constant(node, value),
            NodeKind::Var(_) | NodeKind::Index { .. } | NodeKind::Field { .. } => {
                self.load(id, node.ty.size())
            }

            NodeKind::UnaryMinus(operand) => {
                self.expr(*operand)?;
                match node.ty {
                    // Flips the sign bit in the high dword
                    Type::Double => emit!(self, Xor, stack_top(DWORD as i32), i32::MIN),
                    _ => emit!(self, Neg, stack_top(0)),
                }

                Ok(())
            }

            NodeKind::Not(operand) => {
                self.expr(*operand)?;
                match ast[*operand].ty {
                    Type::Double => {
                        self.pop_double(Register::Xmm0);
                        emit!(self, Xorpd, Register::Xmm1, Register::Xmm1);
                        emit!(self, Comisd, Register::Xmm0, Register::Xmm1);
                        emit!(self, Sete, Register::Al);
                        self.boolean();
                    }

                    _ => emit!(self, Not, stack_top(0)),
                }

                Ok(())
            }

            NodeKind::Cast(operand) => self.cast(node, *operand),
            NodeKind::Binary {
                operator,
                left,
                right,
            } => self.binary(node, *operator, *left, *right),

            NodeKind::Call {
                function,
                arguments,
            } => self.call(node, function, arguments),

            _ => unreachable!("statement in expression position"),
        }
    }

    fn constant(&mut self, node: &Node, value: &Value) -> Generate<()> {
        if let Type::String = node.ty {
            return Err(Located::at(GenerateError::RuntimeString, node.location.clone()));
        }

        let mut dwords = Vec::new();
        serialize(value, &mut dwords);

        for dword in dwords.into_iter().rev() {
            emit!(self, Push, dword);
        }

        Ok(())
    }

    fn cast(&mut self, node: &Node, operand: NodeId) -> Generate<()> {
        let ast = self.ast;
        match (&ast[operand].ty, &node.ty) {
            (Type::Integer | Type::Char, Type::Integer | Type::Char) => self.expr(operand),

            (Type::Integer | Type::Char, Type::Double) => {
                self.expr(operand)?;
                emit!(self, Cvtsi2sd, Register::Xmm0, stack_top(0));
                emit!(self, Sub, Register::Esp, DWORD);
                self.push_double(Register::Xmm0, false);
                Ok(())
            }

            (_, Type::String) => Err(Located::at(
                GenerateError::RuntimeString,
                node.location.clone(),
            )),

            (from, to) => unreachable!("no conversion from {} to {}", from, to),
        }
    }

    fn binary(&mut self, node: &Node, operator: Operator, left: NodeId, right: NodeId) -> Generate<()> {
        let operands = self.ast[left].ty.clone();
        if let Type::String = operands {
            return Err(Located::at(GenerateError::RuntimeString, node.location.clone()));
        }

        self.expr(left)?;
        self.expr(right)?;

        match operands {
            Type::Double => self.double_operation(operator),
            _ => self.integer_operation(operator),
        }

        Ok(())
    }

    fn integer_operation(&mut self, operator: Operator) {
        use Operator::*;
        use Register::*;

        emit!(self, Pop, Ebx);
        emit!(self, Pop, Eax);

        match operator {
            Add => emit!(self, Add, Eax, Ebx),
            Sub => emit!(self, Sub, Eax, Ebx),
            Mul => emit!(self, Imul, Eax, Ebx),
            And => emit!(self, And, Eax, Ebx),
            Or => emit!(self, Or, Eax, Ebx),
            Xor => emit!(self, Xor, Eax, Ebx),

            Divide | Div | Mod => {
                emit!(self, Cdq);
                emit!(self, Idiv, Ebx);

                if operator == Mod {
                    emit!(self, Mov, Eax, Edx);
                }
            }

            Shl | Shr => {
                emit!(self, Mov, Ecx, Ebx);
                match operator {
                    Shl => emit!(self, Shl, Eax, Cl),
                    _ => emit!(self, Shr, Eax, Cl),
                }
            }

            Equal | NotEqual | Less | LessOrEqual | Greater | GreaterOrEqual => {
                emit!(self, Cmp, Eax, Ebx);
                match operator {
                    Equal => emit!(self, Sete, Al),
                    NotEqual => emit!(self, Setne, Al),
                    Less => emit!(self, Setl, Al),
                    LessOrEqual => emit!(self, Setle, Al),
                    Greater => emit!(self, Setg, Al),
                    _ => emit!(self, Setge, Al),
                }

                emit!(self, Movzx, Eax, Al);
                emit!(self, Neg, Eax);
            }
        }

        emit!(self, Push, Eax);
    }

    fn double_operation(&mut self, operator: Operator) {
        use Operator::*;
        use Register::*;

        self.pop_double(Xmm1);
        self.pop_double(Xmm0);

        match operator {
            Add => emit!(self, Addsd, Xmm0, Xmm1),
            Sub => emit!(self, Subsd, Xmm0, Xmm1),
            Mul => emit!(self, Mulsd, Xmm0, Xmm1),
            Divide => emit!(self, Divsd, Xmm0, Xmm1),

            Equal | NotEqual | Less | LessOrEqual | Greater | GreaterOrEqual => {
                // comisd sets the unsigned condition flags
                emit!(self, Comisd, Xmm0, Xmm1);
                match operator {
                    Equal => emit!(self, Sete, Al),
                    NotEqual => emit!(self, Setne, Al),
                    Less => emit!(self, Setb, Al),
                    LessOrEqual => emit!(self, Setbe, Al),
                    Greater => emit!(self, Seta, Al),
                    _ => emit!(self, Setae, Al),
                }

                self.boolean();
                return;
            }

            _ => unreachable!("`{}` is not defined for doubles", operator),
        }

        self.push_double(Xmm0, true);
    }

    /// Turns the flag byte in `al` into -1 or 0 and pushes it.
    fn boolean(&mut self) {
        emit!(self, Movzx, Register::Eax, Register::Al);
        emit!(self, Neg, Register::Eax);
        emit!(self, Push, Register::Eax);
    }

    fn pop_double(&mut self, register: Register) {
        emit!(self, Movsd, register, stack_top(0).sized(Size::Qword));
        emit!(self, Add, Register::Esp, 2 * DWORD);
    }

    /// Stores a double on the stack, making room for it first if asked to.
    fn push_double(&mut self, register: Register, reserve: bool) {
        if reserve {
            emit!(self, Sub, Register::Esp, 2 * DWORD);
        }

        emit!(self, Movsd, stack_top(0).sized(Size::Qword), register);
    }

    /// Calls a function, leaving its result if it has one.
    fn call(&mut self, node: &Node, function: &Signature, arguments: &[NodeId]) -> Generate<()> {
        for (&argument, parameter) in arguments.iter().zip(function.parameters.iter()) {
            match parameter.category {
                SymbolCategory::VarParameter => self.address(argument)?,
                _ => self.expr(argument)?,
            }
        }

        emit!(self, Call, function_label(function));
        self.discard(function.parameters.size());

        match &function.result {
            Type::Nil => (),
            Type::Integer | Type::Char => emit!(self, Push, Register::Eax),
            Type::Double => self.push_double(Register::Xmm0, true),
            ty => {
                let error = GenerateError::AggregateResult(ty.clone());
                return Err(Located::at(error, node.location.clone()));
            }
        }

        Ok(())
    }

    /// Resolves a memory reference.
    pub(super) fn place(&mut self, id: NodeId) -> Generate<Place> {
        let ast = self.ast;

        match &ast[id].kind {
            NodeKind::Var(symbol) => Ok(Place::Memory(self.variable(symbol))),

            NodeKind::Field { record, field } => {
                let offset = field.slot.expect("field without an offset").offset;
                self.displace(*record, offset as i32)
            }

            NodeKind::Index { array, index } => {
                let (low, element) = match &ast[*array].ty {
                    Type::Array(array) => (array.low, array.element.size() as i32),
                    ty => unreachable!("indexing a {}", ty),
                };

                if let Some(index) = ast.value(*index).and_then(Value::integer) {
                    return self.displace(*array, (index - low) * element);
                }

                self.address(*array)?;
                self.expr(*index)?;

                emit!(self, Pop, Register::Ebx);
                if low != 0 {
                    emit!(self, Sub, Register::Ebx, low);
                }

                if element != 1 {
                    emit!(self, Imul, Register::Ebx, element);
                }

                emit!(self, Add, stack_top(0), Register::Ebx);
                Ok(Place::Stack)
            }

            _ => unreachable!("not a memory reference"),
        }
    }

    /// Memory reference at a fixed offset from another one.
    fn displace(&mut self, base: NodeId, offset: i32) -> Generate<Place> {
        let place = match self.place(base)? {
            Place::Memory(memory) => Place::Memory(memory.offset(offset)),
            Place::Stack => {
                if offset != 0 {
                    emit!(self, Add, stack_top(0), offset);
                }

                Place::Stack
            }
        };

        Ok(place)
    }

    /// Storage of a symbol in the current frame or an enclosing one.
    fn variable(&mut self, symbol: &Symbol) -> Memory {
        let slot = symbol.slot.expect("variable without storage");

        let base = if slot.level == self.level {
            Register::Ebp
        } else {
            emit!(self, Mov, Register::Esi, super::display(slot.level));
            Register::Esi
        };

        let size = match symbol.category {
            SymbolCategory::VarParameter => ADDRESS_SIZE,
            _ => symbol.ty.size(),
        };

        let displacement = match slot.kind {
            SlotKind::Local => -((slot.offset + size) as i32),
            SlotKind::Parameter => {
                let block = self.parameters[slot.level as usize];
                (FRAME_LINK + block - slot.offset - size) as i32
            }

            SlotKind::Field => unreachable!("record field used as a variable"),
        };

        let memory = Memory::new(Size::Dword, base, displacement);
        match symbol.category {
            SymbolCategory::VarParameter => {
                emit!(self, Mov, Register::Eax, memory);
                Memory::new(Size::Dword, Register::Eax, 0)
            }

            _ => memory,
        }
    }

    /// Pushes the address of a memory reference.
    pub(super) fn address(&mut self, id: NodeId) -> Generate<()> {
        if let Place::Memory(memory) = self.place(id)? {
            emit!(self, Lea, Register::Eax, memory);
            emit!(self, Push, Register::Eax);
        }

        Ok(())
    }

    fn load(&mut self, id: NodeId, size: u32) -> Generate<()> {
        let memory = self.resolve(id)?;
        self.push_memory(memory, size);

        Ok(())
    }

    /// Pops the value on top of the stack into a memory reference.
    pub(super) fn store(&mut self, target: NodeId) -> Generate<()> {
        let size = self.ast[target].ty.size();
        let memory = self.resolve(target)?;
        self.pop_memory(memory, size);

        Ok(())
    }

    /// Memory operand for a reference, popping its address if needed.
    pub(super) fn resolve(&mut self, id: NodeId) -> Generate<Memory> {
        let memory = match self.place(id)? {
            Place::Memory(memory) => memory,
            Place::Stack => {
                emit!(self, Pop, Register::Eax);
                Memory::new(Size::Dword, Register::Eax, 0)
            }
        };

        Ok(memory)
    }
}

fn stack_top(offset: i32) -> Memory {
    Memory::new(Size::Dword, Register::Esp, offset)
}

/// Memory image of a constant, in dwords.
fn serialize(value: &Value, dwords: &mut Vec<i32>) {
    match value {
        Value::Integer(integer) => dwords.push(*integer),
        Value::Char(c) => dwords.push(*c as i32),
        Value::Double(double) => {
            let bits = double.to_bits();
            dwords.push(bits as u32 as i32);
            dwords.push((bits >> 32) as u32 as i32);
        }

        Value::String(string) => {
            // Truncated to leave room for the terminator
            let mut bytes: Vec<u8> = string.bytes().take(STRING_SIZE as usize - 1).collect();
            bytes.resize(STRING_SIZE as usize, 0);

            for chunk in bytes.chunks(DWORD as usize) {
                dwords.push(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }

        Value::Array(values) | Value::Record(values) => {
            for value in values {
                serialize(value, dwords);
            }
        }
    }
}
