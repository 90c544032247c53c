//! Blocks and declarations.

use std::{mem, rc::Rc};

use super::{fail, located, Expected, Parse, Parser};

use crate::{
    ast::{Function, NodeId, NodeKind, Value},
    lex::{Identifier, Keyword, Token, TokenStream},
    semantic::SemanticError,
    source::{Located, Location},
    symbols::{ParameterMode, Symbol, SymbolCategory, SymbolTable},
    types::{compatibility, ArrayType, FunctionId, RecordType, Signature, Type, MAX_SIZE},
};

impl<T: TokenStream> Parser<T> {
    /// Declarations followed by a compound statement.
    ///
    /// Initializers of variables and typed constants run before the first
    /// statement of the block.
    pub(super) fn block(&mut self) -> Parse<NodeId> {
        let mut initializers = Vec::new();
        self.declarations(&mut initializers)?;

        let (location, statements) = self.compound()?;
        initializers.extend(statements);

        Ok(self.node(location, Type::Nil, NodeKind::Block(initializers)))
    }

    fn declarations(&mut self, initializers: &mut Vec<NodeId>) -> Parse<()> {
        loop {
            match self.token() {
                Token::Keyword(Keyword::Type) => self.type_section()?,
                Token::Keyword(Keyword::Const) => self.const_section(initializers)?,
                Token::Keyword(Keyword::Var) => self.var_section(initializers)?,
                Token::Keyword(Keyword::Function | Keyword::Procedure) => self.function()?,
                _ => break Ok(()),
            }
        }
    }

    fn type_section(&mut self) -> Parse<()> {
        self.keyword(Keyword::Type)?;

        loop {
            let name = self.id()?;
            self.expect(Token::Equal)?;
            let ty = self.ty()?;
            self.expect(Token::Semicolon)?;

            self.scopes.current_mut().add_type(name, ty)?;
            if !matches!(self.token(), Token::Id(_)) {
                break Ok(());
            }
        }
    }

    fn const_section(&mut self, initializers: &mut Vec<NodeId>) -> Parse<()> {
        self.keyword(Keyword::Const)?;

        loop {
            let name = self.id()?;

            if self.eat(&Token::Colon)? {
                let ty = self.ty()?;
                self.expect(Token::Equal)?;
                let (location, value) = self.typed_constant(&ty)?;

                // Scalars fold like untyped constants, only aggregates need memory
                let storage = !ty.is_scalar();
                let symbol = self.scopes.current_mut().add_constant(
                    name,
                    ty,
                    value.clone(),
                    storage,
                )?;

                if storage {
                    let init = self.initializer(symbol, location, value);
                    initializers.push(init);
                }
            } else {
                self.expect(Token::Equal)?;
                let expr = self.logical()?;

                let node = &self.ast[expr];
                let (ty, location) = (node.ty.clone(), node.location.clone());

                let value = match self.ast.value(expr) {
                    Some(value) => value.clone(),
                    None => return fail(SemanticError::ExpectedConstant, &location),
                };

                self.scopes
                    .current_mut()
                    .add_constant(name, ty, value, false)?;
            }

            self.expect(Token::Semicolon)?;
            if !matches!(self.token(), Token::Id(_)) {
                break Ok(());
            }
        }
    }

    fn var_section(&mut self, initializers: &mut Vec<NodeId>) -> Parse<()> {
        self.keyword(Keyword::Var)?;

        loop {
            let names = self.ids()?;
            self.expect(Token::Colon)?;
            let ty = self.ty()?;

            // Only single declarations take an initializer
            let init = if names.len() == 1 && self.eat(&Token::Equal)? {
                Some(self.typed_constant(&ty)?)
            } else {
                None
            };

            self.expect(Token::Semicolon)?;

            for name in names {
                let symbol = self.scopes.current_mut().add_variable(name, ty.clone())?;
                if let Some((location, value)) = init.clone() {
                    let init = self.initializer(symbol, location, value);
                    initializers.push(init);
                }
            }

            if !matches!(self.token(), Token::Id(_)) {
                break Ok(());
            }
        }
    }

    /// Assignment of a constant value to a freshly declared symbol.
    fn initializer(&mut self, symbol: Rc<Symbol>, location: Location, value: Value) -> NodeId {
        let ty = symbol.ty.clone();
        let target = self.node(location.clone(), ty.clone(), NodeKind::Var(symbol));

        let kind = if ty.is_scalar() {
            NodeKind::Const(value)
        } else {
            NodeKind::TypedConst(value)
        };

        let value = self.node(location.clone(), ty, kind);
        self.node(location, Type::Nil, NodeKind::Assign { target, value })
    }

    pub(super) fn ty(&mut self) -> Parse<Type> {
        let ty = match self.token() {
            Token::Keyword(Keyword::Integer) => Type::Integer,
            Token::Keyword(Keyword::Double) => Type::Double,
            Token::Keyword(Keyword::Char) => Type::Char,
            Token::Keyword(Keyword::String) => Type::String,
            Token::Keyword(Keyword::Array) => return self.array_type(),
            Token::Keyword(Keyword::Record) => return self.record_type(),

            Token::Id(_) => {
                let name = self.id()?;
                let symbol = self.scopes.lookup(&name)?;

                return match symbol.category {
                    SymbolCategory::Type => Ok(symbol.ty.clone()),
                    _ => fail(
                        SemanticError::ExpectedType(name.as_ref().clone()),
                        name.location(),
                    ),
                };
            }

            _ => return Err(self.unexpected(vec![Expected::Type])),
        };

        self.bump()?;
        Ok(ty)
    }

    /// `array[a..b, c..d] of T` is the same as `array[a..b] of array[c..d] of T`.
    fn array_type(&mut self) -> Parse<Type> {
        self.keyword(Keyword::Array)?;
        self.expect(Token::OpenSquare)?;

        let mut ranges = vec![self.range()?];
        while self.eat(&Token::Comma)? {
            ranges.push(self.range()?);
        }

        self.expect(Token::CloseSquare)?;
        self.keyword(Keyword::Of)?;

        let mut ty = self.ty()?;
        for range in ranges.into_iter().rev() {
            let (location, (low, high)) = range.split();
            let array = ArrayType {
                element: ty,
                low,
                high,
            };

            let size = u64::from(array.len()) * u64::from(array.element.size());
            if size > u64::from(MAX_SIZE) {
                return fail(SemanticError::TypeTooLarge, &location);
            }

            ty = Type::Array(Rc::new(array));
        }

        Ok(ty)
    }

    fn range(&mut self) -> Parse<Located<(i32, i32)>> {
        let location = self.location();

        let low = self.constant_integer()?;
        self.expect(Token::DoubleDot)?;
        let high = self.constant_integer()?;

        if low > high {
            return fail(SemanticError::BadRange { low, high }, &location);
        }

        if i64::from(high) - i64::from(low) + 1 > i64::from(MAX_SIZE) {
            return fail(SemanticError::TypeTooLarge, &location);
        }

        Ok(Located::at((low, high), location))
    }

    fn constant_integer(&mut self) -> Parse<i32> {
        let expr = self.logical()?;
        match self.ast.value(expr).and_then(Value::integer) {
            Some(integer) => Ok(integer),
            None => fail(SemanticError::ExpectedConstant, &self.ast[expr].location),
        }
    }

    fn record_type(&mut self) -> Parse<Type> {
        self.keyword(Keyword::Record)?;
        self.scopes.push(SymbolTable::fields());

        let result = self.fields();
        let fields = self.scopes.pop().expect("unbalanced scopes");
        result?;

        self.keyword(Keyword::End)?;
        Ok(Type::Record(Rc::new(RecordType { fields })))
    }

    fn fields(&mut self) -> Parse<()> {
        while let Token::Id(_) = self.token() {
            let names = self.ids()?;
            self.expect(Token::Colon)?;
            let ty = self.ty()?;

            for name in names {
                self.scopes.current_mut().add_variable(name, ty.clone())?;
            }

            if !self.eat(&Token::Semicolon)? {
                break;
            }
        }

        Ok(())
    }

    /// Constant value structured after a type.
    ///
    /// Arrays are written as `(a, b, c)` and records as `(x: a; y: b)`,
    /// with fields in declaration order.
    pub(super) fn typed_constant(&mut self, ty: &Type) -> Parse<(Location, Value)> {
        let location = self.location();

        let value = match ty {
            Type::Array(array) => {
                self.expect(Token::OpenParen)?;

                let mut values = vec![self.typed_constant(&array.element)?.1];
                while self.eat(&Token::Comma)? {
                    values.push(self.typed_constant(&array.element)?.1);
                }

                self.expect(Token::CloseParen)?;

                let expected = array.len() as usize;
                if values.len() != expected {
                    let error = SemanticError::ElementCount {
                        expected,
                        found: values.len(),
                    };

                    return fail(error, &location);
                }

                Value::Array(values)
            }

            Type::Record(record) => {
                self.expect(Token::OpenParen)?;

                let mut values = Vec::with_capacity(record.fields.len());
                for (i, field) in record.fields.iter().enumerate() {
                    if i > 0 {
                        self.expect(Token::Semicolon)?;
                    }

                    let name = self.id()?;
                    self.field_order(record.fields.get(name.as_ref()), field, &name)?;
                    self.expect(Token::Colon)?;

                    values.push(self.typed_constant(&field.ty)?.1);
                }

                self.eat(&Token::Semicolon)?;
                self.expect(Token::CloseParen)?;

                Value::Record(values)
            }

            _ => {
                let expr = self.logical()?;
                let node = &self.ast[expr];

                located(compatibility(ty, &node.ty), &node.location)?;
                let cast = self
                    .ast
                    .value(expr)
                    .and_then(|value| value.cast(ty.category()));

                match cast {
                    Some(value) => value,
                    None => return fail(SemanticError::ExpectedConstant, &node.location),
                }
            }
        };

        Ok((location, value))
    }

    fn field_order(
        &self,
        found: Option<&Rc<Symbol>>,
        expected: &Rc<Symbol>,
        name: &Located<Identifier>,
    ) -> Parse<()> {
        match found {
            None => fail(
                SemanticError::FieldNotFound(name.as_ref().clone()),
                name.location(),
            ),

            Some(found) if !Rc::ptr_eq(found, expected) => fail(
                SemanticError::IllegalInitializationOrder {
                    expected: expected.name.as_ref().clone(),
                    found: name.as_ref().clone(),
                },
                name.location(),
            ),

            Some(_) => Ok(()),
        }
    }

    /// Function or procedure declaration.
    ///
    /// The function is registered before its body is parsed, so it may call
    /// itself. Its parameters and then its locals are pushed as scopes.
    fn function(&mut self) -> Parse<()> {
        let is_procedure = self.at(&Token::Keyword(Keyword::Procedure));
        self.bump()?;

        let name = self.id()?;
        let level = self.level + 1;

        let mut parameters = SymbolTable::parameters(level);
        if self.eat(&Token::OpenParen)? {
            if !self.at(&Token::CloseParen) {
                self.parameters(&mut parameters)?;
            }

            self.expect(Token::CloseParen)?;
        }

        let result = if is_procedure {
            Type::Nil
        } else {
            self.expect(Token::Colon)?;
            self.ty()?
        };

        self.expect(Token::Semicolon)?;

        let id = FunctionId(self.next_function);
        self.next_function += 1;

        let signature = Rc::new(Signature {
            id,
            name,
            parameters,
            result,
            level,
        });

        self.scopes
            .current_mut()
            .add_function(Rc::clone(&signature))?;

        log::debug!(
            "Registered function `{}` at level {}",
            signature.name.as_ref(),
            level
        );

        let mut locals = SymbolTable::locals(level);
        if !matches!(signature.result, Type::Nil) {
            let result = Located::at(Identifier::new("result"), signature.name.location().clone());
            locals.add_variable(result, signature.result.clone())?;
        }

        self.scopes.push(signature.parameters.clone());
        self.scopes.push(locals);

        let outer_loops = mem::replace(&mut self.loops, 0);
        self.level = level;

        let body = self.block();

        self.level = level - 1;
        self.loops = outer_loops;

        let locals = self.scopes.pop().expect("unbalanced scopes");
        self.scopes.pop().expect("unbalanced scopes");

        let body = body?;
        self.expect(Token::Semicolon)?;

        self.functions.push(Function {
            signature,
            locals,
            body,
        });

        Ok(())
    }

    /// Parameter groups separated by `;`.
    fn parameters(&mut self, parameters: &mut SymbolTable) -> Parse<()> {
        let mut defaults = false;

        loop {
            let mode = if self.eat(&Token::Keyword(Keyword::Var))? {
                ParameterMode::Var
            } else if self.eat(&Token::Keyword(Keyword::Const))? {
                ParameterMode::Const
            } else {
                ParameterMode::Value
            };

            let names = self.ids()?;
            self.expect(Token::Colon)?;
            let ty = self.ty()?;

            let default = if self.at(&Token::Equal) {
                let location = self.bump()?.location().clone();
                if mode == ParameterMode::Var {
                    return fail(SemanticError::VarParameterDefault, &location);
                }

                Some(self.typed_constant(&ty)?.1)
            } else {
                None
            };

            // Once defaults begin, every later parameter needs one
            if defaults && default.is_none() {
                return fail(SemanticError::DefaultParameterOrder, names[0].location());
            }

            defaults |= default.is_some();

            for name in names {
                parameters.add_parameter(name, ty.clone(), mode, default.clone())?;
            }

            if !self.eat(&Token::Semicolon)? {
                break Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{NodeKind, Value},
        error::CompileError,
        parse_source,
        semantic::SemanticError,
        types::Type,
    };

    fn semantic_error(source: &str) -> SemanticError {
        match parse_source(source.as_bytes(), "test") {
            Err(CompileError::Semantic(error)) => error.into_inner(),
            Err(other) => panic!("expected a semantic error, found {}", other),
            Ok(_) => panic!("source should not parse"),
        }
    }

    #[test]
    fn reversed_ranges_are_rejected() {
        let error = semantic_error("var a: array[5..1] of integer; begin end.");
        assert!(matches!(error, SemanticError::BadRange { low: 5, high: 1 }));
    }

    #[test]
    fn oversized_arrays_are_rejected() {
        let sources = [
            "var a: array[1..2000000000] of integer; begin end.",
            "var a: array[-2147483647..2147483647] of char; begin end.",
            "var a: array[-2000000000..2000000000] of char; begin end.",
            "var a: array[1..1000, 1..1000, 1..1000] of double; begin end.",
            "var a, b: array[1..200000000] of integer; begin end.",
            "type r = record a, b: array[1..200000000] of integer; end; begin end.",
        ];

        for source in sources {
            let error = semantic_error(source);
            assert!(matches!(error, SemanticError::TypeTooLarge), "{}", source);
        }

        let source = "var a: array[1..1000, 1..1000] of double; begin end.";
        assert!(parse_source(source.as_bytes(), "test").is_ok());
    }

    #[test]
    fn array_constants_need_every_element() {
        let error = semantic_error("const c: array[1..3] of integer = (1, 2); begin end.");
        assert!(matches!(error, SemanticError::ElementCount { expected: 3, found: 2 }));

        let source = "var a: array[1..2] of double = (1, 2.5); begin end.";
        let program = parse_source(source.as_bytes(), "test").unwrap();

        let a = program.main.locals.iter().next().unwrap();
        assert_eq!(a.ty.size(), 16);

        match &program.ast[program.main.body].kind {
            NodeKind::Block(statements) => match &program.ast[statements[0]].kind {
                NodeKind::Assign { value, .. } => assert_eq!(
                    program.ast.value(*value),
                    Some(&Value::Array(vec![Value::Double(1.0), Value::Double(2.5)]))
                ),

                _ => panic!("not an assignment"),
            },

            _ => panic!("body is not a block"),
        }
    }

    #[test]
    fn multidimensional_arrays_nest() {
        let program = parse_source(
            "var m: array[1..3, 0..1] of double; begin end.".as_bytes(),
            "test",
        )
        .unwrap();

        let m = program.main.locals.iter().next().unwrap();
        match &m.ty {
            Type::Array(rows) => {
                assert_eq!((rows.low, rows.high), (1, 3));
                assert!(matches!(&rows.element, Type::Array(row) if row.len() == 2));
            }

            other => panic!("unexpected type {}", other),
        }

        assert_eq!(m.ty.size(), 48);
    }

    #[test]
    fn record_initializers_follow_field_order() {
        let declarations = "type r = record a: integer; b: char; end;";

        let error = semantic_error(&format!("{} const c: r = (b: 'x'; a: 1); begin end.", declarations));
        assert!(matches!(error, SemanticError::IllegalInitializationOrder { .. }));

        let source = format!("{} const c: r = (a: 1; b: 'x'); begin end.", declarations);
        let program = parse_source(source.as_bytes(), "test").unwrap();

        let c = program.main.locals.iter().find(|s| s.name.as_ref().as_ref() == "c").unwrap();
        assert_eq!(
            c.value,
            Some(Value::Record(vec![Value::Integer(1), Value::Char(b'x')]))
        );
    }

    #[test]
    fn variable_initializers_run_first() {
        let source = "var x: integer = 4; begin x := x + 1; end.";
        let program = parse_source(source.as_bytes(), "test").unwrap();

        match &program.ast[program.main.body].kind {
            NodeKind::Block(statements) => assert_eq!(statements.len(), 2),
            _ => panic!("body is not a block"),
        }
    }

    #[test]
    fn default_parameters() {
        let error = semantic_error("procedure p(a: integer = 1; b: integer); begin end; begin end.");
        assert!(matches!(error, SemanticError::DefaultParameterOrder));

        let error = semantic_error("procedure p(var a: integer = 1); begin end; begin end.");
        assert!(matches!(error, SemanticError::VarParameterDefault));

        let source = "procedure p(a: integer; const b: char = 'x'); begin end; begin p(1); end.";
        assert!(parse_source(source.as_bytes(), "test").is_ok());
    }

    #[test]
    fn functions_get_a_result_variable() {
        let source = "function f(x: integer): integer; begin result := x * 2; end; begin end.";
        let program = parse_source(source.as_bytes(), "test").unwrap();

        let f = &program.functions[0];
        let result = f.locals.iter().next().unwrap();
        assert_eq!(result.name.as_ref().as_ref(), "result");
        assert_eq!(result.slot.unwrap().offset, 0);
    }

    #[test]
    fn duplicates_in_one_scope() {
        let error = semantic_error("var x: integer; x: char; begin end.");
        assert!(matches!(error, SemanticError::Duplicate(_)));
    }
}
