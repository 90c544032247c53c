//! Expressions.
//!
//! Precedence climbs from [`Parser::logical()`] (comparisons) through
//! additive and multiplicative operators down to factors. Every binary
//! operation goes through [`Parser::operation()`], which folds constant
//! operands and inserts casts otherwise.

use std::rc::Rc;

use super::{fail, located, Expected, Parse, Parser};

use crate::{
    ast::{NodeCategory, NodeId, NodeKind, Value},
    lex::{Identifier, Keyword, Token, TokenStream},
    ops::Operator,
    semantic::SemanticError,
    source::{Located, Location},
    symbols::{Symbol, SymbolCategory},
    types::{compatibility, operation_result_type, Signature, Type},
};

impl<T: TokenStream> Parser<T> {
    /// Comparisons, the lowest precedence level.
    pub(super) fn logical(&mut self) -> Parse<NodeId> {
        self.binary_level(Operator::relational, Parser::expr)
    }

    fn expr(&mut self) -> Parse<NodeId> {
        self.binary_level(Operator::additive, Parser::term)
    }

    fn term(&mut self) -> Parse<NodeId> {
        self.binary_level(Operator::multiplicative, Parser::factor)
    }

    /// Left-associative sequence of operands at one precedence level.
    fn binary_level<O, F>(&mut self, operator: O, mut operand: F) -> Parse<NodeId>
    where
        O: Fn(&Token) -> Option<Operator>,
        F: FnMut(&mut Self) -> Parse<NodeId>,
    {
        let mut left = operand(self)?;
        while let Some(op) = operator(self.token()) {
            let location = self.bump()?.location().clone();
            let right = operand(self)?;

            left = self.operation(left, right, op, &location)?;
        }

        Ok(left)
    }

    fn factor(&mut self) -> Parse<NodeId> {
        let location = self.location();

        let value = match self.token() {
            Token::Integer(integer) => Value::Integer(*integer),
            Token::Double(double) => Value::Double(*double),
            Token::Char(c) => Value::Char(*c),
            Token::String(string) => Value::String(string.to_string()),

            Token::OpenParen => {
                self.bump()?;
                let inner = self.logical()?;
                self.expect(Token::CloseParen)?;

                return Ok(inner);
            }

            Token::Plus | Token::Minus | Token::Keyword(Keyword::Not) => {
                let operator = self.bump()?.into_inner();
                let operand = self.factor()?;

                return self.unary(&operator, operand, &location);
            }

            Token::Id(_) => return self.designator(),
            _ => return Err(self.unexpected(vec![Expected::Expression])),
        };

        self.bump()?;

        let ty = match &value {
            Value::Integer(_) => Type::Integer,
            Value::Double(_) => Type::Double,
            Value::Char(_) => Type::Char,
            _ => Type::String,
        };

        Ok(self.node(location, ty, NodeKind::Const(value)))
    }

    /// Named reference in an expression.
    fn designator(&mut self) -> Parse<NodeId> {
        let name = self.id()?;
        let symbol = self.scopes.lookup(&name)?;
        let location = name.location().clone();

        if let (SymbolCategory::Const, Some(value)) = (symbol.category, &symbol.value) {
            if symbol.ty.is_scalar() {
                // Constants are copied, never shared with their declaration
                let kind = NodeKind::Const(value.clone());
                return Ok(self.node(location, symbol.ty.clone(), kind));
            }
        }

        match symbol.category {
            SymbolCategory::Type => fail(SemanticError::IllegalExpression, &location),

            SymbolCategory::Function => {
                let signature = match &symbol.ty {
                    Type::Function(signature) => Rc::clone(signature),
                    _ => unreachable!(),
                };

                if let Type::Nil = signature.result {
                    return fail(SemanticError::NoResult(name.into_inner()), &location);
                }

                self.call(name, signature)
            }

            _ => {
                let var = self.var(symbol, location);
                self.selectors(var)
            }
        }
    }

    /// A variable reference that may be assigned to.
    pub(super) fn variable(&mut self) -> Parse<(Located<Identifier>, NodeId)> {
        let name = self.id()?;
        let symbol = self.scopes.lookup(&name)?;

        if !symbol.is_assignable() {
            let error = SemanticError::AssignToConstant(name.as_ref().clone());
            return fail(error, name.location());
        }

        let var = self.var(symbol, name.location().clone());
        let target = self.selectors(var)?;

        Ok((name, target))
    }

    pub(super) fn var(&mut self, symbol: Rc<Symbol>, location: Location) -> NodeId {
        let ty = symbol.ty.clone();
        self.node(location, ty, NodeKind::Var(symbol))
    }

    /// Chain of `[index]` and `.field` selectors.
    pub(super) fn selectors(&mut self, mut node: NodeId) -> Parse<NodeId> {
        loop {
            match self.token() {
                Token::OpenSquare => {
                    self.bump()?;

                    node = self.index(node)?;
                    while self.eat(&Token::Comma)? {
                        node = self.index(node)?;
                    }

                    self.expect(Token::CloseSquare)?;
                }

                Token::Period => {
                    let record = match &self.ast[node].ty {
                        Type::Record(record) => Rc::clone(record),
                        ty => {
                            let error = SemanticError::NotARecord(ty.clone());
                            return fail(error, &self.location());
                        }
                    };

                    self.bump()?;
                    let name = self.id()?;

                    let field = match record.fields.get(name.as_ref()) {
                        Some(field) => Rc::clone(field),
                        None => {
                            let location = name.location().clone();
                            let error = SemanticError::FieldNotFound(name.into_inner());
                            return fail(error, &location);
                        }
                    };

                    let location = Location::span(self.ast[node].location.clone(), name.location());
                    let ty = field.ty.clone();

                    node = self.node(location, ty, NodeKind::Field { record: node, field });
                }

                _ => break Ok(node),
            }
        }
    }

    /// One array subscript. Constant indices are checked against bounds.
    fn index(&mut self, array: NodeId) -> Parse<NodeId> {
        let ty = match &self.ast[array].ty {
            Type::Array(ty) => Rc::clone(ty),
            ty => {
                let error = SemanticError::NotAnArray(ty.clone());
                return fail(error, &self.location());
            }
        };

        let index = self.logical()?;
        let index = self.coerce(index, &Type::Integer)?;

        let index_location = self.ast[index].location.clone();
        if let Some(value) = self.ast.value(index).and_then(Value::integer) {
            if value < ty.low || value > ty.high {
                let error = SemanticError::IndexOutOfRange {
                    index: value,
                    low: ty.low,
                    high: ty.high,
                };

                return fail(error, &index_location);
            }
        }

        let location = Location::span(self.ast[array].location.clone(), &index_location);
        let kind = NodeKind::Index { array, index };

        Ok(self.node(location, ty.element.clone(), kind))
    }

    /// Function call with its argument list.
    ///
    /// Missing trailing arguments take their parameter's default value.
    pub(super) fn call(
        &mut self,
        name: Located<Identifier>,
        function: Rc<Signature>,
    ) -> Parse<NodeId> {
        let mut arguments = Vec::new();
        let mut end = name.location().clone();

        if self.eat(&Token::OpenParen)? {
            if !self.at(&Token::CloseParen) {
                arguments.push(self.logical()?);
                while self.eat(&Token::Comma)? {
                    arguments.push(self.logical()?);
                }
            }

            end = self.expect(Token::CloseParen)?;
        }

        let location = Location::span(name.location().clone(), &end);
        let parameters: Vec<_> = function.parameters.iter().cloned().collect();

        if arguments.len() > parameters.len() {
            let error = SemanticError::ArgumentCount {
                expected: parameters.len(),
                found: arguments.len(),
            };

            return fail(error, &location);
        }

        let given = arguments.len();
        for (i, parameter) in parameters.iter().enumerate() {
            let argument = match arguments.get(i) {
                Some(&argument) => argument,
                None => match &parameter.default {
                    Some(value) => self.constant(location.clone(), parameter.ty.clone(), value.clone()),
                    None => {
                        let error = SemanticError::ArgumentCount {
                            expected: parameters.len(),
                            found: given,
                        };

                        return fail(error, &location);
                    }
                },
            };

            let argument = if parameter.category == SymbolCategory::VarParameter {
                self.reference_argument(argument, parameter)?
            } else {
                self.coerce(argument, &parameter.ty)?
            };

            match arguments.get_mut(i) {
                Some(slot) => *slot = argument,
                None => arguments.push(argument),
            }
        }

        let ty = function.result.clone();
        Ok(self.node(location, ty, NodeKind::Call { function, arguments }))
    }

    /// Arguments for `var` parameters must be assignable and of the same type.
    fn reference_argument(&mut self, argument: NodeId, parameter: &Symbol) -> Parse<NodeId> {
        let assignable = self.ast.category(argument) == NodeCategory::Var
            && self
                .ast
                .root_symbol(argument)
                .map_or(false, |symbol| symbol.is_assignable());

        let node = &self.ast[argument];
        if assignable && node.ty.same(&parameter.ty) {
            Ok(argument)
        } else {
            let error = SemanticError::VarArgument(parameter.name.as_ref().clone());
            fail(error, &node.location)
        }
    }

    /// Constant node of any type.
    pub(super) fn constant(&mut self, location: Location, ty: Type, value: Value) -> NodeId {
        let kind = if ty.is_scalar() {
            NodeKind::Const(value)
        } else {
            NodeKind::TypedConst(value)
        };

        self.node(location, ty, kind)
    }

    /// Builds a binary operation, folding it if both sides are constant.
    pub(super) fn operation(
        &mut self,
        left: NodeId,
        right: NodeId,
        operator: Operator,
        location: &Location,
    ) -> Parse<NodeId> {
        let operation = located(
            operation_result_type(&self.ast[left].ty, &self.ast[right].ty, operator),
            location,
        )?;

        let span = Location::span(
            self.ast[left].location.clone(),
            &self.ast[right].location,
        );

        let category = operation.operands.category();
        let constants = self
            .ast
            .value(left)
            .and_then(|value| value.cast(category))
            .zip(self.ast.value(right).and_then(|value| value.cast(category)));

        if let Some((left, right)) = constants {
            let value = located(operator.eval(&operation.operands, &left, &right), location)?;
            return Ok(self.node(span, operation.result, NodeKind::Const(value)));
        }

        let left = self.cast(left, &operation.operands);
        let right = self.cast(right, &operation.operands);

        let kind = NodeKind::Binary {
            operator,
            left,
            right,
        };

        Ok(self.node(span, operation.result, kind))
    }

    /// `+`, `-` and `not`.
    fn unary(&mut self, operator: &Token, operand: NodeId, location: &Location) -> Parse<NodeId> {
        let ty = self.ast[operand].ty.clone();
        if !ty.is_numeric() {
            return fail(SemanticError::IllegalUnary(ty.category()), location);
        }

        // Chars behave as their codes
        let target = if ty.is_integer_like() { Type::Integer } else { ty };
        let operand = self.cast(operand, &target);
        let ty = self.ast[operand].ty.clone();
        let span = Location::span(location.clone(), &self.ast[operand].location);

        let folded = match (operator, self.ast.value(operand)) {
            (Token::Plus, _) => return Ok(operand),
            (Token::Minus, Some(value)) => value.negate(),
            (_, Some(value)) => value.not(),
            (_, None) => None,
        };

        if let Some(value) = folded {
            let ty = match value {
                Value::Double(_) => Type::Double,
                _ => Type::Integer,
            };

            return Ok(self.node(span, ty, NodeKind::Const(value)));
        }

        let (kind, ty) = match operator {
            Token::Minus => (NodeKind::UnaryMinus(operand), ty),
            _ => (NodeKind::Not(operand), Type::Integer),
        };

        Ok(self.node(span, ty, kind))
    }

    /// Checks that a node fits a type and converts it.
    pub(super) fn coerce(&mut self, node: NodeId, to: &Type) -> Parse<NodeId> {
        let found = &self.ast[node];
        located(compatibility(to, &found.ty), &found.location)?;

        Ok(self.cast(node, to))
    }

    /// Converts a node between scalar categories.
    ///
    /// Constants are converted by building a new constant node.
    pub(super) fn cast(&mut self, node: NodeId, to: &Type) -> NodeId {
        let from = &self.ast[node];
        if from.ty.category() == to.category() || !to.is_scalar() {
            return node;
        }

        let location = from.location.clone();
        let kind = match self.ast.value(node).and_then(|value| value.cast(to.category())) {
            Some(value) => NodeKind::Const(value),
            None => NodeKind::Cast(node),
        };

        self.node(location, to.clone(), kind)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{NodeKind, Program, Value},
        error::CompileError,
        parse_source,
        semantic::SemanticError,
        types::Category,
    };

    fn parse(source: &str) -> Program {
        parse_source(source.as_bytes(), "test").unwrap()
    }

    fn semantic_error(source: &str) -> (u32, SemanticError) {
        match parse_source(source.as_bytes(), "test") {
            Err(CompileError::Semantic(error)) => {
                let column = error.location().start().column();
                (column, error.into_inner())
            }

            Err(other) => panic!("expected a semantic error, found {}", other),
            Ok(_) => panic!("source should not parse"),
        }
    }

    /// Right side of the first assignment in the main program.
    fn first_value(program: &Program) -> (Option<Value>, Category) {
        let statements = match &program.ast[program.main.body].kind {
            NodeKind::Block(statements) => statements,
            _ => panic!("body is not a block"),
        };

        match &program.ast[statements[0]].kind {
            NodeKind::Assign { value, .. } => (
                program.ast.value(*value).cloned(),
                program.ast[*value].ty.category(),
            ),

            _ => panic!("not an assignment"),
        }
    }

    #[test]
    fn folding() {
        let program = parse("var x: integer; begin x := 3 + 4; end.");
        assert_eq!(first_value(&program), (Some(Value::Integer(7)), Category::Integer));

        let program = parse("var s: string; begin s := 'ab' + 'cd'; end.");
        assert_eq!(
            first_value(&program),
            (Some(Value::String("abcd".into())), Category::String)
        );

        let program = parse("var d: double; begin d := 2.0 * 3; end.");
        assert_eq!(first_value(&program), (Some(Value::Double(6.0)), Category::Double));

        let program = parse("var x: integer; begin x := not (1 < 2); end.");
        assert_eq!(first_value(&program), (Some(Value::Integer(0)), Category::Integer));
    }

    #[test]
    fn constants_are_copied_on_read() {
        let program = parse("const n = 5; var x, y: integer; begin x := -n; y := n; end.");

        let n = program
            .main
            .locals
            .iter()
            .find(|symbol| symbol.name.as_ref().as_ref() == "n")
            .unwrap();

        assert_eq!(n.value, Some(Value::Integer(5)));

        let statements = match &program.ast[program.main.body].kind {
            NodeKind::Block(statements) => statements.clone(),
            _ => panic!("body is not a block"),
        };

        let values: Vec<_> = statements
            .iter()
            .map(|&statement| match &program.ast[statement].kind {
                NodeKind::Assign { value, .. } => program.ast.value(*value).cloned(),
                _ => None,
            })
            .collect();

        assert_eq!(values, vec![Some(Value::Integer(-5)), Some(Value::Integer(5))]);
    }

    #[test]
    fn runtime_operands_are_cast() {
        let program = parse("var i: integer; d: double; begin d := i + 1.5; end.");

        let statements = match &program.ast[program.main.body].kind {
            NodeKind::Block(statements) => statements.clone(),
            _ => panic!("body is not a block"),
        };

        let value = match &program.ast[statements[0]].kind {
            NodeKind::Assign { value, .. } => *value,
            _ => panic!("not an assignment"),
        };

        match &program.ast[value].kind {
            NodeKind::Binary { left, .. } => {
                assert!(matches!(program.ast[*left].kind, NodeKind::Cast(_)));
                assert_eq!(program.ast[*left].ty.category(), Category::Double);
            }

            _ => panic!("not a binary operation"),
        }
    }

    #[test]
    fn constant_indices_are_checked() {
        let (column, error) = semantic_error("var a: array[1..3] of integer; begin a[5] := 0; end.");
        assert!(matches!(error, SemanticError::IndexOutOfRange { index: 5, low: 1, high: 3 }));
        assert_eq!(column, 40);

        let program = parse("var a: array[1..3] of integer; i: integer; begin a[i + 4] := 0; end.");
        assert!(!program.ast.is_empty());
    }

    #[test]
    fn type_errors() {
        let (_, error) = semantic_error("var c: char; begin c := 'ab'; end.");
        assert!(matches!(error, SemanticError::Incompatible { .. }));

        let (_, error) = semantic_error("var s: string; begin s := -s; end.");
        assert!(matches!(error, SemanticError::IllegalUnary(Category::String)));

        let (_, error) = semantic_error("var x: integer; begin x := 1 div 0; end.");
        assert!(matches!(error, SemanticError::DivisionByZero));

        let (_, error) = semantic_error("var x: integer; begin x := 1.5 + 'ab'; end.");
        assert!(matches!(error, SemanticError::UnsupportedOperands { .. }));
    }

    #[test]
    fn records_and_fields() {
        let source = "type p = record x, y: integer; end; var a: array[1..2] of p; \
                      begin a[1].y := 3; end.";
        assert!(!parse(source).ast.is_empty());

        let (_, error) = semantic_error("type p = record x: integer; end; var v: p; begin v.z := 1; end.");
        assert!(matches!(error, SemanticError::FieldNotFound(_)));
    }

    #[test]
    fn calls() {
        let (_, error) = semantic_error("procedure p(var x: integer); begin end; begin p(1); end.");
        assert!(matches!(error, SemanticError::VarArgument(_)));

        let (_, error) = semantic_error("procedure p; begin end; var x: integer; begin x := p; end.");
        assert!(matches!(error, SemanticError::NoResult(_)));

        let (_, error) = semantic_error("function f(a: integer): integer; begin end; begin f(1, 2); end.");
        assert!(matches!(error, SemanticError::ArgumentCount { expected: 1, found: 2 }));
    }

    #[test]
    fn shadowed_globals_resolve_again_after_the_function() {
        let source = "var x: integer; \
                      procedure p; var x: char; begin x := 'a'; end; \
                      begin x := 1; end.";
        let program = parse(source);

        let statements = match &program.ast[program.main.body].kind {
            NodeKind::Block(statements) => statements.clone(),
            _ => panic!("body is not a block"),
        };

        match &program.ast[statements[0]].kind {
            NodeKind::Assign { target, .. } => {
                assert_eq!(program.ast[*target].ty.category(), Category::Integer);
                let x = program.ast.root_symbol(*target).unwrap();
                assert_eq!(x.slot.unwrap().level, 0);
            }

            _ => panic!("not an assignment"),
        }

        let p = &program.functions[0];
        assert_eq!(p.locals.iter().next().unwrap().ty.category(), Category::Char);
    }
}
