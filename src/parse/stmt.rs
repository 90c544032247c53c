//! Statements.

use super::{fail, located, Expected, Parse, Parser};

use crate::{
    ast::{NodeId, NodeKind},
    lex::{Keyword, Token, TokenStream},
    semantic::SemanticError,
    source::Location,
    symbols::SymbolCategory,
    types::{compatibility, Type},
};

impl<T: TokenStream> Parser<T> {
    /// `begin` statements separated by `;` `end`.
    pub(super) fn compound(&mut self) -> Parse<(Location, Vec<NodeId>)> {
        let location = self.keyword(Keyword::Begin)?;

        let mut statements = Vec::new();
        loop {
            if let Some(statement) = self.statement()? {
                statements.push(statement);
            }

            if !self.eat(&Token::Semicolon)? {
                break;
            }
        }

        self.keyword(Keyword::End)?;
        Ok((location, statements))
    }

    /// A statement, which may be empty.
    fn statement(&mut self) -> Parse<Option<NodeId>> {
        let statement = match self.token() {
            Token::Keyword(Keyword::Begin) => {
                let (location, statements) = self.compound()?;
                self.node(location, Type::Nil, NodeKind::Block(statements))
            }

            Token::Keyword(Keyword::If) => self.if_statement()?,
            Token::Keyword(Keyword::While) => self.while_statement()?,
            Token::Keyword(Keyword::For) => self.for_statement()?,
            Token::Keyword(Keyword::Continue) => self.loop_jump(NodeKind::Continue, "continue")?,
            Token::Keyword(Keyword::Break) => self.loop_jump(NodeKind::Break, "break")?,
            Token::Keyword(Keyword::Read | Keyword::Readln) => self.read()?,
            Token::Keyword(Keyword::Write | Keyword::Writeln) => self.write()?,
            Token::Id(_) => self.assignment_or_call()?,

            Token::Semicolon | Token::Keyword(Keyword::End | Keyword::Else) => return Ok(None),

            _ => return Err(self.unexpected(vec![Expected::Statement])),
        };

        Ok(Some(statement))
    }

    /// Statement that might be empty, as an always present node.
    fn body(&mut self) -> Parse<NodeId> {
        let location = self.location();
        match self.statement()? {
            Some(statement) => Ok(statement),
            None => Ok(self.node(location, Type::Nil, NodeKind::Block(Vec::new()))),
        }
    }

    /// Conditions are integers, where zero is false.
    fn condition(&mut self) -> Parse<NodeId> {
        let condition = self.logical()?;
        let node = &self.ast[condition];
        located(compatibility(&Type::Integer, &node.ty), &node.location)?;

        Ok(self.cast(condition, &Type::Integer))
    }

    fn if_statement(&mut self) -> Parse<NodeId> {
        let location = self.keyword(Keyword::If)?;
        let condition = self.condition()?;

        self.keyword(Keyword::Then)?;
        let then = self.body()?;

        let otherwise = if self.eat(&Token::Keyword(Keyword::Else))? {
            Some(self.body()?)
        } else {
            None
        };

        let kind = NodeKind::If {
            condition,
            then,
            otherwise,
        };

        Ok(self.node(location, Type::Nil, kind))
    }

    fn while_statement(&mut self) -> Parse<NodeId> {
        let location = self.keyword(Keyword::While)?;
        let condition = self.condition()?;
        self.keyword(Keyword::Do)?;

        let body = self.loop_body()?;
        Ok(self.node(location, Type::Nil, NodeKind::While { condition, body }))
    }

    /// `for i := a to b do` or `for i := a downto b do`.
    fn for_statement(&mut self) -> Parse<NodeId> {
        let location = self.keyword(Keyword::For)?;

        let (name, counter) = self.variable()?;
        let counter_type = self.ast[counter].ty.clone();
        let simple = matches!(self.ast[counter].kind, NodeKind::Var(_));
        if !counter_type.is_integer_like() || !simple {
            return fail(SemanticError::IllegalCounter, name.location());
        }

        self.expect(Token::Assign)?;
        let from = self.logical()?;
        let from = self.coerce(from, &counter_type)?;

        let downto = match self.token() {
            Token::Keyword(Keyword::To) => false,
            Token::Keyword(Keyword::Downto) => true,
            _ => {
                let expected = vec![
                    Expected::Token(Token::Keyword(Keyword::To)),
                    Expected::Token(Token::Keyword(Keyword::Downto)),
                ];

                return Err(self.unexpected(expected));
            }
        };

        self.bump()?;
        let to = self.logical()?;
        let to = self.coerce(to, &counter_type)?;

        self.keyword(Keyword::Do)?;
        let body = self.loop_body()?;

        let kind = NodeKind::For {
            counter,
            from,
            to,
            downto,
            body,
        };

        Ok(self.node(location, Type::Nil, kind))
    }

    fn loop_body(&mut self) -> Parse<NodeId> {
        self.loops += 1;
        let body = self.body();
        self.loops -= 1;

        body
    }

    fn loop_jump(&mut self, kind: NodeKind, keyword: &'static str) -> Parse<NodeId> {
        let location = self.bump()?.location().clone();
        if self.loops == 0 {
            return fail(SemanticError::OutsideLoop(keyword), &location);
        }

        Ok(self.node(location, Type::Nil, kind))
    }

    /// `read(a, b)`, `readln` and friends. Targets are scalar variables.
    fn read(&mut self) -> Parse<NodeId> {
        let (location, keyword) = self.bump()?.split();
        let newline = keyword == Token::Keyword(Keyword::Readln);

        let mut targets = Vec::new();
        if self.eat(&Token::OpenParen)? {
            loop {
                let (_, target) = self.variable()?;

                let node = &self.ast[target];
                if !matches!(node.ty, Type::Integer | Type::Double | Type::Char) {
                    return fail(SemanticError::Unreadable(node.ty.clone()), &node.location);
                }

                targets.push(target);
                if !self.eat(&Token::Comma)? {
                    break;
                }
            }

            self.expect(Token::CloseParen)?;
        }

        Ok(self.node(location, Type::Nil, NodeKind::Read { targets, newline }))
    }

    /// `write(a, b)` and `writeln`. Arguments are scalar expressions.
    fn write(&mut self) -> Parse<NodeId> {
        let (location, keyword) = self.bump()?.split();
        let newline = keyword == Token::Keyword(Keyword::Writeln);

        let mut args = Vec::new();
        if self.eat(&Token::OpenParen)? {
            if !self.at(&Token::CloseParen) {
                loop {
                    let arg = self.logical()?;

                    let node = &self.ast[arg];
                    if !node.ty.is_scalar() {
                        return fail(SemanticError::Unwritable(node.ty.clone()), &node.location);
                    }

                    args.push(arg);
                    if !self.eat(&Token::Comma)? {
                        break;
                    }
                }
            }

            self.expect(Token::CloseParen)?;
        }

        Ok(self.node(location, Type::Nil, NodeKind::Write { args, newline }))
    }

    /// Statements that start with a name.
    fn assignment_or_call(&mut self) -> Parse<NodeId> {
        let name = self.id()?;
        let symbol = self.scopes.lookup(&name)?;

        let target = match (&symbol.category, &symbol.ty) {
            (SymbolCategory::Function, Type::Function(signature)) if !self.at(&Token::Assign) => {
                let signature = signature.clone();
                return self.call(name, signature);
            }

            (SymbolCategory::Type, _) => {
                return fail(SemanticError::IllegalExpression, name.location());
            }

            _ if !symbol.is_assignable() => {
                let error = SemanticError::AssignToConstant(name.as_ref().clone());
                return fail(error, name.location());
            }

            _ => {
                let var = self.var(symbol.clone(), name.location().clone());
                self.selectors(var)?
            }
        };

        let location = self.expect(Token::Assign)?;
        let value = self.logical()?;

        let target_type = self.ast[target].ty.clone();
        let value = self.coerce(value, &target_type)?;

        let location = Location::span(self.ast[target].location.clone(), &location);
        Ok(self.node(location, Type::Nil, NodeKind::Assign { target, value }))
    }
}

#[cfg(test)]
mod tests {
    use crate::{ast::NodeKind, error::CompileError, parse_source, semantic::SemanticError};

    fn semantic_error(source: &str) -> SemanticError {
        match parse_source(source.as_bytes(), "test") {
            Err(CompileError::Semantic(error)) => error.into_inner(),
            Err(other) => panic!("expected a semantic error, found {}", other),
            Ok(_) => panic!("source should not parse"),
        }
    }

    #[test]
    fn loop_jumps_need_a_loop() {
        let error = semantic_error("begin break; end.");
        assert!(matches!(error, SemanticError::OutsideLoop("break")));

        let error = semantic_error(
            "var i: integer; procedure p; begin continue; end; begin while 1 do p; end.",
        );
        assert!(matches!(error, SemanticError::OutsideLoop("continue")));

        let source = "var i: integer; begin for i := 10 downto 1 do if i = 5 then break; end.";
        assert!(parse_source(source.as_bytes(), "test").is_ok());
    }

    #[test]
    fn assignments_to_constants() {
        let error = semantic_error("const n = 1; begin n := 2; end.");
        assert!(matches!(error, SemanticError::AssignToConstant(_)));

        let error = semantic_error("procedure p(const x: integer); begin x := 2; end; begin end.");
        assert!(matches!(error, SemanticError::AssignToConstant(_)));

        let error = semantic_error("function f: integer; begin f := 2; end; begin end.");
        assert!(matches!(error, SemanticError::AssignToConstant(_)));
    }

    #[test]
    fn conditions_must_be_integers() {
        let error = semantic_error("var d: double; begin if d then d := 1; end.");
        assert!(matches!(error, SemanticError::Incompatible { .. }));
    }

    #[test]
    fn counters_must_be_integer_variables() {
        let error = semantic_error("var d: double; begin for d := 1 to 2 do ; end.");
        assert!(matches!(error, SemanticError::IllegalCounter));
    }

    #[test]
    fn io_arguments() {
        let error = semantic_error("var s: string; begin read(s); end.");
        assert!(matches!(error, SemanticError::Unreadable(_)));

        let error = semantic_error("var a: array[1..2] of integer; begin write(a); end.");
        assert!(matches!(error, SemanticError::Unwritable(_)));

        let source = "var x: integer; c: char; begin readln(x, c); writeln('x = ', x, c); end.";
        let program = parse_source(source.as_bytes(), "test").unwrap();

        let statements = match &program.ast[program.main.body].kind {
            NodeKind::Block(statements) => statements.clone(),
            _ => panic!("body is not a block"),
        };

        assert!(matches!(&program.ast[statements[0]].kind, NodeKind::Read { targets, newline: true } if targets.len() == 2));
        assert!(matches!(&program.ast[statements[1]].kind, NodeKind::Write { args, newline: true } if args.len() == 3));
    }
}
