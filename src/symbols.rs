//! Symbol tables and scopes.
//!
//! A [`SymbolTable`] keeps symbols in declaration order, which matters for
//! record fields and parameters, and indexes them by case-insensitive name.
//! Tables also lay out storage: every symbol that needs memory gets an
//! offset equal to the running size of its table.
//!
//! [`Scopes`] is the stack of active tables. Names resolve from the
//! innermost table outwards, so inner declarations shadow outer ones.

use std::{collections::HashMap, mem, rc::Rc};

use crate::{
    ast::Value,
    lex::Identifier,
    semantic::{Semantic, SemanticError},
    source::Located,
    types::{Signature, Type, MAX_SIZE},
};

/// Size of an address, which is what `var` parameters hold.
pub const ADDRESS_SIZE: u32 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolCategory {
    Type,
    Const,
    Var,
    VarParameter,
    Function,
}

/// How a parameter is passed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParameterMode {
    Value,
    Var,
    Const,
}

/// What a table's storage offsets are relative to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Local,
    Parameter,
    Field,
}

/// Storage assigned to a symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub level: u32,
    pub offset: u32,
    pub kind: SlotKind,
}

#[derive(Debug)]
pub struct Symbol {
    pub name: Located<Identifier>,
    pub ty: Type,
    pub category: SymbolCategory,

    /// Folded value of a constant.
    pub value: Option<Value>,

    /// Default argument of a parameter.
    pub default: Option<Value>,

    pub slot: Option<Slot>,
}

impl Symbol {
    /// Whether the symbol may appear on the left side of an assignment.
    pub fn is_assignable(&self) -> bool {
        matches!(self.category, SymbolCategory::Var | SymbolCategory::VarParameter)
    }
}

#[derive(Clone, Debug)]
pub struct SymbolTable {
    symbols: Vec<Rc<Symbol>>,
    index: HashMap<Identifier, usize>,
    size: u32,
    level: u32,
    kind: SlotKind,
}

impl SymbolTable {
    /// Local declarations of a block at the given lexical level.
    pub fn locals(level: u32) -> Self {
        SymbolTable::new(level, SlotKind::Local)
    }

    /// Parameters of a function whose locals live at the given level.
    pub fn parameters(level: u32) -> Self {
        SymbolTable::new(level, SlotKind::Parameter)
    }

    /// Record fields.
    pub fn fields() -> Self {
        SymbolTable::new(0, SlotKind::Field)
    }

    fn new(level: u32, kind: SlotKind) -> Self {
        SymbolTable {
            symbols: Vec::new(),
            index: HashMap::new(),
            size: 0,
            level,
            kind,
        }
    }

    pub fn add_variable(&mut self, name: Located<Identifier>, ty: Type) -> Semantic<Rc<Symbol>> {
        let slot = self.allocate(&name, ty.size())?;
        self.add(Symbol {
            name,
            ty,
            category: SymbolCategory::Var,
            value: None,
            default: None,
            slot: Some(slot),
        })
    }

    pub fn add_parameter(
        &mut self,
        name: Located<Identifier>,
        ty: Type,
        mode: ParameterMode,
        default: Option<Value>,
    ) -> Semantic<Rc<Symbol>> {
        let (category, size) = match mode {
            ParameterMode::Value => (SymbolCategory::Var, ty.size()),
            ParameterMode::Const => (SymbolCategory::Const, ty.size()),
            ParameterMode::Var => (SymbolCategory::VarParameter, ADDRESS_SIZE),
        };

        let slot = self.allocate(&name, size)?;
        self.add(Symbol {
            name,
            ty,
            category,
            value: None,
            default,
            slot: Some(slot),
        })
    }

    /// Registers a constant. Typed constants also get storage, since they
    /// can be aggregates that have to be addressable at run time.
    pub fn add_constant(
        &mut self,
        name: Located<Identifier>,
        ty: Type,
        value: Value,
        storage: bool,
    ) -> Semantic<Rc<Symbol>> {
        let slot = if storage {
            Some(self.allocate(&name, ty.size())?)
        } else {
            None
        };
        self.add(Symbol {
            name,
            ty,
            category: SymbolCategory::Const,
            value: Some(value),
            default: None,
            slot,
        })
    }

    pub fn add_type(&mut self, name: Located<Identifier>, ty: Type) -> Semantic<Rc<Symbol>> {
        self.add(Symbol {
            name,
            ty,
            category: SymbolCategory::Type,
            value: None,
            default: None,
            slot: None,
        })
    }

    pub fn add_function(&mut self, signature: Rc<Signature>) -> Semantic<Rc<Symbol>> {
        self.add(Symbol {
            name: signature.name.clone(),
            ty: Type::Function(signature),
            category: SymbolCategory::Function,
            value: None,
            default: None,
            slot: None,
        })
    }

    /// Fails if a symbol with the same name is already in this table.
    pub fn check_duplication(&self, name: &Located<Identifier>) -> Semantic<()> {
        match self.index.get(name.as_ref()) {
            Some(_) => Err(Located::at(
                SemanticError::Duplicate(name.as_ref().clone()),
                name.location().clone(),
            )),

            None => Ok(()),
        }
    }

    pub fn get(&self, name: &Identifier) -> Option<&Rc<Symbol>> {
        self.index.get(name).map(|&index| &self.symbols[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Symbol>> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Bytes taken by all symbols with storage.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Reserves storage for `name` at the end of the table.
    fn allocate(&mut self, name: &Located<Identifier>, size: u32) -> Semantic<Slot> {
        let offset = self.size;
        self.size = match offset.checked_add(size) {
            Some(end) if end <= MAX_SIZE => end,
            _ => {
                let error = SemanticError::TypeTooLarge;
                return Err(Located::at(error, name.location().clone()));
            }
        };

        Ok(Slot {
            level: self.level,
            offset,
            kind: self.kind,
        })
    }

    fn add(&mut self, symbol: Symbol) -> Semantic<Rc<Symbol>> {
        self.check_duplication(&symbol.name)?;

        let symbol = Rc::new(symbol);
        self.index.insert(symbol.name.as_ref().clone(), self.symbols.len());
        self.symbols.push(Rc::clone(&symbol));

        Ok(symbol)
    }
}

/// Stack of active symbol tables.
pub struct Scopes {
    current: SymbolTable,
    outer: Vec<SymbolTable>,
}

impl Scopes {
    pub fn new(global: SymbolTable) -> Self {
        Scopes {
            current: global,
            outer: Vec::new(),
        }
    }

    /// Enters a scope.
    pub fn push(&mut self, table: SymbolTable) {
        log::trace!("Entering scope at depth {}", self.outer.len() + 1);
        self.outer.push(mem::replace(&mut self.current, table));
    }

    /// Leaves the innermost scope. The outermost scope is never popped.
    pub fn pop(&mut self) -> Option<SymbolTable> {
        let outer = self.outer.pop()?;
        log::trace!("Leaving scope at depth {}", self.outer.len() + 1);

        Some(mem::replace(&mut self.current, outer))
    }

    pub fn current(&self) -> &SymbolTable {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut SymbolTable {
        &mut self.current
    }

    /// Takes the outermost scope, which is the only one left.
    pub fn into_outermost(mut self) -> SymbolTable {
        match self.outer.drain(..).next() {
            Some(outermost) => outermost,
            None => self.current,
        }
    }

    /// Resolves a name, innermost scope first.
    pub fn lookup(&self, name: &Located<Identifier>) -> Semantic<Rc<Symbol>> {
        std::iter::once(&self.current)
            .chain(self.outer.iter().rev())
            .find_map(|table| table.get(name.as_ref()))
            .cloned()
            .ok_or_else(|| {
                Located::at(
                    SemanticError::NotFound(name.as_ref().clone()),
                    name.location().clone(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{source, types::ArrayType};

    fn id(name: &str) -> Located<Identifier> {
        let (start, _) = source::consume("".as_bytes(), "test");
        Located::at(Identifier::new(name), start)
    }

    #[test]
    fn offsets_follow_declaration_order() {
        let mut table = SymbolTable::locals(0);
        let a = table.add_variable(id("a"), Type::Integer).unwrap();
        let b = table.add_variable(id("b"), Type::Double).unwrap();
        let c = table.add_variable(id("c"), Type::Char).unwrap();

        let offsets: Vec<_> = [a, b, c].iter().map(|s| s.slot.unwrap().offset).collect();
        assert_eq!(offsets, vec![0, 4, 12]);
        assert_eq!(table.size(), 16);
    }

    #[test]
    fn duplicates_ignore_case() {
        let mut table = SymbolTable::locals(0);
        table.add_variable(id("Total"), Type::Integer).unwrap();

        let error = table.add_type(id("TOTAL"), Type::Char).unwrap_err();
        assert!(matches!(error.into_inner(), SemanticError::Duplicate(_)));
    }

    #[test]
    fn frames_are_bounded() {
        let big = Type::Array(Rc::new(ArrayType {
            element: Type::Integer,
            low: 1,
            high: 200_000_000,
        }));

        let mut table = SymbolTable::locals(0);
        table.add_variable(id("a"), big.clone()).unwrap();

        let error = table.add_variable(id("b"), big).unwrap_err();
        assert!(matches!(error.into_inner(), SemanticError::TypeTooLarge));
        assert_eq!(table.size(), 800_000_000);
    }

    #[test]
    fn var_parameters_hold_addresses() {
        let mut table = SymbolTable::parameters(1);
        let x = table
            .add_parameter(id("x"), Type::Double, ParameterMode::Var, None)
            .unwrap();

        assert_eq!(x.category, SymbolCategory::VarParameter);
        assert_eq!(table.size(), ADDRESS_SIZE);
    }

    #[test]
    fn shadowing() {
        let mut global = SymbolTable::locals(0);
        global.add_variable(id("x"), Type::Integer).unwrap();

        let mut scopes = Scopes::new(global);
        let mut local = SymbolTable::locals(1);
        local.add_variable(id("x"), Type::Char).unwrap();
        scopes.push(local);

        assert!(matches!(scopes.lookup(&id("x")).unwrap().ty, Type::Char));

        scopes.pop().unwrap();
        assert!(matches!(scopes.lookup(&id("X")).unwrap().ty, Type::Integer));
        assert!(scopes.pop().is_none());

        let missing = scopes.lookup(&id("y")).unwrap_err();
        assert!(matches!(missing.into_inner(), SemanticError::NotFound(_)));
    }
}
