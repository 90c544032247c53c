//! Typed syntax trees.
//!
//! Nodes live in an [`Ast`] arena and refer to each other through
//! [`NodeId`] indices. Every node carries its source location and its
//! resolved type, so no later pass has to type check anything. Constant
//! values are stored by value: reading a named constant copies its value
//! into a fresh node, and folding always builds new nodes.

use std::{
    fmt::{self, Display},
    ops::Index,
    rc::Rc,
};

use crate::{
    ops::Operator,
    source::Location,
    symbols::{Symbol, SymbolCategory, SymbolTable},
    types::{Category, Signature, Type},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Node arena.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn category(&self, id: NodeId) -> NodeCategory {
        match &self[id].kind {
            NodeKind::Const(_) | NodeKind::TypedConst(_) => NodeCategory::Const,
            NodeKind::Var(_) => NodeCategory::Var,
            NodeKind::Index { array: base, .. } | NodeKind::Field { record: base, .. } => {
                match self.category(*base) {
                    NodeCategory::Var => NodeCategory::Var,
                    _ => NodeCategory::Plain,
                }
            }

            _ => NodeCategory::Plain,
        }
    }

    /// The variable a memory reference starts from, if any.
    pub fn root_symbol(&self, id: NodeId) -> Option<&Rc<Symbol>> {
        match &self[id].kind {
            NodeKind::Var(symbol) => Some(symbol),
            NodeKind::Index { array: base, .. } | NodeKind::Field { record: base, .. } => {
                self.root_symbol(*base)
            }

            _ => None,
        }
    }

    /// Constant value of a node, if it is a folded constant.
    pub fn value(&self, id: NodeId) -> Option<&Value> {
        match &self[id].kind {
            NodeKind::Const(value) | NodeKind::TypedConst(value) => Some(value),
            _ => None,
        }
    }

    /// Direct descendants of a node, in evaluation order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        use NodeKind::*;

        match &self[id].kind {
            Var(_) | Const(_) | TypedConst(_) | Continue | Break => Vec::new(),
            UnaryMinus(operand) | Not(operand) | Cast(operand) => vec![*operand],
            Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Index { array, index } => vec![*array, *index],
            Field { record, .. } => vec![*record],
            Assign { target, value } => vec![*target, *value],
            If {
                condition,
                then,
                otherwise,
            } => std::iter::once(*condition)
                .chain(std::iter::once(*then))
                .chain(*otherwise)
                .collect(),

            While { condition, body } => vec![*condition, *body],
            For {
                counter,
                from,
                to,
                body,
                ..
            } => vec![*counter, *from, *to, *body],

            Read { targets: nodes, .. } | Write { args: nodes, .. } | Block(nodes) => nodes.clone(),
            Call { arguments, .. } => arguments.clone(),
        }
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, NodeId(id): NodeId) -> &Node {
        &self.nodes[id as usize]
    }
}

#[derive(Debug)]
pub struct Node {
    pub location: Location,
    pub ty: Type,
    pub kind: NodeKind,
}

/// Broad node classification.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeCategory {
    Plain,

    /// Folded constant.
    Const,

    /// Memory reference.
    Var,
}

#[derive(Debug)]
pub enum NodeKind {
    Var(Rc<Symbol>),
    UnaryMinus(NodeId),
    Not(NodeId),
    Binary {
        operator: Operator,
        left: NodeId,
        right: NodeId,
    },

    Const(Value),

    /// Aggregate constant, only ever used as an initializer.
    TypedConst(Value),

    /// Conversion to the node's own type.
    Cast(NodeId),

    Index {
        array: NodeId,
        index: NodeId,
    },

    Field {
        record: NodeId,
        field: Rc<Symbol>,
    },

    Assign {
        target: NodeId,
        value: NodeId,
    },

    If {
        condition: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
    },

    While {
        condition: NodeId,
        body: NodeId,
    },

    For {
        counter: NodeId,
        from: NodeId,
        to: NodeId,
        downto: bool,
        body: NodeId,
    },

    Continue,
    Break,

    Read {
        targets: Vec<NodeId>,
        newline: bool,
    },

    Write {
        args: Vec<NodeId>,
        newline: bool,
    },

    Call {
        function: Rc<Signature>,
        arguments: Vec<NodeId>,
    },

    Block(Vec<NodeId>),
}

/// A constant value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Integer(i32),
    Double(f64),
    Char(u8),
    String(String),
    Array(Vec<Value>),
    Record(Vec<Value>),
}

impl Value {
    /// Integer representation of integers and chars.
    pub fn integer(&self) -> Option<i32> {
        match self {
            Value::Integer(integer) => Some(*integer),
            Value::Char(c) => Some(*c as i32),
            _ => None,
        }
    }

    /// Converts a scalar to another scalar category.
    pub fn cast(&self, to: Category) -> Option<Value> {
        let value = match (self, to) {
            (Value::Integer(_), Category::Integer)
            | (Value::Double(_), Category::Double)
            | (Value::Char(_), Category::Char)
            | (Value::String(_), Category::String) => self.clone(),

            (Value::Integer(_) | Value::Char(_), Category::Double) => {
                Value::Double(self.integer()? as f64)
            }

            (Value::Char(c), Category::Integer) => Value::Integer(*c as i32),
            (Value::Integer(integer), Category::Char) => Value::Char(*integer as u8),
            (Value::Char(c), Category::String) => Value::String((*c as char).to_string()),
            _ => return None,
        };

        Some(value)
    }

    /// Arithmetic negation.
    pub fn negate(&self) -> Option<Value> {
        match self {
            Value::Integer(integer) => Some(Value::Integer(integer.wrapping_neg())),
            Value::Double(double) => Some(Value::Double(-double)),
            _ => None,
        }
    }

    /// Logical negation. Integers negate bitwise, which turns -1 into 0.
    pub fn not(&self) -> Option<Value> {
        match self {
            Value::Integer(integer) => Some(Value::Integer(!integer)),
            Value::Double(double) => Some(Value::Integer(if *double == 0.0 { -1 } else { 0 })),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |fmt: &mut fmt::Formatter<'_>, values: &[Value], separator| {
            fmt.write_str("(")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    fmt.write_str(separator)?;
                }

                write!(fmt, "{}", value)?;
            }

            fmt.write_str(")")
        };

        match self {
            Value::Integer(integer) => write!(fmt, "{}", integer),
            Value::Double(double) => write!(fmt, "{:?}", double),
            Value::Char(c) => write!(fmt, "'{}'", *c as char),
            Value::String(string) => write!(fmt, "'{}'", string.replace('\'', "''")),
            Value::Array(values) => list(fmt, values, ", "),
            Value::Record(values) => list(fmt, values, "; "),
        }
    }
}

/// A compiled function, or the main program.
#[derive(Debug)]
pub struct Function {
    pub signature: Rc<Signature>,
    pub locals: SymbolTable,
    pub body: NodeId,
}

/// Result of parsing.
#[derive(Debug)]
pub struct Program {
    pub ast: Ast,

    /// User functions, innermost first.
    pub functions: Vec<Function>,

    pub main: Function,
}

impl Program {
    fn function_tree(&self, fmt: &mut fmt::Formatter<'_>, function: &Function) -> fmt::Result {
        let signature = &function.signature;
        write!(fmt, "{} : function(", signature.name.as_ref())?;

        for (i, parameter) in signature.parameters.iter().enumerate() {
            if i > 0 {
                fmt.write_str("; ")?;
            }

            if parameter.category == SymbolCategory::VarParameter {
                fmt.write_str("var ")?;
            }

            write!(fmt, "{}: {}", parameter.name.as_ref(), parameter.ty)?;
        }

        writeln!(fmt, ") : {}", signature.result)?;

        for symbol in function.locals.iter() {
            writeln!(fmt, "|-- {}", Declaration(symbol))?;
        }

        self.node_tree(fmt, function.body, "", true)
    }

    fn node_tree(
        &self,
        fmt: &mut fmt::Formatter<'_>,
        id: NodeId,
        prefix: &str,
        last: bool,
    ) -> fmt::Result {
        let marker = if last { "--- " } else { "|-- " };
        write!(fmt, "{}{}", prefix, marker)?;
        self.label(fmt, id)?;
        writeln!(fmt)?;

        let prefix = format!("{}{}", prefix, if last { "    " } else { "|   " });
        let children = self.ast.children(id);

        for (i, child) in children.iter().enumerate() {
            self.node_tree(fmt, *child, &prefix, i + 1 == children.len())?;
        }

        Ok(())
    }

    fn label(&self, fmt: &mut fmt::Formatter<'_>, id: NodeId) -> fmt::Result {
        use NodeKind::*;

        let node = &self.ast[id];
        match &node.kind {
            Var(symbol) => write!(fmt, "{}", symbol.name.as_ref())?,
            UnaryMinus(_) => fmt.write_str("-")?,
            Not(_) => fmt.write_str("not")?,
            Binary { operator, .. } => write!(fmt, "{}", operator)?,
            Const(value) | TypedConst(value) => write!(fmt, "{}", value)?,
            Cast(_) => fmt.write_str("cast")?,
            NodeKind::Index { .. } => fmt.write_str("[]")?,
            Field { field, .. } => write!(fmt, ".{}", field.name.as_ref())?,
            Assign { .. } => fmt.write_str(":=")?,
            If { .. } => fmt.write_str("if")?,
            While { .. } => fmt.write_str("while")?,
            For { downto: false, .. } => fmt.write_str("for to")?,
            For { downto: true, .. } => fmt.write_str("for downto")?,
            Continue => fmt.write_str("continue")?,
            Break => fmt.write_str("break")?,
            Read { newline: false, .. } => fmt.write_str("read")?,
            Read { newline: true, .. } => fmt.write_str("readln")?,
            Write { newline: false, .. } => fmt.write_str("write")?,
            Write { newline: true, .. } => fmt.write_str("writeln")?,
            Call { function, .. } => write!(fmt, "{}()", function.name.as_ref())?,
            Block(_) => fmt.write_str("begin")?,
        }

        match node.ty {
            Type::Nil => Ok(()),
            ref ty => write!(fmt, " : {}", ty),
        }
    }
}

/// Prints every function, main program last.
impl Display for Program {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for function in &self.functions {
            self.function_tree(fmt, function)?;
            writeln!(fmt)?;
        }

        self.function_tree(fmt, &self.main)
    }
}

struct Declaration<'a>(&'a Symbol);

impl Display for Declaration<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Declaration(symbol) = self;
        let name = symbol.name.as_ref();

        match (&symbol.category, &symbol.value) {
            (SymbolCategory::Type, _) => write!(fmt, "type {} = {}", name, symbol.ty),
            (SymbolCategory::Const, Some(value)) => {
                write!(fmt, "const {} : {} = {}", name, symbol.ty, value)
            }

            (SymbolCategory::Function, _) => write!(fmt, "{}", symbol.ty),
            _ => write!(fmt, "var {} : {}", name, symbol.ty),
        }
    }
}
