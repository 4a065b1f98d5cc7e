//! Abstract syntax tree
//!
//! The node shapes the bytecode emitter consumes. Identifier names stay
//! as plain strings here; the emitter interns them into atoms when it
//! resolves them against the scope tree.

use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

impl DeclKind {
    pub fn is_lexical(self) -> bool {
        !matches!(self, DeclKind::Var)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Sar,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    In,
    Instanceof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A function parameter. Defaults and rest parameters make the list
/// non-simple, which forces generic variable records on the function.
#[derive(Debug)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub rest: bool,
}

#[derive(Debug)]
pub struct FunctionNode {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub is_arrow: bool,
    pub strict: bool,
    pub pos: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Normal,
    Getter,
    Setter,
}

#[derive(Debug)]
pub struct ClassMethod {
    pub key: PropName,
    pub func: Rc<FunctionNode>,
    pub is_static: bool,
    pub kind: MethodKind,
}

#[derive(Debug)]
pub struct ClassNode {
    pub name: Option<String>,
    pub parent: Option<Expr>,
    pub constructor: Option<Rc<FunctionNode>>,
    pub methods: Vec<ClassMethod>,
    pub pos: u32,
}

#[derive(Debug)]
pub enum PropName {
    Ident(String),
    Str(String),
    Num(f64),
    Computed(Box<Expr>),
}

#[derive(Debug)]
pub enum ObjectProp {
    /// `key: value`, shorthand included (value is the identifier).
    Init { name: PropName, value: Expr },
    Getter { name: PropName, func: Rc<FunctionNode> },
    Setter { name: PropName, func: Rc<FunctionNode> },
}

#[derive(Debug)]
pub enum MemberProp {
    Ident(String),
    Computed(Box<Expr>),
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: u32,
}

#[derive(Debug)]
pub enum ExprKind {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    Str(String),
    Ident(String),
    This,
    Array(Vec<Option<Expr>>),
    Object(Vec<ObjectProp>),
    Function(Rc<FunctionNode>),
    Class(Rc<ClassNode>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        cons: Box<Expr>,
        alt: Box<Expr>,
    },
    /// `target op= value`; `op` is `None` for plain assignment.
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
    },
    Sequence(Vec<Expr>),
    SuperCall(Vec<Expr>),
}

#[derive(Debug)]
pub enum ForHead {
    Decl { kind: DeclKind, name: String },
    Expr(Expr),
}

#[derive(Debug)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub struct ImportSpec {
    /// Exported name on the dependency; `default` for default imports.
    pub imported: String,
    pub local: String,
}

#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: u32,
}

#[derive(Debug)]
pub enum StmtKind {
    Expr(Expr),
    VarDecl {
        kind: DeclKind,
        decls: Vec<(String, Option<Expr>)>,
    },
    FunctionDecl(Rc<FunctionNode>),
    ClassDecl(Rc<ClassNode>),
    Return(Option<Expr>),
    If {
        cond: Expr,
        cons: Box<Stmt>,
        alt: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        head: ForHead,
        object: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        head: ForHead,
        object: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        catch: Option<(Option<String>, Vec<Stmt>)>,
        finally: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    With {
        object: Expr,
        body: Box<Stmt>,
    },
    Empty,
    Import {
        specifiers: Vec<ImportSpec>,
        source: String,
    },
    /// `export { a as b }` or an exported declaration.
    ExportNamed {
        decl: Option<Box<Stmt>>,
        specifiers: Vec<(String, String)>,
    },
    ExportDefault(Expr),
}

#[derive(Debug)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub strict: bool,
    pub is_module: bool,
}
