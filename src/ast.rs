use crate::error::SourceLocation;

/// 引入作用域的节点（类、方法、let 绑定、case 分支）的标识，
/// 取其第一个记号在源码中的字节偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub classes: Vec<ClassDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<String>,
    pub features: Vec<Feature>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Attribute(AttrDecl),
    Method(MethodDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttrDecl {
    pub name: String,
    pub type_name: String,
    pub initializer: Option<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub id: NodeId,
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: String,
    pub body: Expr,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_name: String,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Identifier(Identifier),
    Assignment(AssignmentExpr),
    Dispatch(DispatchExpr),
    Block(BlockExpr),
    If(IfExpr),
    While(WhileExpr),
    Let(LetExpr),
    Case(CaseExpr),
    New(NewExpr),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    String(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: LiteralValue,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpr {
    pub name: String,
    pub value: Box<Expr>,
    pub loc: SourceLocation,
}

/// 方法调用的接收者
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchTarget {
    /// `f(x)`，隐式 self
    SelfObject,
    /// `e.f(x)`
    Dynamic(Box<Expr>),
    /// `e@T.f(x)`，按祖先类型限定
    Ancestor { receiver: Box<Expr>, type_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchExpr {
    pub target: DispatchTarget,
    pub method: String,
    pub args: Vec<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockExpr {
    pub exprs: Vec<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfExpr {
    pub condition: Box<Expr>,
    pub then_branch: Box<Expr>,
    pub else_branch: Box<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileExpr {
    pub condition: Box<Expr>,
    pub body: Box<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub id: NodeId,
    pub name: String,
    pub type_name: String,
    pub initializer: Option<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetExpr {
    pub bindings: Vec<LetBinding>,
    pub body: Box<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub id: NodeId,
    pub name: String,
    pub type_name: String,
    pub body: Expr,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    pub scrutinee: Box<Expr>,
    pub branches: Vec<CaseBranch>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExpr {
    pub type_name: String,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Eq,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub left: Box<Expr>,
    pub op: BinaryOp,
    pub right: Box<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `~`
    Neg,
    Not,
    IsVoid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
    pub loc: SourceLocation,
}

impl Expr {
    pub fn loc(&self) -> SourceLocation {
        match self {
            Expr::Literal(e) => e.loc,
            Expr::Identifier(e) => e.loc,
            Expr::Assignment(e) => e.loc,
            Expr::Dispatch(e) => e.loc,
            Expr::Block(e) => e.loc,
            Expr::If(e) => e.loc,
            Expr::While(e) => e.loc,
            Expr::Let(e) => e.loc,
            Expr::Case(e) => e.loc,
            Expr::New(e) => e.loc,
            Expr::Binary(e) => e.loc,
            Expr::Unary(e) => e.loc,
        }
    }
}

impl ClassDecl {
    pub fn attributes(&self) -> impl Iterator<Item = &AttrDecl> {
        self.features.iter().filter_map(|f| match f {
            Feature::Attribute(attr) => Some(attr),
            Feature::Method(_) => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.features.iter().filter_map(|f| match f {
            Feature::Method(method) => Some(method),
            Feature::Attribute(_) => None,
        })
    }
}

impl Program {
    pub fn find_class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.name == name)
    }
}
