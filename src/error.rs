use thiserror::Error;
use std::fmt;

#[derive(Error, Debug, Clone)]
pub enum CoolError {
    #[error("Lexical errors: {}", join_diagnostics(.0))]
    Lexical(Vec<Diagnostic>),

    #[error("Parser error at line {line}, column {column}: {message}")]
    Parser { line: usize, column: usize, message: String },

    #[error("Grammar error: {0}")]
    Grammar(String),

    #[error("{kind} conflict in state {state} on '{symbol}': {existing} vs {incoming}")]
    Conflict {
        kind: ConflictKind,
        state: usize,
        symbol: String,
        existing: String,
        incoming: String,
    },

    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

pub type CoolResult<T> = Result<T, CoolError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    ShiftReduce,
    ReduceReduce,
    Goto,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::ShiftReduce => write!(f, "Shift-Reduce"),
            ConflictKind::ReduceReduce => write!(f, "Reduce-Reduce"),
            ConflictKind::Goto => write!(f, "Goto"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// 非致命诊断的分类，测试和调用方按类别统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    UnknownLexeme,
    UndefinedType,
    DuplicateType,
    CircularInheritance,
    InvalidInheritance,
    DuplicateAttribute,
    DuplicateMethod,
    UndefinedAttribute,
    UndefinedMethod,
    UndefinedVariable,
    RedefinedVariable,
    SelfIsReadonly,
    IncompatibleTypes,
    WrongSignature,
    ArgumentCount,
    InvalidOperation,
    UninferredType,
}

/// 语义分析过程中收集的一条诊断，分析不会因此中止
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub loc: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, loc: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            kind,
            loc,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.loc, self.message)
    }
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn parser_error(line: usize, column: usize, message: impl Into<String>) -> CoolError {
    CoolError::Parser {
        line,
        column,
        message: message.into(),
    }
}

pub fn grammar_error(message: impl Into<String>) -> CoolError {
    CoolError::Grammar(message.into())
}

pub fn evaluation_error(message: impl Into<String>) -> CoolError {
    CoolError::Evaluation(message.into())
}

/// 类型上下文与作用域树查询的失败。各遍把它转成诊断后继续
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("Type '{0}' is not defined")]
    UndefinedType(String),

    #[error("Type '{0}' is already defined")]
    DuplicateType(String),

    #[error("Class '{0}' is involved in an inheritance cycle")]
    CircularInheritance(String),

    #[error("Attribute '{attribute}' is already defined in '{class}'")]
    DuplicateAttribute { class: String, attribute: String },

    #[error("Method '{method}' is already defined in '{class}'")]
    DuplicateMethod { class: String, method: String },

    #[error("Type '{class}' has no attribute '{attribute}'")]
    UndefinedAttribute { class: String, attribute: String },

    #[error("Type '{class}' has no method '{method}'")]
    UndefinedMethod { class: String, method: String },

    #[error("Variable '{0}' is not defined")]
    UndefinedVariable(String),

    #[error("Variable '{0}' is already defined in this scope")]
    RedefinedVariable(String),

    #[error("'self' cannot be {0}")]
    ReservedSelf(&'static str),
}

impl SemanticError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            SemanticError::UndefinedType(_) => DiagnosticKind::UndefinedType,
            SemanticError::DuplicateType(_) => DiagnosticKind::DuplicateType,
            SemanticError::CircularInheritance(_) => DiagnosticKind::CircularInheritance,
            SemanticError::DuplicateAttribute { .. } => DiagnosticKind::DuplicateAttribute,
            SemanticError::DuplicateMethod { .. } => DiagnosticKind::DuplicateMethod,
            SemanticError::UndefinedAttribute { .. } => DiagnosticKind::UndefinedAttribute,
            SemanticError::UndefinedMethod { .. } => DiagnosticKind::UndefinedMethod,
            SemanticError::UndefinedVariable(_) => DiagnosticKind::UndefinedVariable,
            SemanticError::RedefinedVariable(_) => DiagnosticKind::RedefinedVariable,
            SemanticError::ReservedSelf(_) => DiagnosticKind::SelfIsReadonly,
        }
    }

    /// 附上位置，转成诊断
    pub fn at(self, loc: SourceLocation) -> Diagnostic {
        Diagnostic::new(self.kind(), loc, self.to_string())
    }
}
