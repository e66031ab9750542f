pub mod error;
pub mod types;
pub mod ast;
pub mod lexer;
pub mod parser;
pub mod semantic;

use error::{CoolError, CoolResult};
use lexer::LexOutput;
use parser::ParseOutput;
use semantic::{Analysis, SemanticAnalyzer};

/// 前端入口：词法、语法和语义分析依次进行
pub struct Compiler;

impl Compiler {
    pub fn new() -> Self {
        Self
    }

    pub fn tokenize(&self, source: &str) -> LexOutput {
        lexer::lex(source)
    }

    pub fn parse(&self, source: &str) -> CoolResult<ParseOutput> {
        parser::parse(&self.tokenize(source))
    }

    /// 完整分析一个编译单元。词法、语法错误是致命的；
    /// 语义问题作为诊断出现在结果里
    pub fn analyze(&self, source: &str) -> CoolResult<Analysis> {
        let lexed = self.tokenize(source);
        if !lexed.is_clean() {
            return Err(CoolError::Lexical(lexed.errors));
        }
        let parsed = parser::parse(&lexed)?;
        Ok(SemanticAnalyzer::new().analyze(parsed.program))
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_clean_program() {
        let source = r#"class Main inherits IO {
    main(): Object {
        out_string("Hello, World")
    };
};"#;
        let analysis = Compiler::new().analyze(source).unwrap();
        assert!(analysis.is_clean(), "{:?}", analysis.diagnostics);
        assert_eq!(analysis.program.classes.len(), 1);
    }

    #[test]
    fn test_syntax_errors_are_fatal() {
        let result = Compiler::new().analyze("class Main { main(): Object { } };");
        assert!(matches!(result, Err(CoolError::Parser { .. })));
    }
}
