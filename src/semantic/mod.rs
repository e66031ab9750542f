//! COOL 语义分析
//!
//! 六个依次执行的遍：收集类型、构建继承层次、收集变量、解析 SELF_TYPE、
//! 推断 Auto、类型检查。每一遍都容错，失败的检查追加一条诊断并以
//! `Error` 类型继续。

mod analyzer;
mod class_analysis;
mod inference;
pub mod scope;
mod self_type;
mod type_checker;
mod type_collector;
mod var_collector;

pub use analyzer::SemanticAnalyzer;
pub use scope::{ScopeId, ScopeTree, VariableInfo};

use crate::ast::{NodeId, Program};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::types::{TypeContext, TypeId};

/// 分析结果：AST、类型表、作用域树和按发现顺序排列的诊断
pub struct Analysis {
    pub program: Program,
    pub context: TypeContext,
    pub scopes: ScopeTree,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    /// 在 `node` 引入的作用域中查找变量的类型
    pub fn variable_type(&self, node: NodeId, name: &str) -> Option<TypeId> {
        let scope = self.scopes.scope_of(node)?;
        self.scopes.find(scope, name).ok().map(|(_, info)| info.var_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn analyze(source: &str) -> Analysis {
        let program = parse(&lex(source)).unwrap().program;
        SemanticAnalyzer::new().analyze(program)
    }

    fn kinds(analysis: &Analysis) -> Vec<DiagnosticKind> {
        analysis.diagnostics.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn test_clean_program() {
        let analysis = analyze(
            "class Main inherits IO { main(): Object { out_string(\"hi\").out_int(1) }; };",
        );
        assert!(analysis.is_clean(), "{:?}", analysis.diagnostics);
    }

    #[test]
    fn test_duplicate_class_keeps_first() {
        let analysis = analyze("class A { a: Int; }; class A { b: String; };");
        assert_eq!(kinds(&analysis), vec![DiagnosticKind::DuplicateType]);
        let a = analysis.context.get("A").unwrap();
        assert!(analysis.context.get_field(a, "a").is_ok());
        assert!(analysis.context.get_field(a, "b").is_err());
    }

    #[test]
    fn test_basic_types_cannot_be_inherited() {
        let analysis = analyze("class A inherits Int { };");
        assert_eq!(kinds(&analysis), vec![DiagnosticKind::InvalidInheritance]);
        let a = analysis.context.get("A").unwrap();
        assert_eq!(analysis.context.parent(a), Some(TypeId::OBJECT));
    }

    #[test]
    fn test_undefined_parent_defaults_to_object() {
        let analysis = analyze("class A inherits Missing { };");
        assert_eq!(kinds(&analysis), vec![DiagnosticKind::UndefinedType]);
    }

    #[test]
    fn test_attribute_rules() {
        let analysis = analyze(
            "class A { x: Int; x: String; self: Int; }; class B inherits A { x: Int; };",
        );
        assert_eq!(
            kinds(&analysis),
            vec![
                DiagnosticKind::DuplicateAttribute,
                DiagnosticKind::SelfIsReadonly,
                DiagnosticKind::DuplicateAttribute,
            ]
        );
    }

    #[test]
    fn test_method_and_parameter_rules() {
        let analysis = analyze(
            "class A { f(x: Int, x: Int): Int { x }; f(): Int { 1 }; g(self: Int): Int { 1 }; };",
        );
        assert_eq!(
            kinds(&analysis),
            vec![
                DiagnosticKind::DuplicateMethod,
                DiagnosticKind::RedefinedVariable,
                DiagnosticKind::SelfIsReadonly,
            ]
        );
    }

    #[test]
    fn test_undefined_variable_reported_once() {
        let analysis = analyze("class A { f(): Int { y + y }; };");
        assert_eq!(kinds(&analysis), vec![DiagnosticKind::UndefinedVariable]);
    }

    #[test]
    fn test_inherited_attribute_is_visible() {
        let analysis = analyze("class A { x: Int; }; class B inherits A { f(): Int { x + 1 }; };");
        assert!(analysis.is_clean(), "{:?}", analysis.diagnostics);
    }

    #[test]
    fn test_assigning_self() {
        let analysis = analyze("class A { f(): A { self <- new A }; };");
        assert_eq!(kinds(&analysis), vec![DiagnosticKind::SelfIsReadonly]);
    }

    #[test]
    fn test_let_binding_scopes() {
        let source = "class A { f(): Int { let a: Int <- 1, b: Int <- a in a + b }; };";
        let analysis = analyze(source);
        assert!(analysis.is_clean(), "{:?}", analysis.diagnostics);
        let b = NodeId(source.find("b:").unwrap());
        assert_eq!(analysis.variable_type(b, "b"), Some(TypeId::INT));
        assert_eq!(analysis.variable_type(b, "a"), Some(TypeId::INT));
        // 第一个绑定的作用域看不到后面的绑定
        let a = NodeId(source.find("a:").unwrap());
        assert_eq!(analysis.variable_type(a, "b"), None);
    }

    #[test]
    fn test_self_type_binding_resolved() {
        let source = "class A { f(): SELF_TYPE { self }; };";
        let analysis = analyze(source);
        assert!(analysis.is_clean(), "{:?}", analysis.diagnostics);
        let a = analysis.context.get("A").unwrap();
        let class_node = analysis.program.classes[0].id;
        assert_eq!(analysis.variable_type(class_node, "self"), Some(a));
    }

    #[test]
    fn test_inference_through_call_sites() {
        let source = "class A { \
            f(): Int { g(3) }; \
            g(n: Auto): Auto { n }; \
            x: Auto <- f(); \
        };";
        let analysis = analyze(source);
        assert!(analysis.is_clean(), "{:?}", analysis.diagnostics);
        let a = analysis.context.get("A").unwrap();
        let g = analysis.context.get_method(a, "g").unwrap();
        assert_eq!(g.params[0].param_type, TypeId::INT);
        assert_eq!(g.return_type, TypeId::INT);
        assert_eq!(analysis.context.get_field(a, "x").unwrap().field_type, TypeId::INT);
    }

    #[test]
    fn test_uninferred_reported_once() {
        let analysis = analyze("class A { f(x: AUTO_TYPE): Object { x }; };");
        assert_eq!(kinds(&analysis), vec![DiagnosticKind::UninferredType]);
        let a = analysis.context.get("A").unwrap();
        let f = analysis.context.get_method(a, "f").unwrap();
        assert_eq!(f.params[0].param_type, TypeId::ERROR);
    }

    #[test]
    fn test_operator_rules() {
        let analysis = analyze(
            "class A { f(): Object { { 1 + true; not 1; ~\"s\"; 1 = \"s\"; 1 < 2; } }; };",
        );
        assert_eq!(
            kinds(&analysis),
            vec![
                DiagnosticKind::InvalidOperation,
                DiagnosticKind::InvalidOperation,
                DiagnosticKind::InvalidOperation,
                DiagnosticKind::InvalidOperation,
            ]
        );
    }

    #[test]
    fn test_conditions_must_be_bool() {
        let analysis = analyze(
            "class A { f(): Object { { if 1 then 2 else 3 fi; while \"s\" loop 1 pool; } }; };",
        );
        assert_eq!(analysis.count(DiagnosticKind::IncompatibleTypes), 2);
        assert_eq!(analysis.diagnostics.len(), 2);
    }

    #[test]
    fn test_if_joins_branch_types() {
        let analysis = analyze(
            "class A { }; class B inherits A { }; class C inherits A { }; \
             class D { f(): A { if true then new B else new C fi }; g(): B { if true then new B else new C fi }; };",
        );
        assert_eq!(kinds(&analysis), vec![DiagnosticKind::IncompatibleTypes]);
    }

    #[test]
    fn test_override_must_match_parent() {
        let analysis = analyze(
            "class A { f(x: Int): Int { x }; g(): A { self }; }; \
             class B inherits A { f(x: String): Int { 1 }; g(): SELF_TYPE { self }; };",
        );
        assert_eq!(kinds(&analysis), vec![DiagnosticKind::WrongSignature]);
    }

    #[test]
    fn test_dispatch_rules() {
        let analysis = analyze(
            "class A { f(x: Int): Int { x }; }; class B { \
               g(a: A): Object { { a.f(\"s\"); a.h(); a@Missing.f(1); new Missing; a@A.f(1); } }; };",
        );
        assert_eq!(
            kinds(&analysis),
            vec![
                DiagnosticKind::IncompatibleTypes,
                DiagnosticKind::UndefinedMethod,
                DiagnosticKind::UndefinedType,
                DiagnosticKind::UndefinedType,
            ]
        );
    }

    #[test]
    fn test_static_dispatch_self_type_uses_receiver() {
        let analysis = analyze(
            "class A { me(): SELF_TYPE { self }; }; class B inherits A { \
               f(): B { (new B)@A.copy() }; \
               g(): B { (new B)@A.me() }; \
               x: Auto <- (new B)@A.copy(); };",
        );
        assert!(analysis.is_clean(), "{:?}", analysis.diagnostics);
        let b = analysis.context.get("B").unwrap();
        assert_eq!(analysis.context.get_field(b, "x").unwrap().field_type, b);
    }

    #[test]
    fn test_let_binding_named_self() {
        let analysis = analyze("class A { f(): Int { let self: Int <- 1 in 2 }; };");
        assert_eq!(kinds(&analysis), vec![DiagnosticKind::SelfIsReadonly]);
    }

    #[test]
    fn test_case_requires_conforming_branches() {
        let analysis = analyze(
            "class A { }; class B inherits A { }; class C { \
               f(b: B): A { case b of x: A => x; y: B => y; esac }; \
               g(a: A): Object { case a of x: B => x; esac }; };",
        );
        assert_eq!(kinds(&analysis), vec![DiagnosticKind::IncompatibleTypes]);
    }
}
