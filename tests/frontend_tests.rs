//! COOL 前端集成测试
//!
//! 通过公开接口走完词法、语法、语义分析的整个流程

use coolfront::Compiler;
use coolfront::ast::{Expr, Feature};
use coolfront::error::{ConflictKind, CoolError, DiagnosticKind};
use coolfront::parser::engine::Lr1Parser;
use coolfront::parser::grammar::Grammar;
use coolfront::types::TypeId;
use indoc::indoc;

#[test]
fn test_parse_class_features() {
    let parsed = Compiler::new()
        .parse("class A { a: Int; f(x: Int): Int { x }; };")
        .unwrap();
    let classes = &parsed.program.classes;
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].name, "A");
    assert_eq!(classes[0].attributes().count(), 1);

    let methods: Vec<_> = classes[0].methods().collect();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].params.len(), 1);
    assert_eq!(methods[0].params[0].name, "x");
    assert!(matches!(methods[0].body, Expr::Identifier(ref ident) if ident.name == "x"));
    assert!(matches!(classes[0].features[0], Feature::Attribute(_)));
}

#[test]
fn test_full_program_is_clean() {
    let source = indoc! {r#"
        class Counter {
            count: Int <- 0;

            inc(): SELF_TYPE {
                {
                    count <- count + 1;
                    self;
                }
            };

            get(): Int { count };
        };

        class Main inherits IO {
            main(): Object {
                let c: Counter <- new Counter in {
                    c.inc().inc();
                    out_int(c.get());
                    if c.get() = 2 then out_string("ok\n") else abort() fi;
                }
            };
        };
    "#};
    let analysis = Compiler::new().analyze(source).unwrap();
    assert!(analysis.is_clean(), "{:?}", analysis.diagnostics);
    assert!(analysis.context.get("Counter").is_ok());
}

#[test]
fn test_circular_inheritance_reported_once() {
    let source = indoc! {"
        class A inherits B { };
        class B inherits A { };
    "};
    let analysis = Compiler::new().analyze(source).unwrap();
    assert_eq!(analysis.count(DiagnosticKind::CircularInheritance), 1);
    assert_eq!(analysis.diagnostics.len(), 1);

    // 分析结束后继承关系仍是一棵以 Object 为根的树
    for name in ["A", "B"] {
        let id = analysis.context.get(name).unwrap();
        assert!(analysis.context.conforms_to(id, TypeId::OBJECT));
    }
}

#[test]
fn test_auto_types_are_inferred() {
    let source = indoc! {"
        class Main {
            def succ(n: Auto): Auto { n + 1 };
        };
    "};
    let analysis = Compiler::new().analyze(source).unwrap();
    assert!(analysis.is_clean(), "{:?}", analysis.diagnostics);

    let main = analysis.context.get("Main").unwrap();
    let succ = analysis.context.get_method(main, "succ").unwrap();
    assert_eq!(succ.params[0].param_type, TypeId::INT);
    assert_eq!(succ.return_type, TypeId::INT);
}

#[test]
fn test_independent_errors_are_all_reported() {
    let source = indoc! {"
        class A {
            s: String;
            f(x: Int): Int { x };
            g(): Object {
                {
                    s <- 1;
                    f(1, 2);
                }
            };
        };
    "};
    let analysis = Compiler::new().analyze(source).unwrap();
    let kinds: Vec<_> = analysis.diagnostics.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![DiagnosticKind::IncompatibleTypes, DiagnosticKind::ArgumentCount]
    );
    // 诊断按源码顺序给出位置
    assert!(analysis.diagnostics[0].loc.line < analysis.diagnostics[1].loc.line);
}

#[test]
fn test_lexical_errors_are_fatal() {
    let result = Compiler::new().analyze("class A { x: Int <- 1 # 2; };");
    assert!(matches!(result, Err(CoolError::Lexical(ref errors)) if !errors.is_empty()));
}

#[test]
fn test_syntax_error_location() {
    let source = indoc! {"
        class A {
            f(): Int { 1 + };
        };
    "};
    match Compiler::new().analyze(source) {
        Err(CoolError::Parser { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected a syntax error, got {:?}", other.map(|a| a.diagnostics)),
    }
}

#[test]
fn test_conflicting_grammar_is_rejected() {
    // S → a | a
    let mut g: Grammar<()> = Grammar::new();
    let [s] = g.non_terminals("S");
    let [a] = g.terminals("a");
    g.production(s, &[a], None);
    g.production(s, &[a], None);
    g.set_start(s);
    let g = g.augment().unwrap();

    let err = Lr1Parser::new(g).err().unwrap();
    assert!(matches!(
        err,
        CoolError::Conflict { kind: ConflictKind::ReduceReduce, .. }
    ));
}
