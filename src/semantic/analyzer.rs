//! 语义分析器核心实现

use crate::ast::{ClassDecl, Program};
use crate::error::{Diagnostic, DiagnosticKind, SemanticError, SourceLocation};
use crate::types::{TypeContext, TypeId};
use super::scope::{ScopeId, ScopeTree};
use super::Analysis;

/// 语义分析器：按顺序运行各遍，持有类型上下文、作用域树和诊断列表
pub struct SemanticAnalyzer {
    pub(super) context: TypeContext,
    pub(super) scopes: ScopeTree,
    pub(super) diagnostics: Vec<Diagnostic>,
    pub(super) current_class: TypeId,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self {
            context: TypeContext::new(),
            scopes: ScopeTree::new(),
            diagnostics: Vec::new(),
            current_class: TypeId::OBJECT,
        }
    }

    #[tracing::instrument(skip_all, fields(classes = program.classes.len()))]
    pub fn analyze(mut self, program: Program) -> Analysis {
        // 第一遍：收集类型名
        self.collect_types(&program);

        // 第二遍：继承关系、属性与方法签名
        self.build_types(&program);

        // 第三遍：作用域与变量
        self.collect_variables(&program);

        // 第四遍：SELF_TYPE 绑定改写为所在类
        self.resolve_self_types(&program);

        // 第五遍：推断 Auto
        self.infer_types(&program);

        // 第六遍：类型检查
        self.check_types(&program);

        tracing::debug!(diagnostics = self.diagnostics.len(), "semantic analysis finished");
        Analysis {
            program,
            context: self.context,
            scopes: self.scopes,
            diagnostics: self.diagnostics,
        }
    }

    /// 每个名字第一个声明的类及其类型；重复声明被跳过
    pub(super) fn canonical_classes<'p>(
        &self,
        program: &'p Program,
    ) -> Vec<(&'p ClassDecl, TypeId)> {
        program
            .classes
            .iter()
            .filter_map(|class| {
                self.context
                    .class_for_decl(class.id)
                    .map(|id| (class, id))
            })
            .collect()
    }

    pub(super) fn report(&mut self, kind: DiagnosticKind, loc: SourceLocation, message: impl Into<String>) {
        self.push(Diagnostic::new(kind, loc, message));
    }

    pub(super) fn report_error(&mut self, error: SemanticError, loc: SourceLocation) {
        self.push(error.at(loc));
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(kind = ?diagnostic.kind, %diagnostic, "diagnostic");
        self.diagnostics.push(diagnostic);
    }

    /// 解析类型名；未定义时报告并以 `Error` 代替
    pub(super) fn resolve_type(&mut self, name: &str, loc: SourceLocation) -> TypeId {
        match self.context.get(name) {
            Ok(id) => id,
            Err(err) => {
                self.report_error(err, loc);
                TypeId::ERROR
            }
        }
    }

    /// 变量的静态类型：先查作用域链，再查当前类继承来的属性
    pub(super) fn variable_type(&self, scope: ScopeId, name: &str) -> Option<TypeId> {
        let class = self.current_class;
        if let Ok((_, info)) = self.scopes.find(scope, name) {
            return Some(self.context.resolve_self(info.var_type, class));
        }
        self.context
            .get_field(class, name)
            .ok()
            .map(|field| self.context.resolve_self(field.field_type, class))
    }

    pub(super) fn type_name(&self, id: TypeId) -> &str {
        self.context.name(id)
    }
}
