//! SELF_TYPE 解析：把作用域中的 SELF_TYPE 绑定改写为所在类

use crate::ast::Program;
use crate::types::TypeId;
use super::analyzer::SemanticAnalyzer;

impl SemanticAnalyzer {
    pub(super) fn resolve_self_types(&mut self, program: &Program) {
        let mut rewritten = 0;
        for (class, id) in self.canonical_classes(program) {
            let Some(class_scope) = self.scopes.scope_of(class.id) else {
                continue;
            };
            for scope in self.scopes.descendants(class_scope) {
                for variable in self.scopes.variables_mut(scope) {
                    if variable.var_type == TypeId::SELF_TYPE {
                        variable.var_type = id;
                        rewritten += 1;
                    }
                }
            }
        }
        tracing::debug!(rewritten, "resolved SELF_TYPE bindings");
    }
}
