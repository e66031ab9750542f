//! 类型收集：登记每个类名

use crate::ast::Program;
use super::analyzer::SemanticAnalyzer;

impl SemanticAnalyzer {
    /// 每个类名只登记一次，重名时保留第一个声明
    pub(super) fn collect_types(&mut self, program: &Program) {
        for class in &program.classes {
            if let Err(err) = self.context.declare(&class.name, class.id) {
                self.report_error(err, class.loc);
            }
        }
        tracing::debug!(types = self.context.len(), "collected types");
    }
}
