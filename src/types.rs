use std::fmt;
use indexmap::IndexMap;
use crate::ast::NodeId;
use crate::error::{SemanticError, SourceLocation};

/// 类型在上下文中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub usize);

impl TypeId {
    /// 与一切类型互相符合，用来抑制连锁诊断
    pub const ERROR: TypeId = TypeId(0);
    /// 待推断的占位类型
    pub const AUTO: TypeId = TypeId(1);
    pub const SELF_TYPE: TypeId = TypeId(2);
    pub const OBJECT: TypeId = TypeId(3);
    pub const IO: TypeId = TypeId(4);
    pub const INT: TypeId = TypeId(5);
    pub const STRING: TypeId = TypeId(6);
    pub const BOOL: TypeId = TypeId(7);

    pub fn is_sentinel(self) -> bool {
        matches!(self, TypeId::ERROR | TypeId::AUTO | TypeId::SELF_TYPE)
    }

    /// 不能被继承的基本类型
    pub fn is_basic(self) -> bool {
        matches!(self, TypeId::INT | TypeId::STRING | TypeId::BOOL)
    }
}

pub const AUTO_ALIAS: &str = "AUTO_TYPE";

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub parent: Option<TypeId>,
    pub fields: IndexMap<String, FieldInfo>,
    pub methods: IndexMap<String, MethodInfo>,
    /// 声明该类的 AST 节点，内置类型为 None
    pub decl: Option<NodeId>,
}

impl ClassInfo {
    pub fn is_builtin(&self) -> bool {
        self.decl.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: TypeId,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    /// 定义该方法的类
    pub owner: TypeId,
    pub params: Vec<ParameterInfo>,
    pub return_type: TypeId,
    pub decl: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct ParameterInfo {
    pub name: String,
    pub param_type: TypeId,
}

/// 一个编译单元的类型表：名字唯一，TypeId 即插入顺序
pub struct TypeContext {
    classes: IndexMap<String, ClassInfo>,
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeContext {
    /// 创建带内置类型的上下文
    pub fn new() -> Self {
        let mut context = Self {
            classes: IndexMap::new(),
        };
        for name in ["Error", "Auto", "SELF_TYPE", "Object", "IO", "Int", "String", "Bool"] {
            context.insert_class(name, None);
        }
        for builtin in [TypeId::IO, TypeId::INT, TypeId::STRING, TypeId::BOOL] {
            context.class_mut(builtin).parent = Some(TypeId::OBJECT);
        }
        context.register_builtin_methods();
        context
    }

    fn register_builtin_methods(&mut self) {
        let builtins: [(TypeId, &str, &[(&str, TypeId)], TypeId); 10] = [
            (TypeId::OBJECT, "abort", &[], TypeId::OBJECT),
            (TypeId::OBJECT, "type_name", &[], TypeId::STRING),
            (TypeId::OBJECT, "copy", &[], TypeId::SELF_TYPE),
            (TypeId::IO, "out_string", &[("x", TypeId::STRING)], TypeId::SELF_TYPE),
            (TypeId::IO, "out_int", &[("x", TypeId::INT)], TypeId::SELF_TYPE),
            (TypeId::IO, "in_string", &[], TypeId::STRING),
            (TypeId::IO, "in_int", &[], TypeId::INT),
            (TypeId::STRING, "length", &[], TypeId::INT),
            (TypeId::STRING, "concat", &[("s", TypeId::STRING)], TypeId::STRING),
            (
                TypeId::STRING,
                "substr",
                &[("i", TypeId::INT), ("l", TypeId::INT)],
                TypeId::STRING,
            ),
        ];
        for (owner, name, params, return_type) in builtins {
            let method = MethodInfo {
                name: name.to_string(),
                owner,
                params: params
                    .iter()
                    .map(|&(name, param_type)| ParameterInfo {
                        name: name.to_string(),
                        param_type,
                    })
                    .collect(),
                return_type,
                decl: None,
            };
            self.class_mut(owner).methods.insert(name.to_string(), method);
        }
    }

    fn insert_class(&mut self, name: &str, decl: Option<NodeId>) -> TypeId {
        let (index, _) = self.classes.insert_full(
            name.to_string(),
            ClassInfo {
                name: name.to_string(),
                parent: None,
                fields: IndexMap::new(),
                methods: IndexMap::new(),
                decl,
            },
        );
        TypeId(index)
    }

    /// 注册新类型名；名字已存在（包括内置类型）时失败
    pub fn declare(&mut self, name: &str, decl: NodeId) -> Result<TypeId, SemanticError> {
        if self.classes.contains_key(name) || name == AUTO_ALIAS {
            return Err(SemanticError::DuplicateType(name.to_string()));
        }
        Ok(self.insert_class(name, Some(decl)))
    }

    /// 按名字查找类型；`AUTO_TYPE` 是 `Auto` 的别名
    pub fn get(&self, name: &str) -> Result<TypeId, SemanticError> {
        let name = if name == AUTO_ALIAS { "Auto" } else { name };
        self.classes
            .get_index_of(name)
            .map(TypeId)
            .ok_or_else(|| SemanticError::UndefinedType(name.to_string()))
    }

    pub fn class(&self, id: TypeId) -> &ClassInfo {
        &self.classes[id.0]
    }

    fn class_mut(&mut self, id: TypeId) -> &mut ClassInfo {
        &mut self.classes[id.0]
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.classes[id.0].name
    }

    pub fn parent(&self, id: TypeId) -> Option<TypeId> {
        self.class(id).parent
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        (0..self.classes.len()).map(TypeId)
    }

    /// 用户声明的类（每个名字的第一个声明）
    pub fn user_classes(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.ids().filter(move |&id| !self.class(id).is_builtin())
    }

    /// 由声明节点找回类型；重复声明被丢弃的类返回 None
    pub fn class_for_decl(&self, decl: NodeId) -> Option<TypeId> {
        self.ids().find(|&id| self.class(id).decl == Some(decl))
    }

    /// 设置父类。若父类的祖先链已经包含 `child`，拒绝并把 `child` 挂到 `Object` 下
    pub fn set_parent(&mut self, child: TypeId, parent: TypeId) -> Result<(), SemanticError> {
        if self.ancestors(parent).any(|id| id == child) {
            self.class_mut(child).parent = Some(TypeId::OBJECT);
            return Err(SemanticError::CircularInheritance(self.name(child).to_string()));
        }
        self.class_mut(child).parent = Some(parent);
        Ok(())
    }

    /// 从自身开始沿父链上行；步数以类型数为界
    pub fn ancestors(&self, id: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        std::iter::successors(Some(id), move |&current| self.parent(current)).take(self.len())
    }

    /// 从根到自身的路径，`Object ... id`
    pub fn path_to_root(&self, id: TypeId) -> Vec<TypeId> {
        let mut path: Vec<TypeId> = self.ancestors(id).collect();
        path.reverse();
        path
    }

    /// 继承深度，`Object` 为 0
    pub fn depth(&self, id: TypeId) -> usize {
        self.ancestors(id).count().saturating_sub(1)
    }

    pub fn define_field(
        &mut self,
        class: TypeId,
        name: &str,
        field_type: TypeId,
        loc: SourceLocation,
    ) -> Result<(), SemanticError> {
        if self.get_field(class, name).is_ok() {
            return Err(SemanticError::DuplicateAttribute {
                class: self.name(class).to_string(),
                attribute: name.to_string(),
            });
        }
        self.class_mut(class).fields.insert(
            name.to_string(),
            FieldInfo {
                name: name.to_string(),
                field_type,
                loc,
            },
        );
        Ok(())
    }

    /// 注册方法；同一个类里重名失败，覆盖父类方法是允许的
    pub fn define_method(&mut self, class: TypeId, method: MethodInfo) -> Result<(), SemanticError> {
        let info = self.class_mut(class);
        if info.methods.contains_key(&method.name) {
            return Err(SemanticError::DuplicateMethod {
                class: info.name.clone(),
                method: method.name,
            });
        }
        info.methods.insert(method.name.clone(), method);
        Ok(())
    }

    /// 沿继承链查找属性
    pub fn get_field(&self, class: TypeId, name: &str) -> Result<&FieldInfo, SemanticError> {
        self.ancestors(class)
            .find_map(|id| self.class(id).fields.get(name))
            .ok_or_else(|| SemanticError::UndefinedAttribute {
                class: self.name(class).to_string(),
                attribute: name.to_string(),
            })
    }

    /// 沿继承链查找方法，返回最近的定义
    pub fn get_method(&self, class: TypeId, name: &str) -> Result<&MethodInfo, SemanticError> {
        self.ancestors(class)
            .find_map(|id| self.class(id).methods.get(name))
            .ok_or_else(|| SemanticError::UndefinedMethod {
                class: self.name(class).to_string(),
                method: name.to_string(),
            })
    }

    pub fn field_mut(&mut self, class: TypeId, name: &str) -> Option<&mut FieldInfo> {
        self.class_mut(class).fields.get_mut(name)
    }

    /// 类自身声明的、来自给定 AST 节点的方法
    pub fn method_for_decl(&self, class: TypeId, decl: NodeId) -> Option<&MethodInfo> {
        self.class(class).methods.values().find(|m| m.decl == Some(decl))
    }

    pub fn method_for_decl_mut(&mut self, class: TypeId, decl: NodeId) -> Option<&mut MethodInfo> {
        self.class_mut(class)
            .methods
            .values_mut()
            .find(|m| m.decl == Some(decl))
    }

    /// `SELF_TYPE` 解析为当前分析的类，其他类型不变
    pub fn resolve_self(&self, id: TypeId, current: TypeId) -> TypeId {
        if id == TypeId::SELF_TYPE { current } else { id }
    }

    /// `a` 是否符合 `b`：`b` 在 `a` 的祖先链上。
    /// `Error` 与 `Auto` 和任何类型互相符合
    pub fn conforms_to(&self, a: TypeId, b: TypeId) -> bool {
        let absorbing = |t: TypeId| t == TypeId::ERROR || t == TypeId::AUTO;
        if absorbing(a) || absorbing(b) {
            return true;
        }
        self.ancestors(a).any(|id| id == b)
    }

    /// 最深的公共祖先。忽略 `Error`/`Auto`；路径在根处就分叉时返回 None
    pub fn least_upper_bound(&self, types: &[TypeId]) -> Option<TypeId> {
        let concrete: Vec<TypeId> = types
            .iter()
            .copied()
            .filter(|&t| t != TypeId::ERROR && t != TypeId::AUTO)
            .collect();
        if concrete.is_empty() {
            return types.first().copied();
        }

        let paths: Vec<Vec<TypeId>> = concrete.iter().map(|&t| self.path_to_root(t)).collect();
        let shortest = paths.iter().map(Vec::len).min().unwrap_or(0);
        let mut lub = None;
        for depth in 0..shortest {
            let candidate = paths[0][depth];
            if paths.iter().all(|path| path[depth] == candidate) {
                lub = Some(candidate);
            } else {
                break;
            }
        }
        lub
    }
}

impl fmt::Display for TypeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.ids().filter(|id| !id.is_sentinel()) {
            let class = self.class(id);
            write!(f, "type {}", class.name)?;
            if let Some(parent) = class.parent {
                write!(f, " inherits {}", self.name(parent))?;
            }
            writeln!(f)?;
            for field in class.fields.values() {
                writeln!(f, "    attribute {}: {}", field.name, self.name(field.field_type))?;
            }
            for method in class.methods.values() {
                let params: Vec<String> = method
                    .params
                    .iter()
                    .map(|p| format!("{}: {}", p.name, self.name(p.param_type)))
                    .collect();
                writeln!(
                    f,
                    "    method {}({}): {}",
                    method.name,
                    params.join(", "),
                    self.name(method.return_type)
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Object <- A <- B, Object <- C
    fn hierarchy() -> (TypeContext, TypeId, TypeId, TypeId) {
        let mut context = TypeContext::new();
        let a = context.declare("A", NodeId(0)).unwrap();
        let b = context.declare("B", NodeId(1)).unwrap();
        let c = context.declare("C", NodeId(2)).unwrap();
        context.set_parent(a, TypeId::OBJECT).unwrap();
        context.set_parent(b, a).unwrap();
        context.set_parent(c, TypeId::OBJECT).unwrap();
        (context, a, b, c)
    }

    #[test]
    fn test_builtins_and_alias() {
        let context = TypeContext::new();
        assert_eq!(context.get("Int").unwrap(), TypeId::INT);
        assert_eq!(context.get("AUTO_TYPE").unwrap(), TypeId::AUTO);
        assert_eq!(context.get("Auto").unwrap(), TypeId::AUTO);
        assert!(matches!(context.get("Missing"), Err(SemanticError::UndefinedType(_))));
        let copy = context.get_method(TypeId::IO, "copy").unwrap();
        assert_eq!(copy.owner, TypeId::OBJECT);
        assert_eq!(copy.return_type, TypeId::SELF_TYPE);
    }

    #[test]
    fn test_declare_rejects_duplicates() {
        let mut context = TypeContext::new();
        context.declare("A", NodeId(0)).unwrap();
        assert!(context.declare("A", NodeId(9)).is_err());
        assert!(context.declare("Int", NodeId(9)).is_err());
    }

    #[test]
    fn test_conformance_is_a_partial_order() {
        let (context, a, b, c) = hierarchy();
        let all = [TypeId::OBJECT, a, b, c, TypeId::INT];
        for &x in &all {
            assert!(context.conforms_to(x, x));
            assert!(context.conforms_to(x, TypeId::OBJECT));
            assert!(context.conforms_to(x, TypeId::ERROR));
            assert!(context.conforms_to(TypeId::ERROR, x));
            for &y in &all {
                if x != y && context.conforms_to(x, y) {
                    assert!(!context.conforms_to(y, x), "antisymmetry");
                }
                for &z in &all {
                    if context.conforms_to(x, y) && context.conforms_to(y, z) {
                        assert!(context.conforms_to(x, z), "transitivity");
                    }
                }
            }
        }
        assert!(context.conforms_to(b, a));
        assert!(!context.conforms_to(a, b));
        assert!(!context.conforms_to(c, a));
    }

    #[test]
    fn test_least_upper_bound() {
        let (context, a, b, c) = hierarchy();
        assert_eq!(context.least_upper_bound(&[a, a]), Some(a));
        assert_eq!(context.least_upper_bound(&[a, b]), Some(a));
        assert_eq!(context.least_upper_bound(&[b, c]), Some(TypeId::OBJECT));
        assert_eq!(context.least_upper_bound(&[b, TypeId::ERROR]), Some(b));
        assert_eq!(context.least_upper_bound(&[TypeId::INT, TypeId::SELF_TYPE]), None);
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let (mut context, a, b, _) = hierarchy();
        let err = context.set_parent(a, b).unwrap_err();
        assert_eq!(err, SemanticError::CircularInheritance("A".to_string()));
        assert_eq!(context.parent(a), Some(TypeId::OBJECT));
        assert_eq!(context.path_to_root(b), vec![TypeId::OBJECT, a, b]);
    }

    #[test]
    fn test_members_are_inherited() {
        let (mut context, a, b, _) = hierarchy();
        let loc = SourceLocation::default();
        context.define_field(a, "x", TypeId::INT, loc).unwrap();
        assert!(context.define_field(b, "x", TypeId::INT, loc).is_err());
        assert_eq!(context.get_field(b, "x").unwrap().field_type, TypeId::INT);

        let method = MethodInfo {
            name: "f".to_string(),
            owner: a,
            params: Vec::new(),
            return_type: TypeId::INT,
            decl: Some(NodeId(5)),
        };
        context.define_method(a, method.clone()).unwrap();
        assert!(context.define_method(a, method.clone()).is_err());
        context.define_method(b, MethodInfo { owner: b, ..method }).unwrap();
        assert_eq!(context.get_method(b, "f").unwrap().owner, b);
        assert_eq!(context.get_method(b, "abort").unwrap().owner, TypeId::OBJECT);
    }
}
