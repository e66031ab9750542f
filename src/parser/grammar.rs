//! 文法模型：符号、产生式与 FIRST 集
//!
//! 文法在构造完成后不可变。语义动作是普通函数指针，
//! 接收右部各符号的值并产生左部的值。

use std::collections::BTreeSet;
use std::fmt;
use indexmap::IndexMap;
use crate::error::{CoolResult, grammar_error};
use crate::lexer::EOF_TERMINAL;

pub type SymbolId = usize;
pub type ProductionId = usize;

/// 产生式的语义动作，参数为右部符号依次匹配到的值
pub type SemanticAction<V> = fn(Vec<V>) -> CoolResult<V>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Terminal,
    NonTerminal,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn is_terminal(&self) -> bool {
        self.kind == SymbolKind::Terminal
    }
}

pub struct Production<V> {
    pub left: SymbolId,
    pub right: Vec<SymbolId>,
    pub action: Option<SemanticAction<V>>,
}

impl<V> Production<V> {
    pub fn is_epsilon(&self) -> bool {
        self.right.is_empty()
    }
}

pub struct Grammar<V> {
    symbols: Vec<Symbol>,
    names: IndexMap<String, SymbolId>,
    productions: Vec<Production<V>>,
    by_left: Vec<Vec<ProductionId>>,
    start: Option<SymbolId>,
    eof: SymbolId,
}

impl<V> Default for Grammar<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Grammar<V> {
    pub fn new() -> Self {
        let mut grammar = Self {
            symbols: Vec::new(),
            names: IndexMap::new(),
            productions: Vec::new(),
            by_left: Vec::new(),
            start: None,
            eof: 0,
        };
        grammar.eof = grammar.add_symbol(EOF_TERMINAL, SymbolKind::Terminal);
        grammar
    }

    fn add_symbol(&mut self, name: &str, kind: SymbolKind) -> SymbolId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind,
        });
        self.names.insert(name.to_string(), id);
        self.by_left.push(Vec::new());
        id
    }

    pub fn terminal(&mut self, name: &str) -> SymbolId {
        self.add_symbol(name, SymbolKind::Terminal)
    }

    /// 按空白分隔一次声明多个终结符
    pub fn terminals<const N: usize>(&mut self, names: &str) -> [SymbolId; N] {
        let mut ids = [0; N];
        for (slot, name) in ids.iter_mut().zip(names.split_whitespace()) {
            *slot = self.terminal(name);
        }
        ids
    }

    pub fn non_terminal(&mut self, name: &str) -> SymbolId {
        self.add_symbol(name, SymbolKind::NonTerminal)
    }

    pub fn non_terminals<const N: usize>(&mut self, names: &str) -> [SymbolId; N] {
        let mut ids = [0; N];
        for (slot, name) in ids.iter_mut().zip(names.split_whitespace()) {
            *slot = self.non_terminal(name);
        }
        ids
    }

    pub fn set_start(&mut self, symbol: SymbolId) {
        self.start = Some(symbol);
    }

    /// 注册产生式；`right` 为空表示 ε 产生式
    pub fn production(
        &mut self,
        left: SymbolId,
        right: &[SymbolId],
        action: Option<SemanticAction<V>>,
    ) -> ProductionId {
        let id = self.productions.len();
        self.productions.push(Production {
            left,
            right: right.to_vec(),
            action,
        });
        self.by_left[left].push(id);
        id
    }

    /// 增广文法：加入 S' → S，并把 S' 设为开始符号
    pub fn augment(mut self) -> CoolResult<Self> {
        let start = self
            .start
            .ok_or_else(|| grammar_error("grammar has no start symbol"))?;
        let name = format!("{}'", self.symbols[start].name);
        let augmented = self.non_terminal(&name);
        self.production(augmented, &[start], None);
        self.start = Some(augmented);
        Ok(self)
    }

    /// 开始符号恰有一个产生式且不出现在任何右部
    pub fn is_augmented(&self) -> bool {
        let Some(start) = self.start else {
            return false;
        };
        self.by_left[start].len() == 1
            && self
                .productions
                .iter()
                .all(|p| !p.right.contains(&start))
    }

    pub fn start(&self) -> Option<SymbolId> {
        self.start
    }

    pub fn eof(&self) -> SymbolId {
        self.eof
    }

    pub fn symbol_name(&self, id: SymbolId) -> &str {
        &self.symbols[id].name
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.names.get(name).copied()
    }

    pub fn is_terminal(&self, id: SymbolId) -> bool {
        self.symbols[id].is_terminal()
    }

    pub fn production_at(&self, id: ProductionId) -> &Production<V> {
        &self.productions[id]
    }

    pub fn productions(&self) -> &[Production<V>] {
        &self.productions
    }

    pub fn productions_of(&self, symbol: SymbolId) -> &[ProductionId] {
        &self.by_left[symbol]
    }

    pub fn display_production(&self, id: ProductionId) -> String {
        let production = &self.productions[id];
        let right = if production.is_epsilon() {
            "ε".to_string()
        } else {
            production
                .right
                .iter()
                .map(|&s| self.symbol_name(s))
                .collect::<Vec<_>>()
                .join(" ")
        };
        format!("{} -> {}", self.symbol_name(production.left), right)
    }
}

/// FIRST 集：终结符集合加上 ε 标记
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstSet {
    pub symbols: BTreeSet<SymbolId>,
    pub contains_epsilon: bool,
}

impl FirstSet {
    pub fn of_terminal(terminal: SymbolId) -> Self {
        Self {
            symbols: BTreeSet::from([terminal]),
            contains_epsilon: false,
        }
    }

    /// 合并终结符与 ε 标记，返回是否有变化
    pub fn hard_update(&mut self, other: &FirstSet) -> bool {
        let before = self.symbols.len();
        self.symbols.extend(other.symbols.iter().copied());
        let grew = self.symbols.len() != before;
        let epsilon = !self.contains_epsilon && other.contains_epsilon;
        self.contains_epsilon |= other.contains_epsilon;
        grew || epsilon
    }
}

/// 每个符号的 FIRST 集
#[derive(Debug, Clone)]
pub struct Firsts {
    sets: Vec<FirstSet>,
}

impl Firsts {
    /// 不动点迭代：终结符的 FIRST 是其自身，
    /// 沿产生式把右部的 FIRST 传播到左部，直到没有集合再增长
    pub fn compute<V>(grammar: &Grammar<V>) -> Self {
        let mut sets: Vec<FirstSet> = (0..grammar.symbol_count())
            .map(|id| {
                if grammar.is_terminal(id) {
                    FirstSet::of_terminal(id)
                } else {
                    FirstSet::default()
                }
            })
            .collect();

        let mut changed = true;
        let mut rounds = 0;
        while changed {
            changed = false;
            rounds += 1;
            for production in grammar.productions() {
                let local = local_first(&sets, &production.right);
                changed |= sets[production.left].hard_update(&local);
            }
        }
        tracing::trace!(rounds, "first sets converged");

        Self { sets }
    }

    pub fn of(&self, symbol: SymbolId) -> &FirstSet {
        &self.sets[symbol]
    }

    /// 符号串的 FIRST 集
    pub fn of_sequence(&self, symbols: &[SymbolId]) -> FirstSet {
        local_first(&self.sets, symbols)
    }
}

/// 串的 FIRST：依次并入各符号的 FIRST，遇到不含 ε 的符号即停；
/// 只有全部符号都含 ε 时结果才含 ε
fn local_first(sets: &[FirstSet], alpha: &[SymbolId]) -> FirstSet {
    let mut first = FirstSet::default();
    for &symbol in alpha {
        let set = &sets[symbol];
        first.symbols.extend(set.symbols.iter().copied());
        if !set.contains_epsilon {
            return first;
        }
    }
    first.contains_epsilon = true;
    first
}

impl<V> fmt::Debug for Grammar<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("symbols", &self.symbols.len())
            .field("productions", &self.productions.len())
            .field("start", &self.start.map(|s| self.symbol_name(s)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// E → T X ; X → + T X | ε ; T → int | ( E )
    fn expression_grammar() -> (Grammar<()>, [SymbolId; 3]) {
        let mut g = Grammar::new();
        let [e, x, t] = g.non_terminals("E X T");
        let [plus, int, open, close] = g.terminals("+ int ( )");
        g.production(e, &[t, x], None);
        g.production(x, &[plus, t, x], None);
        g.production(x, &[], None);
        g.production(t, &[int], None);
        g.production(t, &[open, e, close], None);
        g.set_start(e);
        (g, [e, x, t])
    }

    #[test]
    fn test_firsts_with_epsilon() {
        let (g, [e, x, t]) = expression_grammar();
        let firsts = Firsts::compute(&g);
        let int = g.lookup("int").unwrap();
        let open = g.lookup("(").unwrap();
        let plus = g.lookup("+").unwrap();

        assert_eq!(firsts.of(e).symbols, BTreeSet::from([int, open]));
        assert!(!firsts.of(e).contains_epsilon);
        assert_eq!(firsts.of(t).symbols, BTreeSet::from([int, open]));
        assert_eq!(firsts.of(x).symbols, BTreeSet::from([plus]));
        assert!(firsts.of(x).contains_epsilon);
    }

    #[test]
    fn test_sequence_first_stops_at_non_nullable() {
        let (g, [_, x, t]) = expression_grammar();
        let firsts = Firsts::compute(&g);
        let plus = g.lookup("+").unwrap();
        let int = g.lookup("int").unwrap();
        let open = g.lookup("(").unwrap();

        let nullable = firsts.of_sequence(&[x, x]);
        assert!(nullable.contains_epsilon);
        assert_eq!(nullable.symbols, BTreeSet::from([plus]));

        let through = firsts.of_sequence(&[x, t, x]);
        assert!(!through.contains_epsilon);
        assert_eq!(through.symbols, BTreeSet::from([plus, int, open]));

        assert!(firsts.of_sequence(&[]).contains_epsilon);
    }

    #[test]
    fn test_augment() {
        let (g, [e, _, _]) = expression_grammar();
        assert!(!g.is_augmented());
        let g = g.augment().unwrap();
        assert!(g.is_augmented());
        let start = g.start().unwrap();
        assert_eq!(g.symbol_name(start), "E'");
        let only = g.productions_of(start)[0];
        assert_eq!(g.production_at(only).right, vec![e]);
    }

    #[test]
    fn test_augment_requires_start() {
        let g: Grammar<()> = Grammar::new();
        assert!(g.augment().is_err());
    }
}
