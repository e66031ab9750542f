//! 规范 LR(1) 自动机与 action/goto 表的构造
//!
//! 项目按“核心”（产生式 + 点的位置）比较，向前看符号集合单独存放，
//! 同一核心的向前看在闭包过程中直接合并（压缩）。状态按内核去重。

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use crate::error::{ConflictKind, CoolError, CoolResult, grammar_error};
use super::grammar::{Firsts, Grammar, ProductionId, SymbolId};

pub type StateId = usize;

/// 项目核心：产生式与点的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Center {
    pub production: ProductionId,
    pub dot: usize,
}

impl Center {
    pub fn new(production: ProductionId, dot: usize) -> Self {
        Self { production, dot }
    }

    pub fn advance(self) -> Self {
        Self {
            production: self.production,
            dot: self.dot + 1,
        }
    }
}

/// 压缩后的项目集：核心 → 合并后的向前看集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ItemSet {
    items: BTreeMap<Center, BTreeSet<SymbolId>>,
}

impl ItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 并入向前看，返回集合是否变化
    pub fn insert(&mut self, center: Center, lookaheads: &BTreeSet<SymbolId>) -> bool {
        match self.items.get_mut(&center) {
            Some(existing) => {
                let before = existing.len();
                existing.extend(lookaheads.iter().copied());
                existing.len() != before
            }
            None => {
                self.items.insert(center, lookaheads.clone());
                true
            }
        }
    }

    pub fn lookaheads(&self, center: &Center) -> Option<&BTreeSet<SymbolId>> {
        self.items.get(center)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Center, &BTreeSet<SymbolId>)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn next_symbol<V>(grammar: &Grammar<V>, center: &Center) -> Option<SymbolId> {
    grammar
        .production_at(center.production)
        .right
        .get(center.dot)
        .copied()
}

/// LR(1) 闭包。点后为非终结符 B 的项目 [A → α·Bβ, L] 展开为
/// [B → ·γ, FIRST(β a)]（a ∈ L）；同一核心的向前看合并，直到不再变化。
pub fn closure<V>(grammar: &Grammar<V>, firsts: &Firsts, kernel: &ItemSet) -> ItemSet {
    let mut closure = kernel.clone();

    let mut changed = true;
    while changed {
        changed = false;
        let snapshot: Vec<(Center, BTreeSet<SymbolId>)> = closure
            .iter()
            .map(|(center, lookaheads)| (*center, lookaheads.clone()))
            .collect();

        for (center, lookaheads) in snapshot {
            let Some(next) = next_symbol(grammar, &center) else {
                continue;
            };
            if grammar.is_terminal(next) {
                continue;
            }

            let rest = &grammar.production_at(center.production).right[center.dot + 1..];
            let first_rest = firsts.of_sequence(rest);
            let mut expanded = first_rest.symbols;
            if first_rest.contains_epsilon {
                expanded.extend(lookaheads.iter().copied());
            }

            for &production in grammar.productions_of(next) {
                changed |= closure.insert(Center::new(production, 0), &expanded);
            }
        }
    }

    closure
}

/// goto 的内核：点后为 `symbol` 的项目前移一位
pub fn goto_kernel<V>(grammar: &Grammar<V>, items: &ItemSet, symbol: SymbolId) -> ItemSet {
    let mut kernel = ItemSet::new();
    for (center, lookaheads) in items.iter() {
        if next_symbol(grammar, center) == Some(symbol) {
            kernel.insert(center.advance(), lookaheads);
        }
    }
    kernel
}

pub fn goto<V>(grammar: &Grammar<V>, firsts: &Firsts, items: &ItemSet, symbol: SymbolId) -> ItemSet {
    closure(grammar, firsts, &goto_kernel(grammar, items, symbol))
}

#[derive(Debug, Clone)]
pub struct State {
    pub kernel: ItemSet,
    pub items: ItemSet,
    pub transitions: BTreeMap<SymbolId, StateId>,
}

/// 自动机状态图，状态 0 为初始状态
#[derive(Debug, Clone)]
pub struct Automaton {
    pub states: Vec<State>,
}

impl Automaton {
    /// 从增广开始项目 [S' → ·S, $] 出发广度优先地展开可达内核
    #[tracing::instrument(skip_all)]
    pub fn build<V>(grammar: &Grammar<V>, firsts: &Firsts) -> CoolResult<Self> {
        if !grammar.is_augmented() {
            return Err(grammar_error("grammar must be augmented"));
        }
        let start = grammar
            .start()
            .ok_or_else(|| grammar_error("grammar has no start symbol"))?;
        let start_production = grammar.productions_of(start)[0];

        let mut start_kernel = ItemSet::new();
        start_kernel.insert(
            Center::new(start_production, 0),
            &BTreeSet::from([grammar.eof()]),
        );

        let mut states = vec![State {
            items: closure(grammar, firsts, &start_kernel),
            kernel: start_kernel.clone(),
            transitions: BTreeMap::new(),
        }];
        let mut visited: HashMap<ItemSet, StateId> = HashMap::from([(start_kernel, 0)]);
        let mut pending = VecDeque::from([0]);

        while let Some(current) = pending.pop_front() {
            let mut symbols: Vec<SymbolId> = states[current]
                .items
                .iter()
                .filter_map(|(center, _)| next_symbol(grammar, center))
                .collect();
            symbols.sort_unstable();
            symbols.dedup();

            for symbol in symbols {
                let kernel = goto_kernel(grammar, &states[current].items, symbol);
                if kernel.is_empty() {
                    continue;
                }
                let target = match visited.get(&kernel) {
                    Some(&id) => id,
                    None => {
                        let id = states.len();
                        states.push(State {
                            items: closure(grammar, firsts, &kernel),
                            kernel: kernel.clone(),
                            transitions: BTreeMap::new(),
                        });
                        visited.insert(kernel, id);
                        pending.push_back(id);
                        id
                    }
                };
                states[current].transitions.insert(symbol, target);
            }
        }

        tracing::debug!(states = states.len(), "built LR(1) automaton");
        Ok(Self { states })
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Shift(StateId),
    Reduce(ProductionId),
    Accept,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Shift(state) => write!(f, "SHIFT {}", state),
            Action::Reduce(production) => write!(f, "REDUCE {}", production),
            Action::Accept => write!(f, "ACCEPT"),
        }
    }
}

/// action 表与 goto 表
#[derive(Debug, Clone, Default)]
pub struct ParseTable {
    action: HashMap<(StateId, SymbolId), Action>,
    goto: HashMap<(StateId, SymbolId), StateId>,
    state_count: usize,
}

impl ParseTable {
    /// 从自动机填表，任何冲突的重复写入都是构造期的致命错误
    #[tracing::instrument(skip_all)]
    pub fn build<V>(grammar: &Grammar<V>, automaton: &Automaton) -> CoolResult<Self> {
        let start = grammar
            .start()
            .ok_or_else(|| grammar_error("grammar has no start symbol"))?;
        let mut table = Self {
            state_count: automaton.len(),
            ..Self::default()
        };

        for (id, state) in automaton.states.iter().enumerate() {
            for (center, lookaheads) in state.items.iter() {
                let production = grammar.production_at(center.production);
                match production.right.get(center.dot) {
                    None if production.left == start => {
                        table.register_action(grammar, id, grammar.eof(), Action::Accept)?;
                    }
                    None => {
                        for &lookahead in lookaheads {
                            table.register_action(
                                grammar,
                                id,
                                lookahead,
                                Action::Reduce(center.production),
                            )?;
                        }
                    }
                    Some(&next) => {
                        let target = *state.transitions.get(&next).ok_or_else(|| {
                            grammar_error(format!(
                                "state {} has no transition on '{}'",
                                id,
                                grammar.symbol_name(next)
                            ))
                        })?;
                        if grammar.is_terminal(next) {
                            table.register_action(grammar, id, next, Action::Shift(target))?;
                        } else {
                            table.register_goto(grammar, id, next, target)?;
                        }
                    }
                }
            }
        }

        tracing::debug!(
            actions = table.action.len(),
            gotos = table.goto.len(),
            "built parse table"
        );
        Ok(table)
    }

    fn register_action<V>(
        &mut self,
        grammar: &Grammar<V>,
        state: StateId,
        symbol: SymbolId,
        action: Action,
    ) -> CoolResult<()> {
        match self.action.get(&(state, symbol)) {
            Some(existing) if *existing != action => {
                let kind = match (existing, action) {
                    (Action::Reduce(_), Action::Reduce(_)) => ConflictKind::ReduceReduce,
                    _ => ConflictKind::ShiftReduce,
                };
                Err(CoolError::Conflict {
                    kind,
                    state,
                    symbol: grammar.symbol_name(symbol).to_string(),
                    existing: describe(grammar, *existing),
                    incoming: describe(grammar, action),
                })
            }
            _ => {
                self.action.insert((state, symbol), action);
                Ok(())
            }
        }
    }

    fn register_goto<V>(
        &mut self,
        grammar: &Grammar<V>,
        state: StateId,
        symbol: SymbolId,
        target: StateId,
    ) -> CoolResult<()> {
        match self.goto.get(&(state, symbol)) {
            Some(&existing) if existing != target => Err(CoolError::Conflict {
                kind: ConflictKind::Goto,
                state,
                symbol: grammar.symbol_name(symbol).to_string(),
                existing: existing.to_string(),
                incoming: target.to_string(),
            }),
            _ => {
                self.goto.insert((state, symbol), target);
                Ok(())
            }
        }
    }

    pub fn action(&self, state: StateId, terminal: SymbolId) -> Option<Action> {
        self.action.get(&(state, terminal)).copied()
    }

    pub fn goto(&self, state: StateId, non_terminal: SymbolId) -> Option<StateId> {
        self.goto.get(&(state, non_terminal)).copied()
    }

    pub fn state_count(&self) -> usize {
        self.state_count
    }

    /// 某状态下可接受的终结符，用于报错
    pub fn expected(&self, state: StateId) -> Vec<SymbolId> {
        let mut expected: Vec<SymbolId> = self
            .action
            .keys()
            .filter(|(s, _)| *s == state)
            .map(|(_, symbol)| *symbol)
            .collect();
        expected.sort_unstable();
        expected
    }
}

fn describe<V>(grammar: &Grammar<V>, action: Action) -> String {
    match action {
        Action::Reduce(production) => format!("REDUCE {}", grammar.display_production(production)),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// E → E + T | T ; T → int | ( E )
    fn arithmetic() -> Grammar<()> {
        let mut g = Grammar::new();
        let [e, t] = g.non_terminals("E T");
        let [plus, int, open, close] = g.terminals("+ int ( )");
        g.production(e, &[e, plus, t], None);
        g.production(e, &[t], None);
        g.production(t, &[int], None);
        g.production(t, &[open, e, close], None);
        g.set_start(e);
        g.augment().unwrap()
    }

    #[test]
    fn test_closure_is_fixed_point() {
        let g = arithmetic();
        let firsts = Firsts::compute(&g);
        let start = g.productions_of(g.start().unwrap())[0];
        let mut kernel = ItemSet::new();
        kernel.insert(Center::new(start, 0), &BTreeSet::from([g.eof()]));

        let once = closure(&g, &firsts, &kernel);
        let twice = closure(&g, &firsts, &once);
        assert_eq!(once, twice);
        // S' → ·E, E → ·E + T, E → ·T, T → ·int, T → ·( E )
        assert_eq!(once.len(), 5);
    }

    #[test]
    fn test_closure_merges_lookaheads_by_center() {
        let g = arithmetic();
        let firsts = Firsts::compute(&g);
        let start = g.productions_of(g.start().unwrap())[0];
        let mut kernel = ItemSet::new();
        kernel.insert(Center::new(start, 0), &BTreeSet::from([g.eof()]));
        let items = closure(&g, &firsts, &kernel);

        let plus = g.lookup("+").unwrap();
        let e = g.lookup("E").unwrap();
        let left_recursive = g.productions_of(e)[0];
        let lookaheads = items.lookaheads(&Center::new(left_recursive, 0)).unwrap();
        assert_eq!(lookaheads, &BTreeSet::from([g.eof(), plus]));
        assert!(items.iter().all(|(_, las)| !las.is_empty()));
    }

    #[test]
    fn test_goto_advances_dot() {
        let g = arithmetic();
        let firsts = Firsts::compute(&g);
        let automaton = Automaton::build(&g, &firsts).unwrap();
        let int = g.lookup("int").unwrap();
        let target = automaton.states[0].transitions[&int];
        let state = &automaton.states[target];
        assert_eq!(state.kernel.len(), 1);
        assert!(state.kernel.iter().all(|(center, _)| center.dot == 1));
        assert_eq!(goto(&g, &firsts, &automaton.states[0].items, int), state.items);
    }

    #[test]
    fn test_table_is_deterministic() {
        let g = arithmetic();
        let firsts = Firsts::compute(&g);
        let automaton = Automaton::build(&g, &firsts).unwrap();
        let table = ParseTable::build(&g, &automaton).unwrap();
        assert_eq!(table.state_count(), automaton.len());
        assert_eq!(table.action(0, g.lookup("+").unwrap()), None);
        assert!(matches!(table.action(0, g.lookup("int").unwrap()), Some(Action::Shift(_))));
    }

    #[test]
    fn test_ambiguous_grammar_is_rejected() {
        // E → E + E | int
        let mut g: Grammar<()> = Grammar::new();
        let [e] = g.non_terminals("E");
        let [plus, int] = g.terminals("+ int");
        g.production(e, &[e, plus, e], None);
        g.production(e, &[int], None);
        g.set_start(e);
        let g = g.augment().unwrap();
        let firsts = Firsts::compute(&g);
        let automaton = Automaton::build(&g, &firsts).unwrap();

        let err = ParseTable::build(&g, &automaton).unwrap_err();
        assert!(matches!(
            err,
            CoolError::Conflict { kind: ConflictKind::ShiftReduce, .. }
        ));
    }

    #[test]
    fn test_reduce_reduce_conflict() {
        // S → A | B ; A → x ; B → x
        let mut g: Grammar<()> = Grammar::new();
        let [s, a, b] = g.non_terminals("S A B");
        let [x] = g.terminals("x");
        g.production(s, &[a], None);
        g.production(s, &[b], None);
        g.production(a, &[x], None);
        g.production(b, &[x], None);
        g.set_start(s);
        let g = g.augment().unwrap();
        let firsts = Firsts::compute(&g);
        let automaton = Automaton::build(&g, &firsts).unwrap();

        let err = ParseTable::build(&g, &automaton).unwrap_err();
        assert!(matches!(
            err,
            CoolError::Conflict { kind: ConflictKind::ReduceReduce, .. }
        ));
    }

    #[test]
    fn test_unaugmented_grammar_is_rejected() {
        let mut g: Grammar<()> = Grammar::new();
        let [e] = g.non_terminals("E");
        let [int] = g.terminals("int");
        g.production(e, &[int], None);
        g.production(e, &[int, int], None);
        g.set_start(e);
        let firsts = Firsts::compute(&g);
        assert!(matches!(Automaton::build(&g, &firsts), Err(CoolError::Grammar(_))));
    }
}
