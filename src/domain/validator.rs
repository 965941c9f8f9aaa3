//! Graph readiness classification.
//!
//! Every execution node is walked backward through its logic chain. The same
//! walk produces the rule IR, so the compiler and the validator can never
//! disagree about which nodes are ready.
//!
//! Incompleteness is the normal state of a graph being edited and is reported,
//! never raised as an error.

use crate::domain::graph::{EdgeId, GraphSnapshot};
use crate::domain::node::{IndicatorType, LogicOperator, Node, NodeData, NodeId, OrderType, Side};
use crate::domain::rule::{Condition, Connective, Operand, RuleLine};
use std::collections::{HashMap, HashSet};
use std::fmt;

pub const DEFAULT_MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Maximum nesting of logic nodes below an execution node.
    pub max_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncompleteReason {
    NoInboundLogic,
    LogicNodeMissingOperands,
    UnknownIndicatorType,
    UnknownLogicOperator,
    MissingRequiredAttribute,
    UnsupportedOperand,
    OperatorArity,
    CycleDetected,
    TooDeep,
}

impl fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IncompleteReason::NoInboundLogic => "no inbound logic node",
            IncompleteReason::LogicNodeMissingOperands => "logic node has no operands",
            IncompleteReason::UnknownIndicatorType => "unknown indicator type",
            IncompleteReason::UnknownLogicOperator => "unknown logic operator",
            IncompleteReason::MissingRequiredAttribute => "missing required attribute",
            IncompleteReason::UnsupportedOperand => "execution node used as an operand",
            IncompleteReason::OperatorArity => "NOT takes exactly one operand",
            IncompleteReason::CycleDetected => "cycle detected",
            IncompleteReason::TooDeep => "logic nested too deeply",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Incomplete(IncompleteReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStatus {
    pub execution: NodeId,
    pub readiness: Readiness,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationReport {
    /// One entry per execution node, in creation order.
    pub entries: Vec<ExecutionStatus>,
    /// Edges whose source or target is not in the graph.
    pub dangling_edges: Vec<EdgeId>,
}

impl ValidationReport {
    pub fn readiness(&self, execution: &NodeId) -> Option<Readiness> {
        self.entries
            .iter()
            .find(|s| &s.execution == execution)
            .map(|s| s.readiness)
    }

    pub fn ready_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|s| s.readiness == Readiness::Ready)
            .count()
    }

    /// At least one execution node compiles and the graph is structurally sound.
    pub fn is_runnable(&self) -> bool {
        self.dangling_edges.is_empty() && self.ready_count() > 0
    }

    pub fn incomplete(&self) -> impl Iterator<Item = (&NodeId, IncompleteReason)> {
        self.entries.iter().filter_map(|s| match s.readiness {
            Readiness::Incomplete(reason) => Some((&s.execution, reason)),
            Readiness::Ready => None,
        })
    }
}

pub fn validate(snapshot: &GraphSnapshot, options: &CompileOptions) -> ValidationReport {
    let dangling_edges = snapshot
        .edges()
        .iter()
        .filter(|e| snapshot.node(&e.source).is_none() || snapshot.node(&e.target).is_none())
        .map(|e| e.id.clone())
        .collect();

    let mut resolver = Resolver::new(snapshot, options);
    let entries = snapshot
        .execution_nodes()
        .map(|exec| ExecutionStatus {
            execution: exec.id().clone(),
            readiness: match resolver.resolve_execution(exec) {
                Ok(_) => Readiness::Ready,
                Err(reason) => Readiness::Incomplete(reason),
            },
        })
        .collect();

    ValidationReport {
        entries,
        dangling_edges,
    }
}

#[derive(Debug, Clone)]
struct Resolved {
    condition: Condition,
    /// Logic levels in this subtree, counting the node itself.
    height: usize,
}

/// Walks logic chains backward from execution nodes.
///
/// Cycles are searched for first, without a depth limit and without
/// recursion, so the depth cap only bounds rendering. Finished logic subtrees
/// are memoised, so a subgraph shared by several operands or execution nodes
/// is only walked once. Depth cut-offs are not memoised because they depend
/// on where the subtree was entered.
pub(crate) struct Resolver<'a> {
    snapshot: &'a GraphSnapshot,
    max_depth: usize,
    memo: HashMap<NodeId, Result<Resolved, IncompleteReason>>,
    /// Logic nodes whose whole upstream logic subgraph is cycle free.
    acyclic: HashSet<NodeId>,
    /// Logic nodes known to reach a cycle.
    cyclic: HashSet<NodeId>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(snapshot: &'a GraphSnapshot, options: &CompileOptions) -> Self {
        Self {
            snapshot,
            max_depth: options.max_depth,
            memo: HashMap::new(),
            acyclic: HashSet::new(),
            cyclic: HashSet::new(),
        }
    }

    pub(crate) fn resolve_execution(&mut self, exec: &Node) -> Result<RuleLine, IncompleteReason> {
        let NodeData::Execution { order_type, side } = exec.data() else {
            return Err(IncompleteReason::UnsupportedOperand);
        };

        let logic = self
            .snapshot
            .inbound(exec.id())
            .filter_map(|e| self.snapshot.node(&e.source))
            .find(|n| matches!(n.data(), NodeData::Logic { .. }))
            .ok_or(IncompleteReason::NoInboundLogic)?;

        let action = match (side, order_type) {
            (Some(side), _) => *side,
            (None, Some(OrderType::Market)) => Side::Buy,
            (None, Some(OrderType::Limit)) => Side::Sell,
            (None, None) => return Err(IncompleteReason::MissingRequiredAttribute),
        };

        let logic_id = logic.id().clone();
        if self.reaches_cycle(&logic_id) {
            return Err(IncompleteReason::CycleDetected);
        }
        let resolved = self.resolve_logic(&logic_id, 1)?;
        Ok(RuleLine {
            condition: resolved.condition,
            action,
        })
    }

    /// Iterative depth-first search over the logic nodes upstream of `root`.
    fn reaches_cycle(&mut self, root: &NodeId) -> bool {
        if self.acyclic.contains(root) {
            return false;
        }
        if self.cyclic.contains(root) {
            return true;
        }

        let snapshot = self.snapshot;
        let mut on_stack: HashSet<NodeId> = HashSet::from([root.clone()]);
        let mut stack = vec![(root.clone(), logic_sources(snapshot, root))];
        loop {
            let Some((_, pending)) = stack.last_mut() else {
                return false;
            };
            match pending.pop() {
                Some(next) => {
                    if self.acyclic.contains(&next) {
                        continue;
                    }
                    if on_stack.contains(&next) || self.cyclic.contains(&next) {
                        // Everything still on the stack leads into the cycle.
                        self.cyclic.extend(stack.into_iter().map(|(id, _)| id));
                        return true;
                    }
                    let sources = logic_sources(snapshot, &next);
                    on_stack.insert(next.clone());
                    stack.push((next, sources));
                }
                None => {
                    if let Some((done, _)) = stack.pop() {
                        on_stack.remove(&done);
                        self.acyclic.insert(done);
                    }
                }
            }
        }
    }

    fn resolve_logic(&mut self, id: &NodeId, depth: usize) -> Result<Resolved, IncompleteReason> {
        if let Some(hit) = self.memo.get(id) {
            return match hit {
                Ok(r) if depth - 1 + r.height > self.max_depth => Err(IncompleteReason::TooDeep),
                other => other.clone(),
            };
        }
        if depth > self.max_depth {
            return Err(IncompleteReason::TooDeep);
        }

        let result = self.resolve_logic_node(id, depth);

        if !matches!(result, Err(IncompleteReason::TooDeep)) {
            self.memo.insert(id.clone(), result.clone());
        }
        result
    }

    fn resolve_logic_node(&mut self, id: &NodeId, depth: usize) -> Result<Resolved, IncompleteReason> {
        let snapshot = self.snapshot;
        let node = snapshot
            .node(id)
            .ok_or(IncompleteReason::UnsupportedOperand)?;
        let NodeData::Logic { operator } = node.data() else {
            return Err(IncompleteReason::UnsupportedOperand);
        };
        let operator = operator
            .as_ref()
            .ok_or(IncompleteReason::MissingRequiredAttribute)?;
        let connective = connective(operator);
        if connective.is_none() && *operator != LogicOperator::Not {
            return Err(IncompleteReason::UnknownLogicOperator);
        }

        // Duplicate edges from the same source count once.
        let mut seen = HashSet::new();
        let sources: Vec<&Node> = snapshot
            .inbound(id)
            .filter_map(|e| snapshot.node(&e.source))
            .filter(|n| seen.insert(n.id().clone()))
            .collect();

        if sources.is_empty() {
            return Err(IncompleteReason::LogicNodeMissingOperands);
        }
        if *operator == LogicOperator::Not && sources.len() != 1 {
            return Err(IncompleteReason::OperatorArity);
        }

        let mut operands = Vec::with_capacity(sources.len());
        let mut height = 1;
        for source in sources {
            match source.data() {
                NodeData::Logic { .. } => {
                    let nested = self.resolve_logic(source.id(), depth + 1)?;
                    height = height.max(nested.height + 1);
                    operands.push(nested.condition);
                }
                _ => operands.push(Condition::Operand(leaf_operand(source)?)),
            }
        }

        let condition = match connective {
            Some(c) => Condition::compose(c, operands),
            None => Condition::negate(operands.remove(0)),
        };
        Ok(Resolved { condition, height })
    }
}

/// Ids of the logic nodes feeding `id`.
fn logic_sources(snapshot: &GraphSnapshot, id: &NodeId) -> Vec<NodeId> {
    snapshot
        .inbound(id)
        .filter_map(|e| snapshot.node(&e.source))
        .filter(|n| matches!(n.data(), NodeData::Logic { .. }))
        .map(|n| n.id().clone())
        .collect()
}

/// Infix connective of an operator; `None` for NOT and unknown operators.
fn connective(operator: &LogicOperator) -> Option<Connective> {
    match operator {
        LogicOperator::And => Some(Connective::And),
        LogicOperator::Or => Some(Connective::Or),
        LogicOperator::Xor => Some(Connective::Xor),
        LogicOperator::Nand => Some(Connective::Nand),
        LogicOperator::Nor => Some(Connective::Nor),
        LogicOperator::Xnor => Some(Connective::Xnor),
        LogicOperator::Gt => Some(Connective::Gt),
        LogicOperator::Lt => Some(Connective::Lt),
        LogicOperator::Eq => Some(Connective::Eq),
        LogicOperator::Neq => Some(Connective::Neq),
        LogicOperator::Not | LogicOperator::Unknown(_) => None,
    }
}

fn leaf_operand(node: &Node) -> Result<Operand, IncompleteReason> {
    match node.data() {
        NodeData::Indicator {
            indicator_type,
            period,
        } => {
            let indicator_type = indicator_type
                .as_ref()
                .ok_or(IncompleteReason::MissingRequiredAttribute)?;
            if let IndicatorType::Unknown(_) = indicator_type {
                return Err(IncompleteReason::UnknownIndicatorType);
            }
            let period = period.ok_or(IncompleteReason::MissingRequiredAttribute)?;
            Ok(Operand::Indicator {
                indicator_type: indicator_type.clone(),
                period,
            })
        }
        NodeData::Asset { symbol, label } => symbol
            .as_ref()
            .or(label.as_ref())
            .map(|text| Operand::Asset(text.clone()))
            .ok_or(IncompleteReason::MissingRequiredAttribute),
        NodeData::Risk { max_drawdown_pct } => max_drawdown_pct
            .map(Operand::MaxDrawdown)
            .ok_or(IncompleteReason::MissingRequiredAttribute),
        NodeData::Execution { .. } => Err(IncompleteReason::UnsupportedOperand),
        NodeData::Logic { .. } => Err(IncompleteReason::UnsupportedOperand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{Edge, StrategyGraph};
    use crate::domain::node::{AttrValue, NodeKind, INDICATOR_TYPE, LOGIC_OPERATOR, PERIOD, SYMBOL};

    fn none() -> Vec<(&'static str, AttrValue)> {
        Vec::new()
    }

    fn logic(g: &mut StrategyGraph, op: &str) -> NodeId {
        g.add_node(NodeKind::Logic, [(LOGIC_OPERATOR, AttrValue::from(op))])
            .unwrap()
    }

    fn indicator(g: &mut StrategyGraph, t: &str, period: u32) -> NodeId {
        g.add_node(
            NodeKind::Indicator,
            [(INDICATOR_TYPE, AttrValue::from(t)), (PERIOD, AttrValue::from(period))],
        )
        .unwrap()
    }

    fn report(g: &StrategyGraph) -> ValidationReport {
        validate(&g.snapshot(), &CompileOptions::default())
    }

    #[test]
    fn execution_without_edges_is_incomplete() {
        let mut g = StrategyGraph::new();
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        let r = report(&g);
        assert_eq!(
            r.readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::NoInboundLogic))
        );
        assert!(!r.is_runnable());
    }

    #[test]
    fn execution_fed_by_non_logic_is_incomplete() {
        let mut g = StrategyGraph::new();
        let i = indicator(&mut g, "RSI", 14);
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&i, &x).unwrap();
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::NoInboundLogic))
        );
    }

    #[test]
    fn logic_without_operands_is_incomplete() {
        let mut g = StrategyGraph::new();
        let l = logic(&mut g, "gt");
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&l, &x).unwrap();
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::LogicNodeMissingOperands))
        );
    }

    #[test]
    fn ready_chain() {
        let mut g = StrategyGraph::new();
        let a = indicator(&mut g, "EMA", 9);
        let b = indicator(&mut g, "EMA", 21);
        let l = logic(&mut g, "gt");
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&a, &l).unwrap();
        g.add_edge(&b, &l).unwrap();
        g.add_edge(&l, &x).unwrap();
        let r = report(&g);
        assert_eq!(r.readiness(&x), Some(Readiness::Ready));
        assert!(r.is_runnable());
    }

    #[test]
    fn unknown_indicator_reported() {
        let mut g = StrategyGraph::new();
        let a = indicator(&mut g, "ichimoku", 9);
        let l = logic(&mut g, "gt");
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&a, &l).unwrap();
        g.add_edge(&l, &x).unwrap();
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::UnknownIndicatorType))
        );
    }

    #[test]
    fn unknown_operator_reported() {
        let mut g = StrategyGraph::new();
        let a = indicator(&mut g, "RSI", 14);
        let l = logic(&mut g, "else");
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&a, &l).unwrap();
        g.add_edge(&l, &x).unwrap();
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::UnknownLogicOperator))
        );
    }

    #[test]
    fn missing_attribute_reported() {
        let mut g = StrategyGraph::new();
        let a = g.add_node(NodeKind::Asset, none()).unwrap();
        let l = logic(&mut g, "gt");
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&a, &l).unwrap();
        g.add_edge(&l, &x).unwrap();
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::MissingRequiredAttribute))
        );
        g.update_node_attribute(&a, SYMBOL, "BTC-USDT".into()).unwrap();
        assert_eq!(report(&g).readiness(&x), Some(Readiness::Ready));
    }

    #[test]
    fn not_requires_single_operand() {
        let mut g = StrategyGraph::new();
        let a = indicator(&mut g, "RSI", 14);
        let b = indicator(&mut g, "RSI", 7);
        let l = logic(&mut g, "not");
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&a, &l).unwrap();
        g.add_edge(&b, &l).unwrap();
        g.add_edge(&l, &x).unwrap();
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::OperatorArity))
        );
    }

    #[test]
    fn execution_as_operand_is_unsupported() {
        let mut g = StrategyGraph::new();
        let other = g.add_node(NodeKind::Execution, none()).unwrap();
        let l = logic(&mut g, "and");
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&other, &l).unwrap();
        g.add_edge(&l, &x).unwrap();
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::UnsupportedOperand))
        );
    }

    #[test]
    fn self_loop_is_cycle() {
        let mut g = StrategyGraph::new();
        let l = logic(&mut g, "and");
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&l, &l).unwrap();
        g.add_edge(&l, &x).unwrap();
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::CycleDetected))
        );
    }

    #[test]
    fn two_node_cycle() {
        let mut g = StrategyGraph::new();
        let a = indicator(&mut g, "RSI", 14);
        let l1 = logic(&mut g, "and");
        let l2 = logic(&mut g, "or");
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&a, &l1).unwrap();
        g.add_edge(&l2, &l1).unwrap();
        g.add_edge(&l1, &l2).unwrap();
        g.add_edge(&l1, &x).unwrap();
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::CycleDetected))
        );
    }

    #[test]
    fn shared_subgraph_is_not_a_cycle() {
        let mut g = StrategyGraph::new();
        let a = indicator(&mut g, "RSI", 14);
        let shared = logic(&mut g, "not");
        let left = logic(&mut g, "and");
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&a, &shared).unwrap();
        g.add_edge(&shared, &left).unwrap();
        let right = logic(&mut g, "or");
        g.add_edge(&shared, &right).unwrap();
        g.add_edge(&right, &left).unwrap();
        g.add_edge(&left, &x).unwrap();
        assert_eq!(report(&g).readiness(&x), Some(Readiness::Ready));
    }

    fn ring(len: usize) -> (StrategyGraph, NodeId) {
        let mut g = StrategyGraph::new();
        let nodes: Vec<NodeId> = (0..len).map(|_| logic(&mut g, "and")).collect();
        for i in 0..len {
            g.add_edge(&nodes[(i + 1) % len], &nodes[i]).unwrap();
        }
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&nodes[0], &x).unwrap();
        (g, x)
    }

    #[test]
    fn cycle_longer_than_depth_limit_is_still_a_cycle() {
        let (g, x) = ring(DEFAULT_MAX_DEPTH + 8);
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::CycleDetected))
        );

        let (g, x) = ring(300);
        let widest = CompileOptions { max_depth: 256 };
        assert_eq!(
            validate(&g.snapshot(), &widest).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::CycleDetected))
        );
    }

    #[test]
    fn executions_sharing_a_cycle_all_report_it() {
        let (mut g, x) = ring(5);
        let feeder = g
            .snapshot()
            .inbound(&x)
            .next()
            .map(|e| e.source.clone())
            .unwrap();
        let y = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&feeder, &y).unwrap();

        let r = report(&g);
        for exec in [&x, &y] {
            assert_eq!(
                r.readiness(exec),
                Some(Readiness::Incomplete(IncompleteReason::CycleDetected))
            );
        }
    }

    fn chain(depth: usize) -> (StrategyGraph, NodeId) {
        let mut g = StrategyGraph::new();
        let leaf = indicator(&mut g, "RSI", 14);
        let mut below = leaf;
        for _ in 0..depth {
            let l = logic(&mut g, "not");
            g.add_edge(&below, &l).unwrap();
            below = l;
        }
        let x = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&below, &x).unwrap();
        (g, x)
    }

    #[test]
    fn depth_limit() {
        let (g, x) = chain(DEFAULT_MAX_DEPTH);
        assert_eq!(report(&g).readiness(&x), Some(Readiness::Ready));

        let (g, x) = chain(DEFAULT_MAX_DEPTH + 1);
        assert_eq!(
            report(&g).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::TooDeep))
        );

        let (g, x) = chain(5);
        let tight = CompileOptions { max_depth: 4 };
        assert_eq!(
            validate(&g.snapshot(), &tight).readiness(&x),
            Some(Readiness::Incomplete(IncompleteReason::TooDeep))
        );
    }

    #[test]
    fn memoised_subtree_respects_depth_from_each_entry() {
        // One deep chain used directly by one execution node and through an
        // extra wrapper by another; only the wrapped entry exceeds the limit.
        let mut g = StrategyGraph::new();
        let leaf = indicator(&mut g, "RSI", 14);
        let mut top = leaf;
        for _ in 0..4 {
            let l = logic(&mut g, "not");
            g.add_edge(&top, &l).unwrap();
            top = l;
        }
        let direct = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&top, &direct).unwrap();
        let wrapper = logic(&mut g, "not");
        g.add_edge(&top, &wrapper).unwrap();
        let wrapped = g.add_node(NodeKind::Execution, none()).unwrap();
        g.add_edge(&wrapper, &wrapped).unwrap();

        let r = validate(&g.snapshot(), &CompileOptions { max_depth: 4 });
        assert_eq!(r.readiness(&direct), Some(Readiness::Ready));
        assert_eq!(
            r.readiness(&wrapped),
            Some(Readiness::Incomplete(IncompleteReason::TooDeep))
        );
    }

    #[test]
    fn report_lists_dangling_edges() {
        let node = Node::new(NodeId::new("x"), NodeData::with_defaults(NodeKind::Execution));
        let snap = GraphSnapshot::assemble(
            vec![node],
            vec![Edge {
                id: EdgeId::new("e1"),
                source: NodeId::new("gone"),
                target: NodeId::new("x"),
            }],
        );
        let r = validate(&snap, &CompileOptions::default());
        assert_eq!(r.dangling_edges, vec![EdgeId::new("e1")]);
        assert_eq!(
            r.readiness(&NodeId::new("x")),
            Some(Readiness::Incomplete(IncompleteReason::NoInboundLogic))
        );
    }

    #[test]
    fn validation_does_not_mutate() {
        let (g, _) = chain(3);
        let before = g.snapshot();
        let _ = validate(&before, &CompileOptions::default());
        assert_eq!(before.edges(), g.snapshot().edges());
    }
}
