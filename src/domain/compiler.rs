//! Graph to rule-text compilation.
//!
//! Each execution node is compiled independently through the same resolver the
//! validator uses; nodes that are not ready are omitted from the output.

use crate::domain::error::StratflowError;
use crate::domain::graph::GraphSnapshot;
use crate::domain::rule::{CompiledRule, CompiledStrategy};
use crate::domain::validator::{ExecutionStatus, Readiness, Resolver, ValidationReport};
use tracing::{debug, info};

pub use crate::domain::validator::CompileOptions;

/// Compiled output together with the readiness of every execution node.
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    pub strategy: CompiledStrategy,
    pub report: ValidationReport,
}

/// Compiles every ready execution node, in creation order.
///
/// Fails only when the snapshot itself is unsound (an edge references a missing
/// node). Incomplete execution nodes are skipped, so an empty strategy is a
/// valid result.
pub fn compile(snapshot: &GraphSnapshot, options: &CompileOptions) -> Result<CompiledStrategy, StratflowError> {
    compile_with_report(snapshot, options).map(|c| c.strategy)
}

pub fn compile_with_report(
    snapshot: &GraphSnapshot,
    options: &CompileOptions,
) -> Result<Compilation, StratflowError> {
    snapshot.check_integrity()?;

    let mut resolver = Resolver::new(snapshot, options);
    let mut rules = Vec::new();
    let mut entries = Vec::new();

    for exec in snapshot.execution_nodes() {
        let readiness = match resolver.resolve_execution(exec) {
            Ok(rule) => {
                debug!(execution = %exec.id(), line = %rule, "rule compiled");
                rules.push(CompiledRule {
                    execution: exec.id().clone(),
                    rule,
                });
                Readiness::Ready
            }
            Err(reason) => {
                debug!(execution = %exec.id(), %reason, "execution node skipped");
                Readiness::Incomplete(reason)
            }
        };
        entries.push(ExecutionStatus {
            execution: exec.id().clone(),
            readiness,
        });
    }

    info!(
        compiled = rules.len(),
        executions = entries.len(),
        "strategy compiled"
    );

    Ok(Compilation {
        strategy: CompiledStrategy { rules },
        report: ValidationReport {
            entries,
            dangling_edges: Vec::new(),
        },
    })
}
