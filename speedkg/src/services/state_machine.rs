use crate::models::WorkflowStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Illegal workflow transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: WorkflowStage,
    pub to: WorkflowStage,
}

/// Stages reachable from `from`. `Error` is reachable from every
/// non-terminal stage; terminal stages have no successors.
pub fn allowed_transitions(from: WorkflowStage) -> Vec<WorkflowStage> {
    use WorkflowStage::*;
    match from {
        ParseIntent => vec![GenerateQuery, Error],
        GenerateQuery => vec![Validate, Error],
        Validate => vec![ExecuteQuery, Error],
        ExecuteQuery => vec![ExpandSubgraph, Error],
        ExpandSubgraph => vec![Serialize, Error],
        Serialize => vec![Reason, Error],
        Reason => vec![Complete, Error],
        Complete => vec![],
        Error => vec![],
    }
}

pub fn validate_transition(
    from: WorkflowStage,
    to: WorkflowStage,
) -> Result<(), IllegalTransition> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}
