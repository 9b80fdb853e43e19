//! Workflow transitions.
//!
//! A document's workflow schema is a set of directed edges between status
//! codes. Advancing is a three-step move: resolve the target status from
//! the outgoing edges, rewrite `wfStatus` in the payload, persist through
//! [`Document::save`] (which appends the history entry on the status
//! change).

use eatery_types::WorkflowStatusCode;

use crate::document::{Document, Entity};
use crate::error::DocumentError;
use crate::schema::WfTransfer;
use crate::Result;

/// How to choose the next status among the outgoing edges.
pub enum Transition<'a> {
    /// Follow the single outgoing edge; ambiguity is an error.
    Auto,
    /// Move to an explicit status; it must be a legal edge target.
    To(WorkflowStatusCode),
    /// Let the caller choose among the candidates. The choice is trusted:
    /// the selector receives only legal edges and must return the target of
    /// one of them.
    Pick(&'a dyn Fn(&[WfTransfer]) -> WorkflowStatusCode),
}

/// Resolve the target status for a transition given the outgoing edges of
/// the current state.
pub fn resolve_transition(
    table_name: &str,
    current: Option<WorkflowStatusCode>,
    candidates: &[WfTransfer],
    transition: &Transition<'_>,
) -> Result<WorkflowStatusCode> {
    let current_name = current.map(|s| s.as_str()).unwrap_or("none");
    match transition {
        Transition::To(target) => {
            if candidates.iter().any(|t| t.to == *target) {
                Ok(*target)
            } else {
                Err(DocumentError::WfSuspense(format!(
                    "Workflow of '{table_name}' has no transfer from '{current_name}' to '{}'",
                    target.as_str()
                )))
            }
        }
        Transition::Auto => match candidates {
            [single] => Ok(single.to),
            [] => Err(DocumentError::WfSuspense(format!(
                "Workflow of '{table_name}' has no transfers from '{current_name}'"
            ))),
            _ => Err(DocumentError::WfSuspense(format!(
                "Workflow of '{table_name}' has {} transfers from '{current_name}', \
                 target status must be picked explicitly",
                candidates.len()
            ))),
        },
        Transition::Pick(select) => {
            if candidates.is_empty() {
                Err(DocumentError::WfSuspense(format!(
                    "Workflow of '{table_name}' has no transfers from '{current_name}'"
                )))
            } else {
                Ok(select(candidates))
            }
        }
    }
}

impl<E: Entity> Document<E> {
    /// Advance the document's workflow and persist the result. `username`
    /// is mandatory: every transition must be attributable.
    pub async fn wf_next(
        &mut self,
        username: &str,
        transition: Transition<'_>,
    ) -> Result<E::Data> {
        if username.is_empty() {
            return Err(DocumentError::ParameterExpected(
                "Workflow transition requires a user name".to_string(),
            ));
        }
        let current = self.current_status()?;
        let wf = self.wf_schema_ref();
        let candidates = wf.transfers_from(current);
        let target = resolve_transition(self.table_name(), current, &candidates, &transition)?;
        self.set_status(target)?;
        self.save(Some(username)).await
    }

    /// Advance the workflow of one related record (addressed by table name
    /// and array index) and persist the whole document.
    pub async fn wf_related_next(
        &mut self,
        table_name: &str,
        index: usize,
        username: &str,
        transition: Transition<'_>,
    ) -> Result<E::Data> {
        if username.is_empty() {
            return Err(DocumentError::ParameterExpected(
                "Workflow transition requires a user name".to_string(),
            ));
        }
        let wf = self.wf_schema_ref().related_for(table_name).ok_or_else(|| {
            DocumentError::WfSuspense(format!(
                "Workflow of '{}' has no related workflow for '{table_name}'",
                self.table_name()
            ))
        })?;
        let current = self.related_status(table_name, index)?;
        let candidates = wf.transfers_from(current);
        let target = resolve_transition(table_name, current, &candidates, &transition)?;
        self.set_related_status(table_name, index, target)?;
        self.save(Some(username)).await
    }
}
