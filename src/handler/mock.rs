//! Recording mock collaborator for tests
//!
//! Scripts responses per operation and records every invocation, so tests
//! can assert both outcomes and call counts (e.g. that dry runs invoke zero
//! collaborators).

use super::{HandlerInvocation, HandlerOutcome, StepHandler};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockStepHandler {
    responses: Arc<Mutex<HashMap<String, Vec<HandlerOutcome>>>>,
    call_history: Arc<Mutex<Vec<HandlerInvocation>>>,
    retriable: bool,
}

impl MockStepHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retriable() -> Self {
        Self {
            retriable: true,
            ..Self::default()
        }
    }

    /// Queue an outcome for an operation. Multiple outcomes for the same
    /// operation are consumed in order; the last one repeats.
    pub fn respond(&self, operation: &str, outcome: HandlerOutcome) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push(outcome);
        self
    }

    pub fn calls(&self) -> Vec<HandlerInvocation> {
        self.call_history.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_history.lock().unwrap().len()
    }

    pub fn calls_for(&self, operation: &str) -> usize {
        self.call_history
            .lock()
            .unwrap()
            .iter()
            .filter(|invocation| invocation.operation == operation)
            .count()
    }
}

#[async_trait]
impl StepHandler for MockStepHandler {
    fn retriable(&self) -> bool {
        self.retriable
    }

    async fn execute(&self, invocation: HandlerInvocation) -> HandlerOutcome {
        self.call_history.lock().unwrap().push(invocation.clone());

        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(&invocation.operation) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => HandlerOutcome::ok(format!("mock: {}", invocation.operation)),
        }
    }
}
