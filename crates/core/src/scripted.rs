//! Scripted interpreter — canned structured responses for tests and
//! offline runs. Records every request it receives so assertions can
//! inspect the prompts the nodes actually built.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value;

use alfred_domain::error::{Error, Result};
use alfred_domain::interpreter::{Interpreter, InterpreterRequest};

#[derive(Default)]
pub struct ScriptedInterpreter {
    responses: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<InterpreterRequest>>,
}

impl ScriptedInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next structured response.
    pub fn push(&self, response: Value) {
        self.responses.lock().push_back(response);
    }

    pub fn with_responses(responses: impl IntoIterator<Item = Value>) -> Self {
        let s = Self::new();
        for r in responses {
            s.push(r);
        }
        s
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    /// Requests observed so far, in call order.
    pub fn requests(&self) -> Vec<InterpreterRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl Interpreter for ScriptedInterpreter {
    async fn call(&self, req: InterpreterRequest) -> Result<Value> {
        self.requests.lock().push(req);
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Interpreter("scripted interpreter exhausted".into()))
    }

    fn interpreter_id(&self) -> &str {
        "scripted"
    }
}
