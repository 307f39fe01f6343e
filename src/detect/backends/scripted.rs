use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::detect::backend::InferenceBackend;
use crate::detect::raw::RawOutput;
use crate::frame::InferenceView;

/// Backend that replays canned outputs, one per inference call.
///
/// Ignores pixels entirely. Fails once the script runs out, unless
/// `repeat_last` was requested.
pub struct ScriptedBackend {
    script: VecDeque<RawOutput>,
    repeat_last: bool,
    last: Option<RawOutput>,
    fail_at: Option<(usize, String)>,
    calls: usize,
    loads: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(outputs: impl IntoIterator<Item = RawOutput>) -> Self {
        Self {
            script: outputs.into_iter().collect(),
            repeat_last: false,
            last: None,
            fail_at: None,
            calls: 0,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Keep returning the final output after the script is exhausted.
    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Fail the inference call with zero-based index `call`.
    pub fn failing_at(mut self, call: usize, message: impl Into<String>) -> Self {
        self.fail_at = Some((call, message.into()));
        self
    }

    /// Shared counter of `load` calls, readable after the backend is boxed.
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }
}

impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn load(&mut self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn run_inference(&mut self, _view: InferenceView<'_>) -> Result<RawOutput> {
        let call = self.calls;
        self.calls += 1;
        if let Some((fail_call, message)) = &self.fail_at {
            if *fail_call == call {
                return Err(anyhow!("{}", message));
            }
        }
        match self.script.pop_front() {
            Some(output) => {
                if self.repeat_last {
                    self.last = Some(output.clone());
                }
                Ok(output)
            }
            None => self
                .last
                .clone()
                .ok_or_else(|| anyhow!("script exhausted after {} call(s)", call)),
        }
    }
}
