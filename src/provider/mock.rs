//! Scripted provider for orchestrator and pipeline tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{PollResponse, ProviderClient, ProviderError, ProviderKind};
use crate::request::GenerationRequest;

#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub submits: u32,
    pub polls: u32,
    pub fetches: u32,
}

/// Replays queued answers; an exhausted poll queue keeps answering "running".
pub(crate) struct ScriptedProvider {
    kind: ProviderKind,
    submit: Mutex<VecDeque<Result<String, ProviderError>>>,
    polls: Mutex<VecDeque<Result<PollResponse, ProviderError>>>,
    fetches: Mutex<VecDeque<Result<Vec<u8>, ProviderError>>>,
    pub calls: Mutex<Calls>,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            submit: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
            fetches: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Calls::default()),
        }
    }

    /// Submit → "remote-1", poll → succeeded, fetch → `bytes`.
    pub fn succeeding(kind: ProviderKind, bytes: &[u8]) -> Self {
        Self::new(kind)
            .on_submit(Ok("remote-1".into()))
            .on_poll(Ok(PollResponse::succeeded("https://cdn/result")))
            .on_fetch(Ok(bytes.to_vec()))
    }

    pub fn on_submit(self, answer: Result<String, ProviderError>) -> Self {
        self.submit.lock().unwrap().push_back(answer);
        self
    }

    pub fn on_poll(self, answer: Result<PollResponse, ProviderError>) -> Self {
        self.polls.lock().unwrap().push_back(answer);
        self
    }

    pub fn on_fetch(self, answer: Result<Vec<u8>, ProviderError>) -> Self {
        self.fetches.lock().unwrap().push_back(answer);
        self
    }

    pub fn submits(&self) -> u32 {
        self.calls.lock().unwrap().submits
    }

    pub fn polls(&self) -> u32 {
        self.calls.lock().unwrap().polls
    }

    pub fn fetches(&self) -> u32 {
        self.calls.lock().unwrap().fetches
    }
}

impl ProviderClient for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn submit(&self, _request: &GenerationRequest) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().submits += 1;
        self.submit
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("remote-1".into()))
    }

    async fn poll(&self, _job_id: &str) -> Result<PollResponse, ProviderError> {
        self.calls.lock().unwrap().polls += 1;
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PollResponse::running()))
    }

    async fn fetch(&self, _result_url: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls.lock().unwrap().fetches += 1;
        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Integrity("nothing scripted".into())))
    }
}
