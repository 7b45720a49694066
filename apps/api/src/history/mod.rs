// Projects, prompt history and prompt submission.
// All provider calls go through `state.llm`; no direct HTTP calls here.

pub mod handlers;
pub mod service;
pub mod store;
