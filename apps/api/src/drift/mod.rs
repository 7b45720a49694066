// Embedding drift analysis over a project's prompt history.
// Pure computation: no I/O, no shared state. Handlers load the history,
// call `annotate_history`, and hand the result to the views.

pub mod analyzer;
pub mod view;

pub use analyzer::{
    annotate_history, Deviation, DriftError, DriftLimits, DriftReport, PairWarning, PromptVector,
};
