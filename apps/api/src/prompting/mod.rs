// Prompt template handling: `{variable}` placeholders and the dedup hash
// used to recognise a re-submitted template + variables pair.

pub mod hash;
pub mod template;

pub use hash::{prompt_hash, stored_prompt_hash};
pub use template::{extract_variables, reconcile_variables, render_template, Variables};
