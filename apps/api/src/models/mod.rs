pub mod model;
pub mod project;
pub mod prompt;
