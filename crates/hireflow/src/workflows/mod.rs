pub mod billing;
pub mod domain;
pub mod matching;
pub mod pipeline;
