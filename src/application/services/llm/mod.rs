//! LLM prompt construction and reply parsing

pub mod prompt_builder;
pub mod response_parser;
