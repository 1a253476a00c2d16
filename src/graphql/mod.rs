pub mod document;
pub mod parser;
