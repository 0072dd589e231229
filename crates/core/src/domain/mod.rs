pub mod document;
pub mod instruction;
pub mod message;
