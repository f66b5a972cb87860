pub mod duplicates;
pub mod health;
pub mod merge;
