pub mod search;
pub mod validation;
