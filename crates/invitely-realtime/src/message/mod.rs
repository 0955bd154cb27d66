//! Message construction and validation helpers.

pub mod builder;
pub mod validator;
