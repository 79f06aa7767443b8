pub mod employee;
pub mod expense;
pub mod policy;
