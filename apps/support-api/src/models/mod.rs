pub mod balance;
pub mod support;
pub mod user;
