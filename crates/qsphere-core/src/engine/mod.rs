pub mod cnlo;
pub mod config;
pub mod error;
pub mod flip;
pub mod geem;
pub mod milp;
pub mod order;
pub mod subset;
