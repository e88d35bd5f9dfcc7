pub mod adapter;
pub mod bus;
pub mod core;
pub mod settings;
pub mod supervisor;
