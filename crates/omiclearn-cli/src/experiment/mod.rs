pub mod input;
pub mod load_data;
pub mod plot;
pub mod runner;
pub mod session;
pub mod summary;
