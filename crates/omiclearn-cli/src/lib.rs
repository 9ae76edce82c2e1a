pub mod experiment;
pub mod report;
pub mod util;
