pub mod adapters;
pub mod check;
pub mod run;
pub mod status;
