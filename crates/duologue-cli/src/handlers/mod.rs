pub mod branch;
pub mod import;
pub mod run;
pub mod status;
pub mod stop;
pub mod transcript;
