pub mod bank;
pub mod profile;
pub mod run_record;
