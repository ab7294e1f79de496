pub mod import;
pub mod record;
pub mod report;
pub mod status;
