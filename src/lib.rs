pub mod atomicity;
pub mod capability;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod dag;
pub mod errors;
pub mod init;
pub mod ledger;
pub mod lifecycle;
pub mod logging;
pub mod orchestrator;
pub mod ui;
pub mod weft_config;
pub mod work_item;
