pub mod icons;
pub mod report;
pub mod run_progress;

pub use run_progress::{RunUI, UiMode};
