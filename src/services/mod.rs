pub mod appointments;
pub mod call_history;
pub mod doctors;
pub mod notifier;
pub mod pdf_import;
pub mod queue;
pub mod settings;
pub mod tts;
