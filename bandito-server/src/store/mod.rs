//! Durable JSON documents: plugin slots, per-plugin button layouts and
//! prefabs, plus obfuscated settings values.

pub mod json_file;
pub mod layout;
pub mod secret;
pub mod slots;

pub use json_file::SaveOutcome;
pub use layout::LayoutStore;
pub use slots::SlotStore;
