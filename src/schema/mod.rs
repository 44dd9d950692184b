pub mod content;
pub mod save;
pub mod value;
