//! Built-in item types

pub mod action;
pub mod directory;
pub mod file;
pub mod symlink;

pub use action::Action;
pub use directory::Directory;
pub use file::File;
pub use symlink::Symlink;
