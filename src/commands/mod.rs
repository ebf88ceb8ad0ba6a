pub mod apply;
pub mod nodes;
