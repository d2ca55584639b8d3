pub mod theme;
mod view;

pub use theme::styles;
pub use view::{Selection, draw};
