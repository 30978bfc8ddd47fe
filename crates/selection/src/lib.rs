pub mod controller;
pub mod render;
pub mod state;
pub mod trajectory;

pub use controller::*;
pub use render::*;
pub use state::*;
pub use trajectory::*;
