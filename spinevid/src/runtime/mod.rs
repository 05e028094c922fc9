mod animation;
mod animation_state;
mod constraint;
mod skeleton;

pub use animation::*;
pub use animation_state::*;
pub use constraint::*;
pub use skeleton::*;



#[cfg(all(test, feature = "json"))]
mod animation_tests;
