pub mod health;
pub mod error;
pub mod presence;
pub mod simulation;
pub mod diagnostics;
pub mod messages;

pub use health::*;
pub use error::*;
pub use presence::*;
pub use simulation::*;
pub use diagnostics::*;
