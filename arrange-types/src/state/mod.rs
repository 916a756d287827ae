pub mod effect;
pub mod presence;
pub mod project;
pub mod region;
pub mod track;

pub use effect::*;
pub use presence::*;
pub use project::*;
pub use region::*;
pub use track::*;
