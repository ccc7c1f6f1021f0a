pub mod photos;
pub mod recipes;
pub mod taxonomy;
pub mod users;

pub use photos::*;
pub use recipes::*;
pub use taxonomy::*;
pub use users::*;
