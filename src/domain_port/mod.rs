mod clock;
mod identity_repo;

pub use clock::*;
pub use identity_repo::*;
