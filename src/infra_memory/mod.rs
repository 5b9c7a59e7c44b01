mod identity_repo_memory;

pub use identity_repo_memory::*;
