mod identity_repo_mysql;

pub use identity_repo_mysql::*;

mod util;
