mod installed_software_repository;

pub use installed_software_repository::*;
