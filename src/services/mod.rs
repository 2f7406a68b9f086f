pub mod assist_service;
pub mod assist_tools;
pub mod git_service;
pub mod repo_service;

#[cfg(test)]
pub mod testing;
