pub mod bamboo;
mod http;
pub mod jira;
