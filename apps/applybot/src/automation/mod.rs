//! Quick-apply automation: signs in to the job board, walks search results and fills each
//! application form from the candidate profile, falling back to AI for unmatched fields.

pub mod board;
pub mod browser;
pub mod classifier;
pub mod handlers;
pub mod models;
pub mod navigator;
pub mod prompts;
pub mod reporter;
pub mod resolver;
pub mod run_config;
pub mod session;
pub mod sink;
pub mod timing;
pub mod webdriver;

#[cfg(test)]
pub mod testing;
