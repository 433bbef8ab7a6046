//! Configuration module for Register-Crawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use register_crawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("register.toml")).unwrap();
//! println!("Crawling {}..{}", config.crawler.start_year, config.crawler.finish_year);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, ConnectionConfig, CrawlerConfig, EncodingPolicy, OutputConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
