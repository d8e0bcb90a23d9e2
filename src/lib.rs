pub mod case;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod http;
pub mod identity;
pub mod projection;
pub mod response;
pub mod service;
pub mod utils;
