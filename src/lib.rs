pub mod server;
pub mod catalog;
pub mod security;
pub mod session;
pub mod classify;
pub mod db;
pub mod config;
pub mod pages;
pub mod error;
