pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod panels;
pub mod renewal;
pub mod repository;
pub mod service;
