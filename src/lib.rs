//! Daily Habit Bot Library
//!
//! A Telegram bot that sends one scheduled message a day and keeps an
//! honest, never-resetting count of habit occurrences the user reports.
//!
//! This crate provides the core functionality for:
//! - Loading configuration from `config.toml` and the environment
//! - Storing daily messages, language preferences and habit counts as JSON
//! - Scheduling and delivering the daily message with retries
//! - Handling commands and habit reports in English and Arabic

pub mod commands;
pub mod config;
pub mod context;
pub mod habits;
pub mod i18n;
pub mod scheduler;
pub mod store;
pub mod telegram;
