// src/handlers/mod.rs
pub mod attendance;
pub mod auth;
pub mod classes;
pub mod dashboard;
pub mod fee_records;
pub mod fee_structures;
pub mod health;
pub mod students;
pub mod teachers;
