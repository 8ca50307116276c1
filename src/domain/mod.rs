//! Tool groups exposed over the Model Context Protocol
//!
//! Provides the code analysis and docker control tool handlers and their
//! registry constructors.

pub mod code_analysis;
pub mod docker_control;
