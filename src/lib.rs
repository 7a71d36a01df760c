#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod access;
pub mod cli;
pub mod config;
pub mod controller;
pub mod directory;
pub mod error;
pub mod guard;
pub mod host;
pub mod logging;
pub mod paths;
pub mod progress;
pub mod runner;
pub mod session;
pub mod view;
