#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod cli;
pub mod config;
pub mod controller;
pub mod disk;
pub mod download;
pub mod error;
pub mod paths;
pub mod platform;
pub mod probe;
pub mod runner;
pub mod vbox;
pub mod verb;
pub mod vm_state;
pub mod wait;
