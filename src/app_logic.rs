/*
 * This module provides the command layer of the tool, centered around
 * `RetargetAppLogic`, which turns user commands into calls on the core and
 * reports their outcome. Unit tests for `RetargetAppLogic` are in
 * `handler_tests.rs`.
 */
pub mod handler;


pub use handler::{CommandResult, CommandStatus, MessageSeverity, Report, RetargetAppLogic};
