//! CLI command implementations.
//!
//! | Module    | Responsibility                                      |
//! |-----------|-----------------------------------------------------|
//! | `mission` | config layering, validation, the run and its verdict |
//! | `render`  | banner and verdict output                            |
//! | `tool`    | one role tool call for the agent backend             |

pub mod mission;
pub mod render;
pub mod tool;

pub use mission::run_mission;
pub use tool::run_tool;
