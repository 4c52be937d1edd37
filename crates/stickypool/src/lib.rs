#![doc = include_str!("../README.md")]

mod engine;
mod error;
mod job;
mod pool;
mod processor;
mod sticky;
mod token;
mod worker;


pub use crate::engine::*;
pub use crate::error::*;
pub use crate::job::*;
pub use crate::pool::*;
pub use crate::processor::*;
pub use crate::sticky::*;
pub use crate::token::*;
