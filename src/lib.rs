#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod dm;
pub mod error;
pub mod notifications;
pub mod registry;
pub mod settings;
pub mod types;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
