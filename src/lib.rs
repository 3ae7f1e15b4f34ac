mod association;
mod attribute;
mod data_kind;
mod error;
mod executor;
mod planner;
mod record;
mod schema;
mod sql_writer;
mod util;
mod validation;
mod value;

pub use ::anyhow::Context;
pub use association::*;
pub use attribute::*;
pub use data_kind::*;
pub use error::*;
pub use executor::*;
pub use planner::*;
pub use record::*;
pub use schema::*;
pub use sql_writer::*;
pub use util::*;
pub use validation::*;
pub use value::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
