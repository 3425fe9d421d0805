pub mod errors;
pub mod fields;
pub mod params;
pub mod query;
pub mod vector;

pub use errors::*;
pub use fields::*;
pub use params::*;
pub use query::*;
pub use vector::*;
