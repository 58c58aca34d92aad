pub mod alignment;
pub mod io;
pub mod models;
pub mod observation;
pub mod tree;
pub mod utils;
