pub mod cache;
pub mod inclusion;
pub mod likelihood;
pub mod params;
pub mod process;
pub mod survival;
pub mod tree_weight;
