pub mod death_type;
pub mod patterns;
