pub mod examples;
pub mod post_order;
#[allow(clippy::module_inception)]
pub mod tree;
