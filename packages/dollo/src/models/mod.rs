pub mod branch_rates;
pub mod mutation_death;
pub mod partials;
pub mod site_model;
