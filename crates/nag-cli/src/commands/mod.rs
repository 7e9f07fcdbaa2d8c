pub mod add;
pub mod delete;
pub mod list;
pub mod plan;
pub mod respond;
pub mod serve;
pub mod stats;
