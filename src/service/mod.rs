pub mod aggregation;
pub mod dispatcher;
pub mod relations;
