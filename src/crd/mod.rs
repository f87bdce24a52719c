mod compute_node;

pub use compute_node::*;
