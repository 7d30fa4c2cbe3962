pub mod comparators;
pub mod generic_key;
pub mod storable;
