//! Integration tests for the notestore storage layer

mod cli;
mod cloud_driver;
mod driver_contract;
mod router;
mod support;
mod tree_properties;
