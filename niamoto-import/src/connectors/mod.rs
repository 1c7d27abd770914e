//! Connector implementations for the three `ConnectorSpec` variants (§4.4).

pub mod derived;
pub mod file;
pub mod file_multi_feature;
