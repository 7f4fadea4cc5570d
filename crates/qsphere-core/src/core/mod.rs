pub mod io;
pub mod metrics;
pub mod scheme;
