pub mod customers;
pub mod jobs;
pub mod metrics;
pub mod technicians;
pub mod ws;
