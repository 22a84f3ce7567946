pub mod backend;
pub mod detection;
pub mod geocode;
pub mod gps;
pub mod poller;
pub mod session;
pub mod surveillance;
