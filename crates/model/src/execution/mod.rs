pub mod connection;
pub mod destination;
pub mod run;
