pub mod act;
pub mod config;
pub mod init;
pub mod plant;
pub mod rules;
pub mod run;
pub mod schedule;
pub mod today;
