pub mod audit;
pub mod config;
pub mod dispatch;
pub mod remind;
pub mod run;
pub mod tasks;
