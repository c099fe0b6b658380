//! AnVIL 工作区管理控制台
//! 本地镜像 AnVIL 上的计费项目、账户、托管组和工作区，所有写操作先在远端完成再提交本地

pub mod adapters;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod remote;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;
