//! 对外服务层 (HTTP)

pub mod http;
