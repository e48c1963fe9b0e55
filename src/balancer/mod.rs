//! 最少连接负载均衡器
//!
//! **架构设计**: 共享后端池 + 周期健康探测 + 请求转发
//!
//! ```text
//! 客户端请求 ──→ select(): 池锁内过滤可用后端, 取连接数最小者并 +1
//!                   ↓
//!               forward(): 按配置超时转发, 回拷状态/头/体
//!                   ↓
//!               release(): 二次加锁 -1
//!
//! 探测任务 (每后端一个) ──→ GET /health ──→ 更新 available
//!                                        (转为不可用时连接数清零)
//! ```

pub mod forward;
pub mod pool;
pub mod probe;

pub use forward::Forwarder;
pub use pool::{Backend, BackendPool};
pub use probe::HealthProber;
