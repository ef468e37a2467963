//! 调度存储实现
//!
//! - `InMemoryScheduleStore` - 进程内，测试和一次性命令使用
//! - `SqliteScheduleStore` - 持久化，`serve` 模式的触发循环从这里读取

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryScheduleStore;
pub use sqlite::SqliteScheduleStore;
