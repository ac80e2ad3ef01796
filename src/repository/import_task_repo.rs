// ==========================================
// 动态台账导入系统 - 导入任务数据仓储
// ==========================================
// 存储: import_task 表
// ==========================================

mod core;


pub use core::ImportTaskRepository;
